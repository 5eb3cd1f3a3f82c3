//! Paper trading - in-process broker and a synthetic candle feed
//!
//! The paper broker settles a binary option once its duration has passed by
//! comparing the entry close with the latest close in the shared window.
//! A win pays the stake plus the payout, a tie refunds the stake, a loss
//! forfeits it.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use candle_feed::{Candle, CandleFeedError, CandleSource, SharedWindow, TimeFrame};
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::executor::{
    Account, AccountError, ExecutorError, Settlement, TradeExecutor, TradeId, TradeRequest,
};
use crate::signal::Direction;

/// Broker payout on a winning trade, as a fraction of the stake
pub const DEFAULT_PAYOUT: Decimal = Decimal::from_parts(8, 0, 0, false, 1);

#[derive(Debug, Clone)]
struct PaperTrade {
    direction: Direction,
    stake: Decimal,
    entry: Decimal,
    expires_at: Instant,
    profit: Option<Decimal>,
}

pub struct PaperBroker {
    window: SharedWindow,
    payout: Decimal,
    balance: Mutex<Decimal>,
    trades: Mutex<HashMap<TradeId, PaperTrade>>,
}

impl PaperBroker {
    pub fn new(window: SharedWindow, starting_balance: Decimal) -> Self {
        Self {
            window,
            payout: DEFAULT_PAYOUT,
            balance: Mutex::new(starting_balance),
            trades: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_payout(mut self, payout: Decimal) -> Self {
        self.payout = payout;
        self
    }

    fn lock_err() -> ExecutorError {
        ExecutorError::Connectivity("paper broker state poisoned".to_string())
    }

    async fn latest_close(&self) -> Option<Decimal> {
        self.window.latest().await.map(|c| c.close)
    }
}

#[async_trait]
impl TradeExecutor for PaperBroker {
    async fn place(&self, request: &TradeRequest) -> Result<TradeId, ExecutorError> {
        if !request.direction.is_tradeable() {
            return Err(ExecutorError::Rejected("no direction".to_string()));
        }
        if request.stake <= Decimal::ZERO {
            return Err(ExecutorError::Rejected("stake must be positive".to_string()));
        }
        let entry = self
            .latest_close()
            .await
            .ok_or_else(|| ExecutorError::Rejected("no price for entry".to_string()))?;

        {
            let mut balance = self.balance.lock().map_err(|_| Self::lock_err())?;
            if request.stake > *balance {
                return Err(ExecutorError::Rejected(format!(
                    "insufficient balance {} for stake {}",
                    balance, request.stake
                )));
            }
            *balance -= request.stake;
        }

        let id = TradeId(Uuid::new_v4().to_string());
        let trade = PaperTrade {
            direction: request.direction,
            stake: request.stake,
            entry,
            expires_at: Instant::now() + request.duration,
            profit: None,
        };
        self.trades
            .lock()
            .map_err(|_| Self::lock_err())?
            .insert(id.clone(), trade);
        info!(
            "Paper {} {} placed at {} for {:?}",
            request.direction, request.stake, entry, request.duration
        );
        Ok(id)
    }

    async fn settlement(&self, trade_id: &TradeId) -> Result<Settlement, ExecutorError> {
        let trade = self
            .trades
            .lock()
            .map_err(|_| Self::lock_err())?
            .get(trade_id)
            .cloned()
            .ok_or_else(|| ExecutorError::Rejected(format!("unknown trade {}", trade_id)))?;

        if let Some(profit) = trade.profit {
            return Ok(Settlement::Settled { profit });
        }
        if Instant::now() < trade.expires_at {
            return Ok(Settlement::Pending);
        }
        let exit = self
            .latest_close()
            .await
            .ok_or_else(|| ExecutorError::Connectivity("no price for settlement".to_string()))?;

        let won = match trade.direction {
            Direction::Call => exit > trade.entry,
            Direction::Put => exit < trade.entry,
            Direction::Neutral => false,
        };
        let (profit, credit) = if exit == trade.entry {
            (Decimal::ZERO, trade.stake)
        } else if won {
            let profit = trade.stake * self.payout;
            (profit, trade.stake + profit)
        } else {
            (-trade.stake, Decimal::ZERO)
        };

        *self.balance.lock().map_err(|_| Self::lock_err())? += credit;
        if let Some(stored) = self
            .trades
            .lock()
            .map_err(|_| Self::lock_err())?
            .get_mut(trade_id)
        {
            stored.profit = Some(profit);
        }
        debug!(
            "Paper trade {} settled: entry {} exit {} profit {}",
            trade_id, trade.entry, exit, profit
        );
        Ok(Settlement::Settled { profit })
    }

    fn name(&self) -> &str {
        "paper"
    }
}

#[async_trait]
impl Account for PaperBroker {
    async fn balance(&self) -> Result<Decimal, AccountError> {
        self.balance
            .lock()
            .map(|b| *b)
            .map_err(|_| AccountError::Unavailable("paper broker state poisoned".to_string()))
    }
}

/// Random-walk candle source for offline runs
pub struct SyntheticSource {
    state: Mutex<SyntheticState>,
    volatility: f64,
}

struct SyntheticState {
    rng: StdRng,
    candles: VecDeque<Candle>,
    last_close: f64,
}

const SYNTHETIC_RETAIN: usize = 20_000;

impl SyntheticSource {
    pub fn new(start_price: f64) -> Self {
        Self::with_rng(start_price, StdRng::from_entropy())
    }

    pub fn with_seed(start_price: f64, seed: u64) -> Self {
        Self::with_rng(start_price, StdRng::seed_from_u64(seed))
    }

    fn with_rng(start_price: f64, rng: StdRng) -> Self {
        Self {
            state: Mutex::new(SyntheticState {
                rng,
                candles: VecDeque::new(),
                last_close: start_price,
            }),
            volatility: 0.0004,
        }
    }

    /// Extend the series up to the bucket containing `now`
    fn generate_until(
        &self,
        now: DateTime<Utc>,
        timeframe: TimeFrame,
        min_len: usize,
    ) -> Result<Vec<Candle>, CandleFeedError> {
        let step = timeframe.to_seconds();
        let mut state = self
            .state
            .lock()
            .map_err(|_| CandleFeedError::ApiError("synthetic source poisoned".to_string()))?;

        let current_bucket = now.timestamp() - now.timestamp() % step;
        let mut next = match state.candles.back() {
            Some(last) => last.timestamp.timestamp() + step,
            None => current_bucket - step * (min_len.max(1) as i64 - 1),
        };
        while next <= current_bucket {
            let candle = state.next_candle(next, self.volatility)?;
            state.candles.push_back(candle);
            if state.candles.len() > SYNTHETIC_RETAIN {
                state.candles.pop_front();
            }
            next += step;
        }
        Ok(state.candles.iter().cloned().collect())
    }
}

impl SyntheticState {
    fn next_candle(&mut self, ts: i64, volatility: f64) -> Result<Candle, CandleFeedError> {
        let open = self.last_close;
        let close = (open * (1.0 + self.rng.gen_range(-volatility..volatility))).max(1e-6);
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..volatility / 2.0));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..volatility / 2.0));
        let volume = self.rng.gen_range(50.0..500.0);
        self.last_close = close;

        let dec = |v: f64| {
            Decimal::from_f64(v)
                .map(|d| d.round_dp(6))
                .ok_or_else(|| CandleFeedError::InvalidResponse(format!("unrepresentable price {}", v)))
        };
        let timestamp = Utc
            .timestamp_opt(ts, 0)
            .single()
            .ok_or_else(|| CandleFeedError::InvalidResponse(format!("bad timestamp {}", ts)))?;
        Ok(Candle {
            timestamp,
            open: dec(open)?,
            high: dec(high)?,
            low: dec(low)?,
            close: dec(close)?,
            volume: dec(volume)?.round_dp(0),
        })
    }
}

#[async_trait]
impl CandleSource for SyntheticSource {
    async fn latest_candles(
        &self,
        _symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> Result<Vec<Candle>, CandleFeedError> {
        let all = self.generate_until(Utc::now(), timeframe, limit)?;
        Ok(all[all.len().saturating_sub(limit)..].to_vec())
    }

    async fn is_available(&self, _symbol: &str) -> Result<bool, CandleFeedError> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
