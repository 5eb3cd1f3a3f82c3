//! Trade gate - turns a fired decision into a placed and settled trade
//!
//! Steps: direction check, fresh balance, stake, place, then a bounded
//! settlement wait. Balance and placement calls are bounded by the request
//! timeout. Every failure is contained and reported as
//! [`GateOutcome::Skipped`]; [`GateOutcome::should_reset`] tells the cycle
//! whether the executor was reached.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::executor::{
    Account, AccountError, ExecutorError, Settlement, TradeExecutor, TradeId, TradeOutcome,
    TradeRequest,
};
use crate::intent::{IntentRegistry, TradeIntentState};
use crate::risk::{RiskError, RiskSizer};
use crate::signal::ConsolidatedDecision;

#[derive(Debug, Clone)]
pub struct GateSettings {
    /// Instrument orders are placed on
    pub symbol: String,
    pub trade_duration: Duration,
    /// Upper bound on waiting for settlement after placing
    pub settlement_timeout: Duration,
    pub poll_interval: Duration,
    /// Upper bound on one balance query or order placement
    pub request_timeout: Duration,
}

impl GateSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            symbol: config.asset.order_symbol(),
            trade_duration: config.execution.trade_duration(),
            settlement_timeout: config.execution.settlement_timeout(),
            poll_interval: config.execution.settlement_poll(),
            request_timeout: config.execution.request_timeout(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("no tradeable direction")]
    NoDirection,

    #[error(transparent)]
    BalanceUnavailable(#[from] AccountError),

    #[error(transparent)]
    InvalidRisk(#[from] RiskError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl SkipReason {
    /// The executor was called for this attempt
    pub fn executor_invoked(&self) -> bool {
        matches!(self, SkipReason::Executor(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Executed(TradeOutcome),
    Skipped(SkipReason),
}

impl GateOutcome {
    /// Reset the cycle whenever the executor was reached, settled or not
    pub fn should_reset(&self) -> bool {
        match self {
            GateOutcome::Executed(_) => true,
            GateOutcome::Skipped(reason) => reason.executor_invoked(),
        }
    }
}

pub struct TradeGate {
    executor: Arc<dyn TradeExecutor>,
    account: Arc<dyn Account>,
    sizer: RiskSizer,
    settings: GateSettings,
    journal: IntentRegistry,
}

impl TradeGate {
    pub fn new(
        executor: Arc<dyn TradeExecutor>,
        account: Arc<dyn Account>,
        sizer: RiskSizer,
        settings: GateSettings,
    ) -> Self {
        Self {
            executor,
            account,
            sizer,
            settings,
            journal: IntentRegistry::new(),
        }
    }

    pub fn journal(&self) -> &IntentRegistry {
        &self.journal
    }

    /// Run one trade attempt to completion
    pub async fn attempt(
        &mut self,
        decision: &ConsolidatedDecision,
        effective_confidence: f64,
    ) -> GateOutcome {
        if !decision.direction.is_tradeable() {
            return GateOutcome::Skipped(SkipReason::NoDirection);
        }
        self.journal.cleanup();
        let intent = self.journal.create(
            &self.settings.symbol,
            decision.direction,
            effective_confidence,
            decision.dominant_strategy.clone(),
        );

        let balance = match self.fetch_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("Trade skipped, {}", e);
                return self.skip(&intent.id, e.into());
            }
        };
        let stake = match self.sizer.size(balance) {
            Ok(risk) => risk.stake,
            Err(e) => {
                warn!("Trade skipped, {} (balance {})", e, balance);
                return self.skip(&intent.id, e.into());
            }
        };
        self.journal.set_stake(&intent.id, stake);

        let request = TradeRequest {
            symbol: self.settings.symbol.clone(),
            direction: decision.direction,
            stake,
            duration: self.settings.trade_duration,
        };
        info!(
            "Placing {} on {} | stake {} | confidence {:.3} | via {}",
            request.direction,
            request.symbol,
            stake,
            effective_confidence,
            self.executor.name()
        );

        let trade_id = match self.place(&request).await {
            Ok(id) => id,
            Err(e) => {
                error!("Trade placement failed: {}", e);
                self.record(&intent.id, TradeIntentState::Failed {
                    stage: "place".to_string(),
                    error: e.to_string(),
                });
                return GateOutcome::Skipped(e.into());
            }
        };
        self.record(&intent.id, TradeIntentState::Placed {
            trade_id: trade_id.clone(),
        });

        match self.await_settlement(&trade_id).await {
            Ok(profit) => {
                self.record(&intent.id, TradeIntentState::Settled {
                    trade_id: trade_id.clone(),
                    profit,
                });
                info!("Trade {} settled, profit {}", trade_id, profit);
                GateOutcome::Executed(TradeOutcome {
                    trade_id,
                    direction: decision.direction,
                    stake,
                    profit,
                })
            }
            Err(e) => {
                error!("Trade {} did not settle: {}", trade_id, e);
                let state = match e {
                    ExecutorError::Timeout(_) => TradeIntentState::TimedOut { trade_id },
                    _ => TradeIntentState::Failed {
                        stage: "settlement".to_string(),
                        error: e.to_string(),
                    },
                };
                self.record(&intent.id, state);
                GateOutcome::Skipped(e.into())
            }
        }
    }

    async fn fetch_balance(&self) -> Result<Decimal, AccountError> {
        let limit = self.settings.request_timeout;
        timeout(limit, self.account.balance())
            .await
            .map_err(|_| AccountError::Unavailable(format!("no response within {:?}", limit)))?
    }

    /// A placement that times out may still have reached the broker
    async fn place(&self, request: &TradeRequest) -> Result<TradeId, ExecutorError> {
        let limit = self.settings.request_timeout;
        timeout(limit, self.executor.place(request))
            .await
            .map_err(|_| ExecutorError::Timeout(limit))?
    }

    /// Poll until settled, bounded by the settlement timeout.
    ///
    /// Connectivity errors while polling are retried; the trade is already
    /// placed and cannot be withdrawn.
    async fn await_settlement(&self, trade_id: &TradeId) -> Result<Decimal, ExecutorError> {
        let poll = async {
            loop {
                match self.executor.settlement(trade_id).await {
                    Ok(Settlement::Settled { profit }) => return Ok(profit),
                    Ok(Settlement::Pending) => {}
                    Err(ExecutorError::Connectivity(e)) => {
                        warn!("Settlement poll for {} failed, retrying: {}", trade_id, e);
                    }
                    Err(e) => return Err(e),
                }
                sleep(self.settings.poll_interval).await;
            }
        };
        timeout(self.settings.settlement_timeout, poll)
            .await
            .map_err(|_| ExecutorError::Timeout(self.settings.settlement_timeout))?
    }

    fn skip(&mut self, id: &uuid::Uuid, reason: SkipReason) -> GateOutcome {
        self.record(id, TradeIntentState::Skipped {
            reason: reason.to_string(),
        });
        GateOutcome::Skipped(reason)
    }

    fn record(&mut self, id: &uuid::Uuid, state: TradeIntentState) {
        if let Err(e) = self.journal.update_state(id, state) {
            warn!("Trade journal update failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::signal::Direction;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Executor that settles after a fixed number of polls, or never
    struct ScriptedExecutor {
        placed: Mutex<Vec<TradeRequest>>,
        polls: AtomicUsize,
        settle_after: Option<usize>,
        reject: bool,
        hang_on_place: bool,
    }

    impl ScriptedExecutor {
        fn settling_after(polls: usize) -> Self {
            Self {
                placed: Mutex::new(Vec::new()),
                polls: AtomicUsize::new(0),
                settle_after: Some(polls),
                reject: false,
                hang_on_place: false,
            }
        }

        fn never_settling() -> Self {
            Self {
                settle_after: None,
                ..Self::settling_after(0)
            }
        }

        fn rejecting() -> Self {
            Self {
                reject: true,
                ..Self::settling_after(0)
            }
        }

        fn unresponsive() -> Self {
            Self {
                hang_on_place: true,
                ..Self::settling_after(0)
            }
        }
    }

    #[async_trait]
    impl TradeExecutor for ScriptedExecutor {
        async fn place(&self, request: &TradeRequest) -> Result<TradeId, ExecutorError> {
            if self.reject {
                return Err(ExecutorError::Rejected("asset suspended".to_string()));
            }
            if self.hang_on_place {
                std::future::pending::<()>().await;
            }
            self.placed.lock().unwrap().push(request.clone());
            Ok(TradeId("t-1".to_string()))
        }

        async fn settlement(&self, _trade_id: &TradeId) -> Result<Settlement, ExecutorError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            match self.settle_after {
                Some(after) if n >= after => Ok(Settlement::Settled {
                    profit: Decimal::from(40),
                }),
                _ => Ok(Settlement::Pending),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct FixedAccount(Result<Decimal, AccountError>);

    #[async_trait]
    impl Account for FixedAccount {
        async fn balance(&self) -> Result<Decimal, AccountError> {
            self.0.clone()
        }
    }

    struct SilentAccount;

    #[async_trait]
    impl Account for SilentAccount {
        async fn balance(&self) -> Result<Decimal, AccountError> {
            std::future::pending().await
        }
    }

    fn settings() -> GateSettings {
        GateSettings {
            symbol: "EURUSD-OTC-op".to_string(),
            trade_duration: Duration::from_secs(60),
            settlement_timeout: Duration::from_secs(65),
            poll_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
        }
    }

    fn gate(executor: Arc<ScriptedExecutor>, balance: Result<Decimal, AccountError>) -> TradeGate {
        TradeGate::new(
            executor,
            Arc::new(FixedAccount(balance)),
            RiskSizer::new(&RiskConfig::default()),
            settings(),
        )
    }

    fn call_decision() -> ConsolidatedDecision {
        ConsolidatedDecision {
            direction: Direction::Call,
            confidence: 0.9,
            dominant_strategy: Some("price_action".to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_trade_is_executed() {
        let executor = Arc::new(ScriptedExecutor::settling_after(3));
        let mut gate = gate(executor.clone(), Ok(Decimal::from(1000)));

        let outcome = gate.attempt(&call_decision(), 1.001).await;
        let GateOutcome::Executed(trade) = &outcome else {
            panic!("expected execution, got {:?}", outcome);
        };
        assert_eq!(trade.stake, Decimal::from(50));
        assert_eq!(trade.profit, Decimal::from(40));
        assert!(outcome.should_reset());

        let placed = executor.placed.lock().unwrap();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].direction, Direction::Call);
        assert_eq!(placed[0].duration, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settlement_timeout_is_skipped_and_resets() {
        let executor = Arc::new(ScriptedExecutor::never_settling());
        let mut gate = gate(executor.clone(), Ok(Decimal::from(1000)));

        let started = tokio::time::Instant::now();
        let outcome = gate.attempt(&call_decision(), 1.2).await;
        assert_eq!(
            outcome,
            GateOutcome::Skipped(SkipReason::Executor(ExecutorError::Timeout(Duration::from_secs(65))))
        );
        assert!(outcome.should_reset());
        assert!(started.elapsed() >= Duration::from_secs(65));
        assert!(started.elapsed() < Duration::from_secs(67));
        assert!(gate.journal().pending().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_order_resets() {
        let mut gate = gate(Arc::new(ScriptedExecutor::rejecting()), Ok(Decimal::from(1000)));
        let outcome = gate.attempt(&call_decision(), 1.0).await;
        assert!(matches!(
            outcome,
            GateOutcome::Skipped(SkipReason::Executor(ExecutorError::Rejected(_)))
        ));
        assert!(outcome.should_reset());
    }

    #[tokio::test]
    async fn test_invalid_balance_skips_without_reset() {
        let executor = Arc::new(ScriptedExecutor::settling_after(0));
        let mut gate = gate(executor.clone(), Ok(Decimal::ZERO));

        let outcome = gate.attempt(&call_decision(), 1.5).await;
        assert!(matches!(
            outcome,
            GateOutcome::Skipped(SkipReason::InvalidRisk(RiskError::InvalidInput(_)))
        ));
        assert!(!outcome.should_reset());
        assert!(executor.placed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_balance_skips_without_reset() {
        let mut gate = gate(
            Arc::new(ScriptedExecutor::settling_after(0)),
            Err(AccountError::Unavailable("session expired".to_string())),
        );
        let outcome = gate.attempt(&call_decision(), 1.5).await;
        assert!(matches!(
            outcome,
            GateOutcome::Skipped(SkipReason::BalanceUnavailable(_))
        ));
        assert!(!outcome.should_reset());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_placement_times_out_and_resets() {
        let mut gate = gate(Arc::new(ScriptedExecutor::unresponsive()), Ok(Decimal::from(1000)));

        let started = tokio::time::Instant::now();
        let outcome = gate.attempt(&call_decision(), 1.2).await;
        assert_eq!(
            outcome,
            GateOutcome::Skipped(SkipReason::Executor(ExecutorError::Timeout(Duration::from_secs(10))))
        );
        assert!(outcome.should_reset());
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(11));
        assert!(gate.journal().pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_account_skips_without_reset() {
        let executor = Arc::new(ScriptedExecutor::settling_after(0));
        let mut gate = TradeGate::new(
            executor.clone(),
            Arc::new(SilentAccount),
            RiskSizer::new(&RiskConfig::default()),
            settings(),
        );

        let started = tokio::time::Instant::now();
        let outcome = gate.attempt(&call_decision(), 1.2).await;
        assert!(matches!(
            outcome,
            GateOutcome::Skipped(SkipReason::BalanceUnavailable(AccountError::Unavailable(_)))
        ));
        assert!(!outcome.should_reset());
        assert!(started.elapsed() < Duration::from_secs(11));
        assert!(executor.placed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_neutral_decision_is_skipped() {
        let mut gate = gate(Arc::new(ScriptedExecutor::settling_after(0)), Ok(Decimal::from(1000)));
        let outcome = gate.attempt(&ConsolidatedDecision::empty(), 2.0).await;
        assert_eq!(outcome, GateOutcome::Skipped(SkipReason::NoDirection));
        assert!(!outcome.should_reset());
        assert!(gate.journal().is_empty());
    }
}
