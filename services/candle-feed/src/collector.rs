//! Background candle producer
//!
//! Polls a `CandleSource` on a fixed cadence and merges each batch into the
//! shared window. Runs independently of the decision loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::types::{CandleSource, Result, SourceHealth, TimeFrame};
use crate::window::SharedWindow;

/// Collector settings
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub poll_interval: Duration,
    /// Candles requested per poll
    pub fetch_limit: usize,
    /// Candles requested once at startup
    pub history_fetch: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            symbol: "EURUSD-OTC".to_string(),
            timeframe: TimeFrame::Minute1,
            poll_interval: Duration::from_secs(1),
            fetch_limit: 20,
            history_fetch: 1000,
        }
    }
}

pub struct CandleCollector {
    source: Arc<dyn CandleSource>,
    window: SharedWindow,
    config: CollectorConfig,
    health: SourceHealth,
}

impl CandleCollector {
    pub fn new(source: Arc<dyn CandleSource>, window: SharedWindow, config: CollectorConfig) -> Self {
        let health = SourceHealth {
            source: source.name().to_string(),
            is_healthy: false,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
        };
        Self {
            source,
            window,
            config,
            health,
        }
    }

    pub fn health(&self) -> &SourceHealth {
        &self.health
    }

    /// Load the initial history before streaming starts
    pub async fn backfill(&mut self) -> Result<usize> {
        let candles = self
            .source
            .latest_candles(
                &self.config.symbol,
                self.config.timeframe,
                self.config.history_fetch,
            )
            .await?;
        let added = self.window.merge(candles, Instant::now()).await;
        self.record_success();
        info!(
            "Backfilled {} candles for {} from {}",
            added,
            self.config.symbol,
            self.source.name()
        );
        Ok(added)
    }

    /// One availability check plus one fetch/merge
    pub async fn poll_once(&mut self) -> Result<usize> {
        let result = self.fetch_and_merge().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(e) => self.record_failure(e.to_string()),
        }
        result
    }

    async fn fetch_and_merge(&self) -> Result<usize> {
        let open = self.source.is_available(&self.config.symbol).await?;
        self.window.set_instrument_open(open).await;
        if !open {
            warn!("Instrument {} reported closed by {}", self.config.symbol, self.source.name());
            return Ok(0);
        }

        let candles = self
            .source
            .latest_candles(&self.config.symbol, self.config.timeframe, self.config.fetch_limit)
            .await?;
        let added = self.window.merge(candles, Instant::now()).await;
        if added > 0 {
            debug!("Merged {} new candles for {}", added, self.config.symbol);
        }
        Ok(added)
    }

    fn record_success(&mut self) {
        self.health.is_healthy = true;
        self.health.last_success = Some(Utc::now());
        self.health.consecutive_failures = 0;
    }

    fn record_failure(&mut self, error: String) {
        self.health.is_healthy = false;
        self.health.consecutive_failures += 1;
        warn!(
            "Candle poll failed ({} in a row) from {}: {}",
            self.health.consecutive_failures, self.health.source, error
        );
        self.health.last_error = Some(error);
    }

    /// Spawn the polling loop; it exits once `shutdown` flips to true
    pub fn spawn(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "Candle collector started for {} ({}) every {:?}",
                self.config.symbol,
                self.config.timeframe.as_str(),
                self.config.poll_interval
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = self.poll_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Candle collector stopped for {}", self.config.symbol);
        })
    }
}
