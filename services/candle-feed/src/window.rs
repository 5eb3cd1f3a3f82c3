//! Shared candle window
//!
//! The collector task is the only writer; the decision loop takes a full
//! snapshot under the read lock, so a tick never observes a half-applied merge.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::types::Candle;

/// Default number of candles retained
pub const DEFAULT_CAPACITY: usize = 15_000;

/// Ordered, timestamp-deduplicated candle history
#[derive(Debug, Clone)]
pub struct CandleWindow {
    candles: BTreeMap<DateTime<Utc>, Candle>,
    capacity: usize,
    last_refresh: Option<Instant>,
    last_refresh_at: Option<DateTime<Utc>>,
    instrument_open: bool,
}

/// Consistent copy of the window taken for one evaluation
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub candles: Vec<Candle>,
    pub last_refresh: Option<Instant>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub instrument_open: bool,
}

impl WindowSnapshot {
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// True when the last successful refresh is older than `max_age` (or never happened)
    pub fn is_stale(&self, now: Instant, max_age: std::time::Duration) -> bool {
        match self.last_refresh {
            Some(at) => now.saturating_duration_since(at) > max_age,
            None => true,
        }
    }
}

impl CandleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            candles: BTreeMap::new(),
            capacity: capacity.max(1),
            last_refresh: None,
            last_refresh_at: None,
            instrument_open: true,
        }
    }

    /// Merge a batch, keeping the last candle seen for each timestamp.
    ///
    /// Returns the number of timestamps that were not present before.
    pub fn merge(&mut self, batch: Vec<Candle>) -> usize {
        let mut added = 0;
        for candle in batch {
            if self.candles.insert(candle.timestamp, candle).is_none() {
                added += 1;
            }
        }

        let overflow = self.candles.len().saturating_sub(self.capacity);
        if overflow > 0 {
            let cutoff: Vec<_> = self.candles.keys().take(overflow).copied().collect();
            for ts in cutoff {
                self.candles.remove(&ts);
            }
            debug!("Candle window trimmed {} oldest entries", overflow);
        }

        added
    }

    pub fn mark_refreshed(&mut self, now: Instant) {
        self.last_refresh = Some(now);
        self.last_refresh_at = Some(Utc::now());
    }

    pub fn set_instrument_open(&mut self, open: bool) {
        self.instrument_open = open;
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.values().next_back()
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            candles: self.candles.values().cloned().collect(),
            last_refresh: self.last_refresh,
            last_refresh_at: self.last_refresh_at,
            instrument_open: self.instrument_open,
        }
    }
}

impl Default for CandleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Handle shared between the collector (writer) and readers
#[derive(Debug, Clone, Default)]
pub struct SharedWindow {
    inner: Arc<RwLock<CandleWindow>>,
}

impl SharedWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CandleWindow::new(capacity))),
        }
    }

    pub async fn merge(&self, batch: Vec<Candle>, now: Instant) -> usize {
        let mut window = self.inner.write().await;
        let added = window.merge(batch);
        window.mark_refreshed(now);
        added
    }

    pub async fn set_instrument_open(&self, open: bool) {
        self.inner.write().await.set_instrument_open(open);
    }

    pub async fn snapshot(&self) -> WindowSnapshot {
        self.inner.read().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Most recent candle without copying the whole window
    pub async fn latest(&self) -> Option<Candle> {
        self.inner.read().await.latest().cloned()
    }
}
