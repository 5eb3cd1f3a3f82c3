//! Event Impact - reacts to high-impact external market events
//!
//! Events are published into a shared [`MarketEvents`] slot by whatever
//! feeds them (news filter, economic calendar). The runner attaches the
//! latest live event to each tick's [`MarketWindow`].

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{MarketWindow, SignalSource};
use crate::signal::{Direction, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub direction: Direction,
    /// Expected impact in [0, 1]
    pub impact: f64,
    pub headline: String,
    pub at: DateTime<Utc>,
}

/// Latest-event slot shared between event producers and the runner
#[derive(Clone)]
pub struct MarketEvents {
    latest: Arc<RwLock<Option<MarketEvent>>>,
    ttl: Duration,
}

impl MarketEvents {
    pub fn new(ttl: Duration) -> Self {
        Self {
            latest: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    pub fn publish(&self, event: MarketEvent) {
        if let Ok(mut slot) = self.latest.write() {
            *slot = Some(event);
        }
    }

    /// Latest event if it is younger than the ttl at `now`
    pub fn latest(&self, now: DateTime<Utc>) -> Option<MarketEvent> {
        let slot = self.latest.read().ok()?;
        slot.as_ref()
            .filter(|e| now - e.at <= self.ttl)
            .cloned()
    }
}

pub struct EventImpactSource {
    min_impact: f64,
}

impl EventImpactSource {
    pub fn new(min_impact: f64) -> Self {
        Self { min_impact }
    }
}

impl SignalSource for EventImpactSource {
    fn id(&self) -> &'static str {
        "event_impact"
    }

    fn min_lookback(&self) -> usize {
        0
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        match &window.event {
            Some(event) if event.impact > self.min_impact => {
                Signal::new(self.id(), event.direction, event.impact)
            }
            _ => Signal::neutral(self.id()),
        }
    }
}
