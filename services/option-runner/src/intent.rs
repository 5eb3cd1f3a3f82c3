//! Trade intent journal
//!
//! Every gate attempt gets an intent with a state trail, so a failed or
//! timed-out trade can be traced back to the decision that caused it.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::executor::TradeId;
use crate::signal::Direction;

/// Trade intent states
#[derive(Debug, Clone, PartialEq)]
pub enum TradeIntentState {
    Created,
    /// Stopped before reaching the executor
    Skipped { reason: String },
    Placed { trade_id: TradeId },
    Settled { trade_id: TradeId, profit: Decimal },
    Failed { stage: String, error: String },
    TimedOut { trade_id: TradeId },
}

impl TradeIntentState {
    pub fn is_finalized(&self) -> bool {
        !matches!(
            self,
            TradeIntentState::Created | TradeIntentState::Placed { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct TradeIntent {
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub confidence: f64,
    pub dominant_strategy: Option<String>,
    pub stake: Option<Decimal>,
    pub state: TradeIntentState,
    pub created_at: Instant,
}

/// Intent registry for tracking trade attempts
pub struct IntentRegistry {
    intents: HashMap<Uuid, TradeIntent>,
    max_age: Duration,
}

impl Default for IntentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentRegistry {
    pub fn new() -> Self {
        Self {
            intents: HashMap::new(),
            max_age: Duration::from_secs(3600), // 1 hour retention
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn create(
        &mut self,
        symbol: &str,
        direction: Direction,
        confidence: f64,
        dominant_strategy: Option<String>,
    ) -> TradeIntent {
        let intent = TradeIntent {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            direction,
            confidence,
            dominant_strategy,
            stake: None,
            state: TradeIntentState::Created,
            created_at: Instant::now(),
        };
        self.intents.insert(intent.id, intent.clone());
        debug!("Created trade intent {} ({} {})", intent.id, direction, symbol);
        intent
    }

    pub fn get(&self, id: &Uuid) -> Option<&TradeIntent> {
        self.intents.get(id)
    }

    pub fn set_stake(&mut self, id: &Uuid, stake: Decimal) {
        if let Some(intent) = self.intents.get_mut(id) {
            intent.stake = Some(stake);
        }
    }

    pub fn update_state(&mut self, id: &Uuid, state: TradeIntentState) -> anyhow::Result<()> {
        let intent = self
            .intents
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("Intent not found: {}", id))?;
        debug!("Intent {} state: {:?} -> {:?}", id, intent.state, state);
        intent.state = state;
        Ok(())
    }

    /// Intents still waiting on the broker
    pub fn pending(&self) -> Vec<&TradeIntent> {
        self.intents
            .values()
            .filter(|i| !i.state.is_finalized())
            .collect()
    }

    pub fn intents(&self) -> impl Iterator<Item = &TradeIntent> {
        self.intents.values()
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Drop intents older than the retention window
    pub fn cleanup(&mut self) {
        let before = self.intents.len();
        let max_age = self.max_age;
        self.intents.retain(|_, intent| intent.created_at.elapsed() < max_age);
        let removed = before - self.intents.len();
        if removed > 0 {
            debug!("Cleaned up {} old intents", removed);
        }
    }
}
