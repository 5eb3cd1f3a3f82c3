//! Trading signals - output from signal sources and the consolidator

use serde::{Deserialize, Serialize};

/// Trading bias for a binary option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Price will rise
    Call,
    /// Price will fall
    Put,
    /// No opinion
    Neutral,
}

impl Direction {
    /// Call and Put are tradeable, Neutral is not
    pub fn is_tradeable(&self) -> bool {
        !matches!(self, Direction::Neutral)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Call => write!(f, "call"),
            Direction::Put => write!(f, "put"),
            Direction::Neutral => write!(f, "neutral"),
        }
    }
}

/// One strategy's opinion for the current tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_id: String,
    pub direction: Direction,
    /// Always within [0, 1]
    pub confidence: f64,
}

impl Signal {
    pub fn new(strategy_id: &str, direction: Direction, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            strategy_id: strategy_id.to_string(),
            direction,
            confidence,
        }
    }

    pub fn call(strategy_id: &str, confidence: f64) -> Self {
        Self::new(strategy_id, Direction::Call, confidence)
    }

    pub fn put(strategy_id: &str, confidence: f64) -> Self {
        Self::new(strategy_id, Direction::Put, confidence)
    }

    /// No opinion (also the insufficient-data outcome)
    pub fn neutral(strategy_id: &str) -> Self {
        Self::new(strategy_id, Direction::Neutral, 0.0)
    }
}

/// Single decision derived from all signals of a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedDecision {
    pub direction: Direction,
    /// Sum of confidences of every signal sharing `direction`
    pub confidence: f64,
    pub dominant_strategy: Option<String>,
}

impl ConsolidatedDecision {
    pub fn empty() -> Self {
        Self {
            direction: Direction::Neutral,
            confidence: 0.0,
            dominant_strategy: None,
        }
    }
}
