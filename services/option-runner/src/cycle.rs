//! Cycle state machine - calibration gate and confidence accrual
//!
//! ```text
//! Calibration --(elapsed >= calibration)--> Active --(trade attempted)--> Active (cycle_start = now)
//! ```
//!
//! Calibration is one-way within a run. While calibrating no trade ever
//! fires, whatever the confidence. In Active phase the effective confidence
//! is the consolidated confidence plus the predictor bonus (on agreement)
//! plus a bonus for every second past `cycle_start + calibration`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::info;

use crate::config::CycleConfig;
use crate::signal::{ConsolidatedDecision, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Calibration,
    Active,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Calibration => write!(f, "calibration"),
            Phase::Active => write!(f, "active"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleState {
    pub phase: Phase,
    pub cycle_start: Instant,
    pub last_reset: Option<Instant>,
}

/// Per-tick result of folding a decision into the cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleAssessment {
    pub phase: Phase,
    pub extra_elapsed: Duration,
    pub effective_confidence: f64,
    pub predictor_agrees: bool,
    /// Trade request for this tick
    pub fire: bool,
}

pub struct CycleStateMachine {
    config: CycleConfig,
    state: CycleState,
}

impl CycleStateMachine {
    pub fn new(config: CycleConfig, now: Instant) -> Self {
        Self {
            config,
            state: CycleState {
                phase: Phase::Calibration,
                cycle_start: now,
                last_reset: None,
            },
        }
    }

    /// Restart calibration from `now` at the beginning of a run
    pub fn start(&mut self, now: Instant) {
        self.state = CycleState {
            phase: Phase::Calibration,
            cycle_start: now,
            last_reset: None,
        };
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn threshold(&self) -> f64 {
        self.config.trade_threshold
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state.cycle_start)
    }

    /// Time past the calibration window of the current cycle, never negative
    pub fn extra_elapsed(&self, now: Instant) -> Duration {
        self.elapsed(now).saturating_sub(self.config.calibration())
    }

    /// Apply the Calibration -> Active transition if it is due
    pub fn observe(&mut self, now: Instant) -> Phase {
        if self.state.phase == Phase::Calibration && self.elapsed(now) >= self.config.calibration() {
            self.state.phase = Phase::Active;
            info!(
                "Calibration complete after {:?}, trading enabled",
                self.elapsed(now)
            );
        }
        self.state.phase
    }

    pub fn effective_confidence(
        &self,
        decision: &ConsolidatedDecision,
        predicted: Option<Direction>,
        now: Instant,
    ) -> f64 {
        let bonus = if predicted == Some(decision.direction) {
            self.config.predictor_bonus
        } else {
            0.0
        };
        decision.confidence
            + bonus
            + self.extra_elapsed(now).as_secs_f64() * self.config.time_bonus_per_sec
    }

    /// Fold one tick's decision into the cycle
    pub fn assess(
        &mut self,
        decision: &ConsolidatedDecision,
        predicted: Option<Direction>,
        now: Instant,
    ) -> CycleAssessment {
        let phase = self.observe(now);
        let effective_confidence = self.effective_confidence(decision, predicted, now);
        let fire = phase == Phase::Active
            && decision.direction.is_tradeable()
            && effective_confidence >= self.config.trade_threshold;

        CycleAssessment {
            phase,
            extra_elapsed: self.extra_elapsed(now),
            effective_confidence,
            predictor_agrees: predicted == Some(decision.direction),
            fire,
        }
    }

    /// Start a fresh accrual window after a trade attempt
    pub fn reset(&mut self, now: Instant) {
        self.state.cycle_start = now;
        self.state.last_reset = Some(now);
    }
}
