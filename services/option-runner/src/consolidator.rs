//! Signal consolidation - one decision per tick from all strategy signals
//!
//! Signals are grouped by direction and their confidences summed. The group
//! with the strictly largest sum wins. When the top sum is shared by more
//! than one direction the evidence conflicts and the decision is neutral,
//! carrying the neutral group's own sum so the per-direction totals stay
//! exact.

use tracing::info;

use crate::signal::{ConsolidatedDecision, Direction, Signal};

const DIRECTIONS: [Direction; 3] = [Direction::Call, Direction::Put, Direction::Neutral];

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalConsolidator;

impl SignalConsolidator {
    pub fn new() -> Self {
        Self
    }

    pub fn consolidate(&self, signals: &[Signal]) -> ConsolidatedDecision {
        let decision = consolidate(signals);
        info!(
            "Consolidated: {} confidence={:.3} dominant={}",
            decision.direction,
            decision.confidence,
            decision.dominant_strategy.as_deref().unwrap_or("-")
        );
        decision
    }
}

/// Sum of confidences of the signals pointing in `direction`, if any do
pub fn group_sum(signals: &[Signal], direction: Direction) -> Option<f64> {
    let mut group = signals.iter().filter(|s| s.direction == direction).peekable();
    group.peek()?;
    Some(group.map(|s| s.confidence).sum())
}

pub fn consolidate(signals: &[Signal]) -> ConsolidatedDecision {
    let sums: Vec<(Direction, f64)> = DIRECTIONS
        .iter()
        .filter_map(|d| group_sum(signals, *d).map(|sum| (*d, sum)))
        .collect();

    let Some(top) = sums.iter().map(|(_, sum)| *sum).reduce(f64::max) else {
        return ConsolidatedDecision::empty();
    };
    let leaders: Vec<Direction> = sums
        .iter()
        .filter(|(_, sum)| *sum == top)
        .map(|(d, _)| *d)
        .collect();

    let direction = match leaders.as_slice() {
        [only] => *only,
        _ => Direction::Neutral,
    };
    let confidence = group_sum(signals, direction).unwrap_or(0.0);

    ConsolidatedDecision {
        direction,
        confidence,
        dominant_strategy: dominant(signals, direction),
    }
}

/// Largest single contribution to `direction`, earliest on ties
fn dominant(signals: &[Signal], direction: Direction) -> Option<String> {
    let mut best: Option<&Signal> = None;
    for signal in signals.iter().filter(|s| s.direction == direction) {
        if best.map_or(true, |b| signal.confidence > b.confidence) {
            best = Some(signal);
        }
    }
    best.map(|s| s.strategy_id.clone())
}
