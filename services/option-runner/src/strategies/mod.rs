//! Signal Sources - independent strategy evaluators
//!
//! Every strategy implements [`SignalSource`] and is registered into an
//! ordered [`StrategySet`]. Registration order is the order signals are
//! produced in, which the consolidator uses for tie-breaks between
//! individual contributions.

use candle_feed::Candle;

use crate::config::SignalConfig;
use crate::signal::Signal;

pub mod candle_patterns;
pub mod event_impact;
pub mod indicators;
pub mod momentum;
pub mod price_action;
pub mod volume_profile;

pub use candle_patterns::CandlePatternSource;
pub use event_impact::{EventImpactSource, MarketEvent, MarketEvents};
pub use momentum::MomentumSource;
pub use price_action::PriceActionSource;
pub use volume_profile::VolumeProfileSource;

/// Market data visible to the strategies for one tick
#[derive(Debug, Clone, Default)]
pub struct MarketWindow {
    /// Ascending by timestamp, deduplicated
    pub candles: Vec<Candle>,
    /// Latest external event still considered live
    pub event: Option<MarketEvent>,
}

impl MarketWindow {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles,
            event: None,
        }
    }

    pub fn with_event(mut self, event: Option<MarketEvent>) -> Self {
        self.event = event;
        self
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

/// Strategy contract
///
/// `evaluate` is a pure function of the window. A window shorter than
/// `min_lookback` yields a neutral signal, never an error.
pub trait SignalSource: Send + Sync {
    fn id(&self) -> &'static str;

    /// Candles required for a non-neutral opinion
    fn min_lookback(&self) -> usize;

    fn evaluate(&self, window: &MarketWindow) -> Signal;
}

/// Registered, ordered collection of signal sources
#[derive(Default)]
pub struct StrategySet {
    sources: Vec<Box<dyn SignalSource>>,
}

impl StrategySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All five built-in strategies in their canonical order
    pub fn standard(config: &SignalConfig) -> Self {
        let mut set = Self::new();
        set.register(Box::new(PriceActionSource::new(
            config.call_threshold,
            config.put_threshold,
        )));
        set.register(Box::new(CandlePatternSource::new()));
        set.register(Box::new(MomentumSource::new()));
        set.register(Box::new(EventImpactSource::new(config.event_impact_min)));
        set.register(Box::new(VolumeProfileSource::new(config.volume_profile_bars)));
        set
    }

    pub fn register(&mut self, source: Box<dyn SignalSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    /// Remove a strategy by id, returning whether it was registered
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s.id() != id);
        self.sources.len() != before
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Longest lookback among registered strategies
    pub fn max_lookback(&self) -> usize {
        self.sources.iter().map(|s| s.min_lookback()).max().unwrap_or(0)
    }

    /// One signal per registered source, in registration order
    pub fn evaluate_all(&self, window: &MarketWindow) -> Vec<Signal> {
        self.sources.iter().map(|s| s.evaluate(window)).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Direction;

    #[test]
    fn test_standard_set_order_and_lookback() {
        let set = StrategySet::standard(&SignalConfig::default());
        assert_eq!(
            set.ids(),
            vec![
                "price_action",
                "candle_patterns",
                "momentum",
                "event_impact",
                "volume_profile"
            ]
        );
        assert!(set.max_lookback() >= 35);
    }

    #[test]
    fn test_empty_window_is_all_neutral() {
        let set = StrategySet::standard(&SignalConfig::default());
        let signals = set.evaluate_all(&MarketWindow::default());
        assert_eq!(signals.len(), 5);
        assert!(signals
            .iter()
            .all(|s| s.direction == Direction::Neutral && s.confidence == 0.0));
    }

    #[test]
    fn test_remove_strategy() {
        let mut set = StrategySet::standard(&SignalConfig::default());
        assert!(set.remove("event_impact"));
        assert!(!set.remove("event_impact"));
        assert_eq!(set.len(), 4);
    }
}
