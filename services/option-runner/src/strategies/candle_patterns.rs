//! Candlestick patterns on the latest bar
//!
//! - Hammer (bullish body, long lower wick, small upper wick): Call
//! - Shooting star or pinocchio bar (upper wick over twice the body): Put

use super::indicators::to_f64;
use super::{MarketWindow, SignalSource};
use crate::signal::Signal;

const WICK_TOLERANCE: f64 = 0.001;

pub struct CandlePatternSource;

impl CandlePatternSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CandlePatternSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for CandlePatternSource {
    fn id(&self) -> &'static str {
        "candle_patterns"
    }

    fn min_lookback(&self) -> usize {
        1
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let Some(latest) = window.latest() else {
            return Signal::neutral(self.id());
        };
        let open = to_f64(latest.open);
        let high = to_f64(latest.high);
        let low = to_f64(latest.low);
        let close = to_f64(latest.close);

        let is_hammer =
            close > open && low < open * (1.0 - WICK_TOLERANCE) && high - close < close - open;
        let is_shooting_star =
            close < open && high > open * (1.0 + WICK_TOLERANCE) && close - low < open - close;
        let is_pinocchio = high - open.max(close) > 2.0 * (open - close).abs();

        if is_hammer {
            Signal::call(self.id(), 0.8)
        } else if is_shooting_star || is_pinocchio {
            Signal::put(self.id(), 0.85)
        } else {
            Signal::neutral(self.id())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Direction;
    use crate::strategies::testing::candle;

    fn eval(open: f64, high: f64, low: f64, close: f64) -> Signal {
        CandlePatternSource::new().evaluate(&MarketWindow::new(vec![candle(
            0, open, high, low, close, 100.0,
        )]))
    }

    #[test]
    fn test_hammer_is_call() {
        let signal = eval(1.1000, 1.1012, 1.0980, 1.1010);
        assert_eq!(signal.direction, Direction::Call);
        assert_eq!(signal.confidence, 0.8);
    }

    #[test]
    fn test_shooting_star_is_put() {
        let signal = eval(1.1000, 1.1020, 1.0988, 1.0990);
        assert_eq!(signal.direction, Direction::Put);
        assert_eq!(signal.confidence, 0.85);
    }

    #[test]
    fn test_plain_bar_is_neutral() {
        let signal = eval(1.1000, 1.1011, 1.0999, 1.1010);
        assert_eq!(signal.direction, Direction::Neutral);
    }

    #[test]
    fn test_empty_window_is_neutral() {
        let signal = CandlePatternSource::new().evaluate(&MarketWindow::default());
        assert_eq!(signal.direction, Direction::Neutral);
    }
}
