//! Momentum - fast RSI combined with MACD crossover state
//!
//! Call when RSI(5) is below 35 while MACD is above its signal line (selling
//! exhaustion with turning momentum), Put for the mirror case.

use super::indicators::{closes, macd, rsi};
use super::{MarketWindow, SignalSource};
use crate::signal::Signal;

const RSI_PERIOD: usize = 5;
const RSI_OVERSOLD: f64 = 35.0;
const RSI_OVERBOUGHT: f64 = 65.0;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const LOOKBACK: usize = 35;
const CONFIDENCE: f64 = 0.7;

pub struct MomentumSource;

impl MomentumSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MomentumSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for MomentumSource {
    fn id(&self) -> &'static str {
        "momentum"
    }

    fn min_lookback(&self) -> usize {
        LOOKBACK
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        if window.candles.len() < LOOKBACK {
            return Signal::neutral(self.id());
        }
        let prices = closes(&window.candles);

        let (Some(rsi), Some((line, signal_line))) = (
            rsi(&prices, RSI_PERIOD),
            macd(&prices, MACD_FAST, MACD_SLOW, MACD_SIGNAL),
        ) else {
            return Signal::neutral(self.id());
        };
        let macd_diff = line - signal_line;

        if rsi < RSI_OVERSOLD && macd_diff > 0.0 {
            Signal::call(self.id(), CONFIDENCE)
        } else if rsi > RSI_OVERBOUGHT && macd_diff < 0.0 {
            Signal::put(self.id(), CONFIDENCE)
        } else {
            Signal::neutral(self.id())
        }
    }
}
