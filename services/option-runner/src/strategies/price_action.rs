//! Price Action - support/resistance rejection with volume confirmation
//!
//! - Call when the close sits on 50-bar support, the candle closed up by more
//!   than the call threshold and volume spiked above 1.5x its 20-bar average
//! - Put is the mirror image at resistance

use super::indicators::{sma, to_f64, volumes};
use super::{MarketWindow, SignalSource};
use crate::signal::Signal;

const LEVEL_LOOKBACK: usize = 50;
const VOLUME_PERIOD: usize = 20;
const VOLUME_SPIKE: f64 = 1.5;
const LEVEL_TOLERANCE: f64 = 0.001;
const CONFIDENCE: f64 = 0.75;

pub struct PriceActionSource {
    call_threshold: f64,
    put_threshold: f64,
}

impl PriceActionSource {
    pub fn new(call_threshold: f64, put_threshold: f64) -> Self {
        Self {
            call_threshold,
            put_threshold,
        }
    }
}

impl SignalSource for PriceActionSource {
    fn id(&self) -> &'static str {
        "price_action"
    }

    fn min_lookback(&self) -> usize {
        LEVEL_LOOKBACK
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let candles = &window.candles;
        if candles.len() < LEVEL_LOOKBACK {
            return Signal::neutral(self.id());
        }
        let recent = &candles[candles.len() - LEVEL_LOOKBACK..];
        let latest = &recent[recent.len() - 1];

        let support = recent.iter().map(|c| to_f64(c.low)).fold(f64::INFINITY, f64::min);
        let resistance = recent
            .iter()
            .map(|c| to_f64(c.high))
            .fold(f64::NEG_INFINITY, f64::max);

        let close = to_f64(latest.close);
        let movement = to_f64(latest.body());

        let volume_spike = match sma(&volumes(candles), VOLUME_PERIOD) {
            Some(avg) => to_f64(latest.volume) > avg * VOLUME_SPIKE,
            None => false,
        };
        if !volume_spike {
            return Signal::neutral(self.id());
        }

        if close <= support * (1.0 + LEVEL_TOLERANCE) && movement > self.call_threshold {
            Signal::call(self.id(), CONFIDENCE)
        } else if close >= resistance * (1.0 - LEVEL_TOLERANCE) && movement < self.put_threshold {
            Signal::put(self.id(), CONFIDENCE)
        } else {
            Signal::neutral(self.id())
        }
    }
}
