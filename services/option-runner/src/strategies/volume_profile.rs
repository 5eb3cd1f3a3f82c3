//! Volume Profile - where the close sits relative to the value area
//!
//! Volume of the last N bars is spread over 20 price levels between the
//! window low and high. The value area grows from the point of control
//! towards the heavier neighbour until it holds 70% of the volume.
//! Close below the value area: Call. Above: Put.

use super::indicators::to_f64;
use super::{MarketWindow, SignalSource};
use crate::signal::Signal;

const LEVELS: usize = 20;
const VALUE_AREA_SHARE: f64 = 0.7;
const MIN_BARS: usize = 20;
const CONFIDENCE: f64 = 0.8;

pub struct VolumeProfileSource {
    bars: usize,
}

/// Value area bounds in price terms
#[derive(Debug, Clone, Copy, PartialEq)]
struct ValueArea {
    low: f64,
    high: f64,
}

impl VolumeProfileSource {
    pub fn new(bars: usize) -> Self {
        Self {
            bars: bars.max(MIN_BARS),
        }
    }

    fn value_area(&self, window: &MarketWindow) -> Option<ValueArea> {
        let candles = &window.candles;
        let recent = &candles[candles.len().saturating_sub(self.bars)..];

        let low = recent.iter().map(|c| to_f64(c.low)).fold(f64::INFINITY, f64::min);
        let high = recent
            .iter()
            .map(|c| to_f64(c.high))
            .fold(f64::NEG_INFINITY, f64::max);
        let range = high - low;
        if !range.is_finite() || range <= 0.0 {
            return None;
        }
        let step = range / LEVELS as f64;
        let level_of = |price: f64| (((price - low) / step) as usize).min(LEVELS - 1);

        let mut profile = [0.0f64; LEVELS];
        for candle in recent {
            let a = level_of(to_f64(candle.low));
            let b = level_of(to_f64(candle.high));
            let (from, to) = (a.min(b), a.max(b));
            let share = to_f64(candle.volume) / (to - from + 1) as f64;
            for level in &mut profile[from..=to] {
                *level += share;
            }
        }
        let total: f64 = profile.iter().sum();
        if total <= 0.0 {
            return None;
        }

        let mut poc = 0;
        for (i, v) in profile.iter().enumerate() {
            if *v > profile[poc] {
                poc = i;
            }
        }

        let (mut lo, mut hi) = (poc, poc);
        let mut covered = profile[poc];
        while covered < total * VALUE_AREA_SHARE && (lo > 0 || hi < LEVELS - 1) {
            let below = if lo > 0 { profile[lo - 1] } else { -1.0 };
            let above = if hi < LEVELS - 1 { profile[hi + 1] } else { -1.0 };
            if above >= below {
                hi += 1;
                covered += profile[hi];
            } else {
                lo -= 1;
                covered += profile[lo];
            }
        }

        Some(ValueArea {
            low: low + lo as f64 * step,
            high: low + (hi + 1) as f64 * step,
        })
    }
}

impl SignalSource for VolumeProfileSource {
    fn id(&self) -> &'static str {
        "volume_profile"
    }

    fn min_lookback(&self) -> usize {
        MIN_BARS
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        if window.candles.len() < MIN_BARS {
            return Signal::neutral(self.id());
        }
        let (Some(area), Some(latest)) = (self.value_area(window), window.latest()) else {
            return Signal::neutral(self.id());
        };
        let close = to_f64(latest.close);

        if close < area.low {
            Signal::call(self.id(), CONFIDENCE)
        } else if close > area.high {
            Signal::put(self.id(), CONFIDENCE)
        } else {
            Signal::neutral(self.id())
        }
    }
}
