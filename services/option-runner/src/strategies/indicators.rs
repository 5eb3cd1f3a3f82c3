//! Indicator helpers shared by the signal sources and the predictor features.
//!
//! All helpers work on `f64` series in ascending time order and return `None`
//! when the series is too short.

use candle_feed::Candle;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| to_f64(c.close)).collect()
}

pub fn volumes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| to_f64(c.volume)).collect()
}

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let sum: f64 = values[values.len() - period..].iter().sum();
    Some(sum / period as f64)
}

/// Population standard deviation of the last `period` values
pub fn std_dev(values: &[f64], period: usize) -> Option<f64> {
    let mean = sma(values, period)?;
    let var = values[values.len() - period..]
        .iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / period as f64;
    Some(var.sqrt())
}

/// EMA series seeded with the SMA of the first `period` values.
///
/// Element `i` of the result corresponds to `values[period - 1 + i]`.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(ema);
    for v in &values[period..] {
        ema = (v - ema) * k + ema;
        out.push(ema);
    }
    out
}

pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).last().copied()
}

/// Wilder RSI series.
///
/// Element `i` of the result corresponds to `values[period + i]`.
pub fn rsi_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period + 1 {
        return Vec::new();
    }
    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period].iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period]
        .iter()
        .filter(|c| **c < 0.0)
        .map(|c| c.abs())
        .sum::<f64>()
        / period as f64;

    let mut out = Vec::with_capacity(changes.len() - period + 1);
    out.push(rsi_value(avg_gain, avg_loss));
    for change in &changes[period..] {
        let (gain, loss) = if *change > 0.0 {
            (*change, 0.0)
        } else {
            (0.0, change.abs())
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out.push(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// Wilder RSI of the latest value
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    rsi_series(values, period).last().copied()
}

/// MACD line series (fast EMA minus slow EMA).
///
/// Element `i` of the result corresponds to `values[slow - 1 + i]`.
pub fn macd_line_series(values: &[f64], fast: usize, slow: usize) -> Vec<f64> {
    if fast == 0 || fast >= slow {
        return Vec::new();
    }
    let fast_series = ema_series(values, fast);
    let slow_series = ema_series(values, slow);
    // Slow starts `slow - fast` elements later
    let offset = slow - fast;
    slow_series
        .iter()
        .enumerate()
        .map(|(i, s)| fast_series[i + offset] - s)
        .collect()
}

/// Latest MACD line and signal line
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Option<(f64, f64)> {
    if fast >= slow || values.len() < slow + signal - 1 {
        return None;
    }
    let line = macd_line_series(values, fast, slow);
    let signal_line = ema(&line, signal)?;
    Some((*line.last()?, signal_line))
}

/// Position of the latest value inside Bollinger bands, roughly in [-0.5, 0.5]
pub fn bollinger_position(values: &[f64], period: usize, width: f64) -> Option<f64> {
    let middle = sma(values, period)?;
    let sd = std_dev(values, period)?;
    let band = 2.0 * width * sd;
    let last = *values.last()?;
    Some((last - middle) / (band + 1e-6))
}
