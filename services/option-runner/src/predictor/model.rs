//! Logistic direction model
//!
//! Features per bar (computed on closes, ascending):
//! 0. return over the last `sequence_length` bars
//! 1. close minus its rolling mean
//! 2. rolling standard deviation
//! 3. RSI(5), scaled to [0, 1]
//! 4. MACD(12, 26) line
//! 5. position inside Bollinger(20, 2) bands
//!
//! Label: next close above the current close. Features are standardised
//! with the training means/scales, which are saved with the weights.

use std::path::Path;

use candle_feed::Candle;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ModelError;
use crate::config::ModelConfig;
use crate::signal::Direction;
use crate::strategies::indicators::{bollinger_position, closes, macd_line_series, rsi_series, sma, std_dev};

pub const FEATURES: usize = 6;
const RSI_PERIOD: usize = 5;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const BOLLINGER_PERIOD: usize = 20;
const MIN_SAMPLES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingParams {
    pub sequence_length: usize,
    pub epochs: usize,
    pub learning_rate: f64,
}

impl From<&ModelConfig> for TrainingParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            sequence_length: config.sequence_length,
            epochs: config.epochs,
            learning_rate: config.learning_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionModel {
    weights: Vec<f64>,
    bias: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
    pub sequence_length: usize,
    pub trained_at: DateTime<Utc>,
    pub samples: usize,
    /// In-sample accuracy
    pub accuracy: f64,
}

impl DirectionModel {
    /// Candles needed before the model will give an opinion
    pub fn min_history(sequence_length: usize) -> usize {
        sequence_length + MACD_SLOW
    }

    pub fn train(candles: &[Candle], params: &TrainingParams) -> Result<Self, ModelError> {
        let prices = closes(candles);
        let rows = feature_rows(&prices, params.sequence_length);

        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for i in 0..prices.len().saturating_sub(1) {
            if let Some(row) = rows[i] {
                xs.push(row);
                ys.push(if prices[i + 1] > prices[i] { 1.0 } else { 0.0 });
            }
        }
        if xs.len() < MIN_SAMPLES {
            return Err(ModelError::InsufficientData {
                needed: MIN_SAMPLES,
                got: xs.len(),
            });
        }

        let n = xs.len() as f64;
        let mut means = vec![0.0; FEATURES];
        let mut scales = vec![0.0; FEATURES];
        for f in 0..FEATURES {
            let mean = xs.iter().map(|x| x[f]).sum::<f64>() / n;
            let var = xs.iter().map(|x| (x[f] - mean).powi(2)).sum::<f64>() / n;
            means[f] = mean;
            scales[f] = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };
        }
        let standardised: Vec<[f64; FEATURES]> = xs
            .iter()
            .map(|x| standardise(x, &means, &scales))
            .collect();

        let mut weights = vec![0.0; FEATURES];
        let mut bias = 0.0;
        for _ in 0..params.epochs {
            let mut grad_w = [0.0; FEATURES];
            let mut grad_b = 0.0;
            for (x, y) in standardised.iter().zip(&ys) {
                let err = sigmoid(dot(&weights, x) + bias) - y;
                for f in 0..FEATURES {
                    grad_w[f] += err * x[f];
                }
                grad_b += err;
            }
            for f in 0..FEATURES {
                weights[f] -= params.learning_rate * grad_w[f] / n;
            }
            bias -= params.learning_rate * grad_b / n;
        }

        let correct = standardised
            .iter()
            .zip(&ys)
            .filter(|(x, y)| (sigmoid(dot(&weights, *x) + bias) > 0.5) == (**y > 0.5))
            .count();
        let accuracy = correct as f64 / n;
        info!(
            "Trained direction model on {} samples, in-sample accuracy {:.1}%",
            xs.len(),
            accuracy * 100.0
        );

        Ok(Self {
            weights,
            bias,
            means,
            scales,
            sequence_length: params.sequence_length,
            trained_at: Utc::now(),
            samples: xs.len(),
            accuracy,
        })
    }

    /// Probability that the next close is higher, `None` on short history
    pub fn probability_up(&self, candles: &[Candle]) -> Option<f64> {
        if candles.len() < Self::min_history(self.sequence_length) {
            return None;
        }
        let prices = closes(candles);
        let row = feature_row(&prices, prices.len() - 1, self.sequence_length)?;
        let x = standardise(&row, &self.means, &self.scales);
        Some(sigmoid(dot(&self.weights, &x) + self.bias))
    }

    pub fn predict(&self, candles: &[Candle]) -> Option<Direction> {
        self.probability_up(candles).map(|p| {
            if p > 0.5 {
                Direction::Call
            } else {
                Direction::Put
            }
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved direction model to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        if model.weights.len() != FEATURES
            || model.means.len() != FEATURES
            || model.scales.len() != FEATURES
        {
            return Err(ModelError::Corrupt(format!(
                "expected {} features, found {}",
                FEATURES,
                model.weights.len()
            )));
        }
        Ok(model)
    }

    /// Saved model if one exists and was trained within `max_age` of `now`
    pub fn load_if_fresh(
        path: &Path,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, ModelError> {
        if !path.exists() {
            return Ok(None);
        }
        let model = Self::load(path)?;
        if now - model.trained_at < max_age {
            Ok(Some(model))
        } else {
            Ok(None)
        }
    }
}

/// Feature rows aligned with `prices`; `None` where history is too short
fn feature_rows(prices: &[f64], sequence_length: usize) -> Vec<Option<[f64; FEATURES]>> {
    let rsi = rsi_series(prices, RSI_PERIOD);
    let macd = macd_line_series(prices, MACD_FAST, MACD_SLOW);
    (0..prices.len())
        .map(|i| build_row(prices, i, sequence_length, &rsi, &macd))
        .collect()
}

fn feature_row(prices: &[f64], i: usize, sequence_length: usize) -> Option<[f64; FEATURES]> {
    let rsi = rsi_series(prices, RSI_PERIOD);
    let macd = macd_line_series(prices, MACD_FAST, MACD_SLOW);
    build_row(prices, i, sequence_length, &rsi, &macd)
}

fn build_row(
    prices: &[f64],
    i: usize,
    sequence_length: usize,
    rsi: &[f64],
    macd: &[f64],
) -> Option<[f64; FEATURES]> {
    if sequence_length < 2 || i + 1 < sequence_length || i < MACD_SLOW - 1 || i < RSI_PERIOD {
        return None;
    }
    let history = &prices[..=i];
    let first = prices[i + 1 - sequence_length];
    let ret = if first != 0.0 { (prices[i] - first) / first } else { 0.0 };
    let mean = sma(history, sequence_length)?;
    let sd = std_dev(history, sequence_length)?;
    let rsi = rsi.get(i - RSI_PERIOD)? / 100.0;
    let macd = *macd.get(i + 1 - MACD_SLOW)?;
    let bollinger = bollinger_position(history, BOLLINGER_PERIOD, 2.0)?;
    Some([ret, prices[i] - mean, sd, rsi, macd, bollinger])
}

fn standardise(x: &[f64; FEATURES], means: &[f64], scales: &[f64]) -> [f64; FEATURES] {
    let mut out = [0.0; FEATURES];
    for f in 0..FEATURES {
        out[f] = (x[f] - means[f]) / scales[f];
    }
    out
}

fn dot(weights: &[f64], x: &[f64; FEATURES]) -> f64 {
    weights.iter().zip(x).map(|(w, v)| w * v).sum()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testing::candle;

    fn params() -> TrainingParams {
        TrainingParams {
            sequence_length: 10,
            epochs: 200,
            learning_rate: 0.5,
        }
    }

    /// Closes alternate between two levels, so the next move is always
    /// back towards the other one
    fn zigzag(n: usize) -> Vec<Candle> {
        (0..n as i64)
            .map(|i| {
                let p = if i % 2 == 0 { 1.1000 } else { 1.1010 };
                candle(i, p, p + 0.0005, p - 0.0005, p, 100.0)
            })
            .collect()
    }

    #[test]
    fn test_short_history_is_rejected() {
        let err = DirectionModel::train(&zigzag(30), &params()).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { .. }));
    }

    #[test]
    fn test_learns_mean_reverting_series() {
        let candles = zigzag(300);
        let model = DirectionModel::train(&candles, &params()).unwrap();
        assert!(model.accuracy > 0.9);

        // Last bar (index 299) is at the upper level: expect a move down
        assert_eq!(model.predict(&candles), Some(Direction::Put));
        assert_eq!(model.predict(&candles[..299]), Some(Direction::Call));
    }

    #[test]
    fn test_no_opinion_on_short_window() {
        let model = DirectionModel::train(&zigzag(300), &params()).unwrap();
        assert_eq!(model.predict(&zigzag(DirectionModel::min_history(10) - 1)), None);
    }

    #[test]
    fn test_save_and_load_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("EURUSD.json");
        let model = DirectionModel::train(&zigzag(300), &params()).unwrap();
        model.save(&path).unwrap();

        let loaded = DirectionModel::load_if_fresh(&path, Duration::hours(3), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.trained_at, model.trained_at);
        assert_eq!(loaded.samples, model.samples);

        let later = model.trained_at + Duration::hours(4);
        assert!(DirectionModel::load_if_fresh(&path, Duration::hours(3), later)
            .unwrap()
            .is_none());

        let missing = dir.path().join("missing.json");
        assert!(DirectionModel::load_if_fresh(&missing, Duration::hours(3), Utc::now())
            .unwrap()
            .is_none());
    }
}
