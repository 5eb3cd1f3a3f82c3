use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLCV candle for one fixed interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>, // interval open time, unique per window
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Body size (close - open), signed
    pub fn body(&self) -> Decimal {
        self.close - self.open
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// Supported candle intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeFrame {
    #[default]
    Minute1,
    Minute5,
    Minute15,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::Minute1 => "1m",
            TimeFrame::Minute5 => "5m",
            TimeFrame::Minute15 => "15m",
        }
    }

    pub fn to_seconds(&self) -> i64 {
        match self {
            TimeFrame::Minute1 => 60,
            TimeFrame::Minute5 => 300,
            TimeFrame::Minute15 => 900,
        }
    }
}

/// Feed health as seen by the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub is_healthy: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

/// Error types for candle retrieval
#[derive(Debug, thiserror::Error)]
pub enum CandleFeedError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Instrument unavailable: {0}")]
    InstrumentUnavailable(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CandleFeedError>;

/// Market-data collaborator
///
/// Implementations return candles in ascending timestamp order. Duplicate
/// timestamps are tolerated; the window deduplicates on merge.
#[async_trait::async_trait]
pub trait CandleSource: Send + Sync {
    /// Most recent `limit` candles for `symbol`
    async fn latest_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    /// Whether the instrument is currently open for trading
    async fn is_available(&self, symbol: &str) -> Result<bool>;

    fn name(&self) -> &str;
}
