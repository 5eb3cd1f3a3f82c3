use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::types::{Candle, CandleFeedError, CandleSource, Result, TimeFrame};

/// Candle source backed by an HTTP market-data service
///
/// Endpoints:
/// - `GET {base}/candles/{symbol}?timeframe=1m&limit=N`
/// - `GET {base}/instruments/{symbol}`
pub struct HttpCandleSource {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    candles: Vec<WireCandle>,
}

#[derive(Debug, Deserialize)]
struct WireCandle {
    /// Interval open time, unix seconds
    from: i64,
    open: Decimal,
    #[serde(alias = "max")]
    high: Decimal,
    #[serde(alias = "min")]
    low: Decimal,
    close: Decimal,
    #[serde(default)]
    volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct InstrumentResponse {
    open: bool,
}

impl HttpCandleSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl TryFrom<WireCandle> for Candle {
    type Error = CandleFeedError;

    fn try_from(wire: WireCandle) -> Result<Self> {
        let timestamp = Utc
            .timestamp_opt(wire.from, 0)
            .single()
            .ok_or_else(|| CandleFeedError::InvalidResponse(format!("bad timestamp {}", wire.from)))?;
        if wire.low > wire.high
            || wire.open.max(wire.close) > wire.high
            || wire.open.min(wire.close) < wire.low
        {
            return Err(CandleFeedError::InvalidResponse(format!(
                "inconsistent candle at {}: open {} high {} low {} close {}",
                wire.from, wire.open, wire.high, wire.low, wire.close
            )));
        }
        Ok(Candle {
            timestamp,
            open: wire.open,
            high: wire.high,
            low: wire.low,
            close: wire.close,
            volume: wire.volume,
        })
    }
}

#[async_trait::async_trait]
impl CandleSource for HttpCandleSource {
    async fn latest_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/candles/{}", self.base_url, symbol);
        debug!("Fetching {} candles for {} from {}", limit, symbol, url);

        let limit = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("timeframe", timeframe.as_str()), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CandleFeedError::InstrumentUnavailable(symbol.to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CandleFeedError::ApiError(format!("{} - {}", status, text)));
        }

        let body: CandlesResponse = response
            .json()
            .await
            .map_err(|e| CandleFeedError::InvalidResponse(e.to_string()))?;

        let mut candles = body
            .candles
            .into_iter()
            .map(Candle::try_from)
            .collect::<Result<Vec<_>>>()?;
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    async fn is_available(&self, symbol: &str) -> Result<bool> {
        let url = format!("{}/instruments/{}", self.base_url, symbol);
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(CandleFeedError::ApiError(format!(
                "Instrument check failed: {}",
                response.status()
            )));
        }

        let body: InstrumentResponse = response
            .json()
            .await
            .map_err(|e| CandleFeedError::InvalidResponse(e.to_string()))?;
        Ok(body.open)
    }

    fn name(&self) -> &str {
        "http"
    }
}
