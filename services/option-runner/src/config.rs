//! Agent Configuration
//!
//! Loaded once at startup from an optional TOML file layered under
//! `OPTION_RUNNER_*` environment variables (nested keys use `__`, e.g.
//! `OPTION_RUNNER_CYCLE__CALIBRATION_SECS=120`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "OPTION_RUNNER";
pub const CONFIG_PATH_VAR: &str = "OPTION_RUNNER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "option-runner.toml";

/// Full agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub asset: AssetConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub signals: SignalConfig,
    /// Workspace for `state/now.json`
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            asset: AssetConfig::default(),
            cycle: CycleConfig::default(),
            risk: RiskConfig::default(),
            execution: ExecutionConfig::default(),
            data: DataConfig::default(),
            model: ModelConfig::default(),
            signals: SignalConfig::default(),
            state_dir: default_state_dir(),
            log_level: default_log_level(),
        }
    }
}

impl AgentConfig {
    /// Load from `.env`, the config file (if any) and the environment
    pub fn load() -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !matches!(e, dotenvy::Error::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound) {
                tracing::warn!("Failed to load .env file: {}", e);
            }
        }

        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let config: AgentConfig = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the loop cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.asset.symbol.trim().is_empty() {
            bail!("asset.symbol must not be empty");
        }
        if self.risk.risk_fraction.is_nan() || self.risk.risk_fraction <= 0.0 || self.risk.risk_fraction >= 1.0 {
            bail!("risk.risk_fraction must be between 0 and 1 (exclusive)");
        }
        if self.risk.min_stake <= Decimal::ZERO {
            bail!("risk.min_stake must be positive");
        }
        if self.risk.min_stake > self.risk.max_stake {
            bail!("risk.min_stake cannot exceed risk.max_stake");
        }
        if self.cycle.trade_threshold.is_nan() || self.cycle.trade_threshold <= 0.0 {
            bail!("cycle.trade_threshold must be positive");
        }
        let bonuses = [self.cycle.time_bonus_per_sec, self.cycle.predictor_bonus];
        if bonuses.iter().any(|b| b.is_nan() || *b < 0.0) {
            bail!("cycle bonuses must be non-negative numbers");
        }
        if self.cycle.tick_millis == 0 {
            bail!("cycle.tick_millis must be positive");
        }
        if self.execution.trade_duration_secs == 0
            || self.execution.settlement_poll_millis == 0
            || self.execution.request_timeout_secs == 0
        {
            bail!("execution durations must be positive");
        }
        if self.data.poll_secs == 0 || self.data.window_capacity == 0 {
            bail!("data.poll_secs and data.window_capacity must be positive");
        }
        if self.model.sequence_length < 2 {
            bail!("model.sequence_length must be at least 2");
        }
        if self.model.retrain_interval_secs == 0 {
            bail!("model.retrain_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn tracing_level(&self) -> tracing::Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    pub fn model_path(&self) -> PathBuf {
        match &self.model.path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("models").join(format!(
                "{}_{}.json",
                self.asset.symbol,
                self.asset.market_type.label()
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    /// OTC digital options
    #[default]
    Digital,
    /// Regular forex session
    Forex,
}

impl MarketType {
    fn label(&self) -> &'static str {
        match self {
            MarketType::Digital => "Digital",
            MarketType::Forex => "Forex",
        }
    }

    pub fn default_hours(&self) -> MarketHours {
        let at = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or_default();
        match self {
            MarketType::Digital => MarketHours { open: at(8), close: at(17) },
            MarketType::Forex => MarketHours { open: at(7), close: at(16) },
        }
    }
}

/// Trading session in local time
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct MarketHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl MarketHours {
    /// Close is `margin` or less away (or already passed)
    pub fn closes_within(&self, now: NaiveTime, margin: chrono::Duration) -> bool {
        self.close.signed_duration_since(now) <= margin
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetConfig {
    /// Instrument the candles are read from
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Instrument orders are placed on, `<symbol>-op` when unset
    #[serde(default)]
    pub order_symbol: Option<String>,
    #[serde(default)]
    pub market_type: MarketType,
    /// Overrides the market type's default session
    #[serde(default)]
    pub market_hours: Option<MarketHours>,
    #[serde(default = "default_close_safety_margin_minutes")]
    pub close_safety_margin_minutes: i64,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            order_symbol: None,
            market_type: MarketType::default(),
            market_hours: None,
            close_safety_margin_minutes: default_close_safety_margin_minutes(),
        }
    }
}

impl AssetConfig {
    pub fn order_symbol(&self) -> String {
        self.order_symbol
            .clone()
            .unwrap_or_else(|| format!("{}-op", self.symbol))
    }

    pub fn market_hours(&self) -> MarketHours {
        self.market_hours
            .unwrap_or_else(|| self.market_type.default_hours())
    }

    pub fn close_safety_margin(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.close_safety_margin_minutes)
    }
}

/// Calibration and confidence accrual
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct CycleConfig {
    #[serde(default = "default_calibration_secs")]
    pub calibration_secs: u64,
    #[serde(default = "default_trade_threshold")]
    pub trade_threshold: f64,
    #[serde(default = "default_time_bonus_per_sec")]
    pub time_bonus_per_sec: f64,
    /// Added when the predictor agrees with the consolidated direction
    #[serde(default = "default_predictor_bonus")]
    pub predictor_bonus: f64,
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            calibration_secs: default_calibration_secs(),
            trade_threshold: default_trade_threshold(),
            time_bonus_per_sec: default_time_bonus_per_sec(),
            predictor_bonus: default_predictor_bonus(),
            tick_millis: default_tick_millis(),
        }
    }
}

impl CycleConfig {
    pub fn calibration(&self) -> Duration {
        Duration::from_secs(self.calibration_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct RiskConfig {
    #[serde(default = "default_risk_fraction")]
    pub risk_fraction: f64,
    /// Broker minimum stake
    #[serde(default = "default_min_stake")]
    pub min_stake: Decimal,
    /// Broker maximum stake
    #[serde(default = "default_max_stake")]
    pub max_stake: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_fraction: default_risk_fraction(),
            min_stake: default_min_stake(),
            max_stake: default_max_stake(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
        }
    }
}

/// Trade placement and settlement wait
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct ExecutionConfig {
    #[serde(default = "default_trade_duration_secs")]
    pub trade_duration_secs: u64,
    /// Extra wait past expiry before a trade counts as timed out
    #[serde(default = "default_settlement_grace_secs")]
    pub settlement_grace_secs: u64,
    #[serde(default = "default_settlement_poll_millis")]
    pub settlement_poll_millis: u64,
    /// Upper bound on a single balance query or order placement
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub trading_mode: TradingMode,
    /// Starting balance of the paper broker
    #[serde(default = "default_paper_balance")]
    pub paper_balance: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            trade_duration_secs: default_trade_duration_secs(),
            settlement_grace_secs: default_settlement_grace_secs(),
            settlement_poll_millis: default_settlement_poll_millis(),
            request_timeout_secs: default_request_timeout_secs(),
            trading_mode: TradingMode::default(),
            paper_balance: default_paper_balance(),
        }
    }
}

impl ExecutionConfig {
    pub fn trade_duration(&self) -> Duration {
        Duration::from_secs(self.trade_duration_secs)
    }

    /// Upper bound on the settlement wait
    pub fn settlement_timeout(&self) -> Duration {
        Duration::from_secs(self.trade_duration_secs + self.settlement_grace_secs)
    }

    pub fn settlement_poll(&self) -> Duration {
        Duration::from_millis(self.settlement_poll_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Candle collection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    /// HTTP candle service; the synthetic feed is used when unset
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default = "default_history_fetch")]
    pub history_fetch: usize,
    #[serde(default = "default_max_staleness_secs")]
    pub max_staleness_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            window_capacity: default_window_capacity(),
            poll_secs: default_poll_secs(),
            fetch_limit: default_fetch_limit(),
            history_fetch: default_history_fetch(),
            max_staleness_secs: default_max_staleness_secs(),
        }
    }
}

impl DataConfig {
    pub fn max_staleness(&self) -> Duration {
        Duration::from_secs(self.max_staleness_secs)
    }
}

/// Direction predictor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Saved model file, `models/<symbol>_<type>.json` when unset
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,
    #[serde(default = "default_retrain_interval_secs")]
    pub retrain_interval_secs: u64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            sequence_length: default_sequence_length(),
            retrain_interval_secs: default_retrain_interval_secs(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
        }
    }
}

impl ModelConfig {
    pub fn retrain_interval(&self) -> Duration {
        Duration::from_secs(self.retrain_interval_secs)
    }
}

/// Strategy thresholds
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct SignalConfig {
    /// Minimum candle body for a bullish price-action signal
    #[serde(default = "default_call_threshold")]
    pub call_threshold: f64,
    #[serde(default = "default_put_threshold")]
    pub put_threshold: f64,
    #[serde(default = "default_event_impact_min")]
    pub event_impact_min: f64,
    #[serde(default = "default_volume_profile_bars")]
    pub volume_profile_bars: usize,
    /// How long a published market event stays live
    #[serde(default = "default_event_ttl_secs")]
    pub event_ttl_secs: i64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            call_threshold: default_call_threshold(),
            put_threshold: default_put_threshold(),
            event_impact_min: default_event_impact_min(),
            volume_profile_bars: default_volume_profile_bars(),
            event_ttl_secs: default_event_ttl_secs(),
        }
    }
}

fn default_state_dir() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("option-runner"))
        .unwrap_or_else(|| PathBuf::from("."))
        .to_string_lossy()
        .into_owned()
}
fn default_log_level() -> String { "info".to_string() }
fn default_symbol() -> String { "EURUSD-OTC".to_string() }
fn default_close_safety_margin_minutes() -> i64 { 10 }
fn default_calibration_secs() -> u64 { 300 }
fn default_trade_threshold() -> f64 { 1.0 }
fn default_time_bonus_per_sec() -> f64 { 0.001 }
fn default_predictor_bonus() -> f64 { 0.1 }
fn default_tick_millis() -> u64 { 1000 }
fn default_risk_fraction() -> f64 { 0.05 }
fn default_min_stake() -> Decimal { Decimal::ONE }
fn default_max_stake() -> Decimal { Decimal::from(20_000) }
fn default_trade_duration_secs() -> u64 { 60 }
fn default_settlement_grace_secs() -> u64 { 5 }
fn default_settlement_poll_millis() -> u64 { 500 }
fn default_request_timeout_secs() -> u64 { 10 }
fn default_paper_balance() -> Decimal { Decimal::from(10_000) }
fn default_window_capacity() -> usize { candle_feed::window::DEFAULT_CAPACITY }
fn default_poll_secs() -> u64 { 1 }
fn default_fetch_limit() -> usize { 20 }
fn default_history_fetch() -> usize { 1000 }
fn default_max_staleness_secs() -> u64 { 120 }
fn default_sequence_length() -> usize { 10 }
fn default_retrain_interval_secs() -> u64 { 3 * 3600 }
fn default_epochs() -> usize { 200 }
fn default_learning_rate() -> f64 { 0.05 }
fn default_call_threshold() -> f64 { 0.0005 }
fn default_put_threshold() -> f64 { -0.0005 }
fn default_event_impact_min() -> f64 { 0.7 }
fn default_volume_profile_bars() -> usize { 100 }
fn default_event_ttl_secs() -> i64 { 900 }
