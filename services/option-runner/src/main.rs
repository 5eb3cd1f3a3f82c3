//! Option Runner - binary options agent
//!
//! 1. Loads configuration (file, environment, `.env`)
//! 2. Backfills candle history and starts the collector
//! 3. Loads or trains the direction model and schedules retraining
//! 4. Runs the decision loop until stopped, the market nears close or the
//!    feed goes away

use std::sync::Arc;

use anyhow::Context;
use candle_feed::{CandleCollector, CandleSource, CollectorConfig, HttpCandleSource, SharedWindow, TimeFrame};
use tokio::sync::watch;
use tracing::{error, info, warn};

use option_runner::config::{AgentConfig, TradingMode};
use option_runner::gate::{GateSettings, TradeGate};
use option_runner::paper::{PaperBroker, SyntheticSource};
use option_runner::predictor::{self, ModelPredictor, ModelRegistry, RetrainScheduler, TrainingParams};
use option_runner::risk::RiskSizer;
use option_runner::runner::{AgentRunner, HaltReason, RunnerSettings};
use option_runner::state::StateManager;
use option_runner::strategies::{MarketEvents, StrategySet};

/// Opening price of the synthetic feed
const SYNTHETIC_START_PRICE: f64 = 1.1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::load()?;

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .init();

    info!("Starting Option Runner...");
    info!(
        "Asset {} ({:?}), orders on {}, {} mode",
        config.asset.symbol,
        config.asset.market_type,
        config.asset.order_symbol(),
        config.execution.trading_mode.as_str()
    );

    if config.execution.trading_mode == TradingMode::Live {
        anyhow::bail!("live trading needs a broker integration; only paper mode is available");
    }

    let state_manager = StateManager::new(&config.state_dir);
    state_manager.init().await.context("Failed to create state directory")?;

    // Market data
    let window = SharedWindow::new(config.data.window_capacity);
    let source: Arc<dyn CandleSource> = match &config.data.source_url {
        Some(url) => Arc::new(HttpCandleSource::new(url)?),
        None => {
            warn!("No data.source_url configured, using the synthetic feed");
            Arc::new(SyntheticSource::new(SYNTHETIC_START_PRICE))
        }
    };
    let mut collector = CandleCollector::new(
        source,
        window.clone(),
        CollectorConfig {
            symbol: config.asset.symbol.clone(),
            timeframe: TimeFrame::Minute1,
            poll_interval: std::time::Duration::from_secs(config.data.poll_secs),
            fetch_limit: config.data.fetch_limit,
            history_fetch: config.data.history_fetch,
        },
    );
    collector
        .backfill()
        .await
        .context("Failed to load candle history")?;

    // Direction model
    let registry = ModelRegistry::new();
    let params = TrainingParams::from(&config.model);
    let model_path = config.model_path();
    let max_age = chrono::Duration::from_std(config.model.retrain_interval())
        .context("model.retrain_interval_secs is out of range")?;
    let history = window.snapshot().await;
    {
        let registry = registry.clone();
        let path = model_path.clone();
        tokio::task::spawn_blocking(move || {
            predictor::bootstrap(&registry, &path, max_age, &history.candles, &params)
        })
        .await
        .context("Model bootstrap task failed")?;
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let collector_handle = collector.spawn(stop_rx.clone());
    let retrain_handle = RetrainScheduler::new(
        registry.clone(),
        window.clone(),
        params,
        config.model.retrain_interval(),
        model_path,
    )
    .spawn(stop_rx.clone());

    // Broker and decision loop
    let broker = Arc::new(PaperBroker::new(window.clone(), config.execution.paper_balance));
    let gate = TradeGate::new(
        broker.clone(),
        broker,
        RiskSizer::new(&config.risk),
        GateSettings::from_config(&config),
    );
    let events = MarketEvents::new(chrono::Duration::seconds(config.signals.event_ttl_secs));
    let mut runner = AgentRunner::new(
        RunnerSettings::from_config(&config),
        config.cycle,
        window,
        StrategySet::standard(&config.signals),
        Arc::new(ModelPredictor::new(registry)),
        gate,
    )
    .with_events(events)
    .with_state_manager(state_manager);

    let signal_tx = stop_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Stop requested, finishing the current tick");
                let _ = signal_tx.send(true);
            }
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
    });

    let halt = runner.run(stop_rx).await;
    let _ = stop_tx.send(true);
    let _ = collector_handle.await;
    let _ = retrain_handle.await;

    match halt {
        HaltReason::UpstreamUnavailable(reason) => {
            anyhow::bail!("stopped: upstream unavailable ({})", reason)
        }
        HaltReason::MarketClosing | HaltReason::StopRequested => {
            info!("Option Runner stopped: {}", halt);
            Ok(())
        }
    }
}
