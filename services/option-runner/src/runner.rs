//! Option Runner - decision loop
//!
//! One task owns the cycle state. Each tick it reads a consistent snapshot
//! of the candle window, evaluates the strategy set, consolidates, asks the
//! predictor for agreement and lets the cycle decide whether to fire. A
//! fired decision goes through the trade gate and blocks the loop until the
//! attempt settles or times out.

use std::sync::Arc;
use std::time::Duration;

use candle_feed::{SharedWindow, WindowSnapshot};
use chrono::{Local, NaiveTime, Utc};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{AgentConfig, CycleConfig, MarketHours, TradingMode};
use crate::consolidator::SignalConsolidator;
use crate::cycle::{CycleAssessment, CycleState, CycleStateMachine, Phase};
use crate::gate::TradeGate;
use crate::predictor::DirectionPredictor;
use crate::signal::ConsolidatedDecision;
use crate::state::{NowState, SessionStats, StateManager};
use crate::strategies::{MarketEvents, MarketWindow, StrategySet};

/// Minimum gap between calibration progress lines
const CALIBRATION_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum HaltReason {
    /// Candle feed stale or instrument closed
    UpstreamUnavailable(String),
    /// Inside the safety margin before market close
    MarketClosing,
    StopRequested,
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::UpstreamUnavailable(reason) => write!(f, "upstream unavailable: {}", reason),
            HaltReason::MarketClosing => write!(f, "market closing"),
            HaltReason::StopRequested => write!(f, "stop requested"),
        }
    }
}

/// Source of local wall-clock time for the market-hours guard
pub trait LocalClock: Send + Sync {
    fn local_time(&self) -> NaiveTime;
}

pub struct SystemClock;

impl LocalClock for SystemClock {
    fn local_time(&self) -> NaiveTime {
        Local::now().time()
    }
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub symbol: String,
    pub mode: TradingMode,
    pub tick: Duration,
    /// Ticks are skipped until the window holds this many candles
    pub min_candles: usize,
    pub max_staleness: Duration,
    pub market_hours: MarketHours,
    pub close_margin: chrono::Duration,
}

impl RunnerSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            symbol: config.asset.symbol.clone(),
            mode: config.execution.trading_mode,
            tick: config.cycle.tick(),
            min_candles: config.model.sequence_length,
            max_staleness: config.data.max_staleness(),
            market_hours: config.asset.market_hours(),
            close_margin: config.asset.close_safety_margin(),
        }
    }
}

pub struct AgentRunner {
    settings: RunnerSettings,
    window: SharedWindow,
    events: Option<MarketEvents>,
    strategies: StrategySet,
    consolidator: SignalConsolidator,
    predictor: Arc<dyn DirectionPredictor>,
    cycle: CycleStateMachine,
    gate: TradeGate,
    clock: Arc<dyn LocalClock>,
    state_manager: Option<StateManager>,
    status: watch::Sender<Option<NowState>>,
    stats: SessionStats,
    last_decision: Option<ConsolidatedDecision>,
    last_effective: Option<f64>,
    last_progress_log: Option<Instant>,
}

impl AgentRunner {
    pub fn new(
        settings: RunnerSettings,
        cycle: CycleConfig,
        window: SharedWindow,
        strategies: StrategySet,
        predictor: Arc<dyn DirectionPredictor>,
        gate: TradeGate,
    ) -> Self {
        let (status, _) = watch::channel(None);
        Self {
            settings,
            window,
            events: None,
            strategies,
            consolidator: SignalConsolidator::new(),
            predictor,
            cycle: CycleStateMachine::new(cycle, Instant::now()),
            gate,
            clock: Arc::new(SystemClock),
            state_manager: None,
            status,
            stats: SessionStats::default(),
            last_decision: None,
            last_effective: None,
            last_progress_log: None,
        }
    }

    pub fn with_events(mut self, events: MarketEvents) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn LocalClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_state_manager(mut self, manager: StateManager) -> Self {
        self.state_manager = Some(manager);
        self
    }

    /// Latest snapshot, refreshed after every tick
    pub fn subscribe(&self) -> watch::Receiver<Option<NowState>> {
        self.status.subscribe()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn cycle_state(&self) -> CycleState {
        self.cycle.state()
    }

    pub fn gate(&self) -> &TradeGate {
        &self.gate
    }

    /// Run until stopped, the market nears close or the feed goes away.
    ///
    /// The stop signal is checked between ticks only; a trade attempt in
    /// flight always runs to completion.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> HaltReason {
        self.cycle.start(Instant::now());
        info!(
            "Decision loop starting for {} in {:?} mode, {} strategies: {:?}",
            self.settings.symbol,
            self.settings.mode,
            self.strategies.len(),
            self.strategies.ids()
        );

        let halt = match self.preflight().await {
            Some(reason) => reason,
            None => self.tick_loop(&mut stop).await,
        };

        self.publish(&halt.to_string(), None).await;
        info!(
            "Decision loop halted ({}): {} trades, {} wins, {} losses, net {}",
            halt, self.stats.trades, self.stats.wins, self.stats.losses, self.stats.net_profit
        );
        halt
    }

    async fn tick_loop(&mut self, stop: &mut watch::Receiver<bool>) -> HaltReason {
        let mut ticker = interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop.borrow() {
                return HaltReason::StopRequested;
            }
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return HaltReason::StopRequested;
                    }
                }
                _ = ticker.tick() => {
                    if let Some(halt) = self.tick().await {
                        return halt;
                    }
                }
            }
        }
    }

    /// Startup checks; the same guards run again before every tick
    async fn preflight(&self) -> Option<HaltReason> {
        let snapshot = self.window.snapshot().await;
        let halt = self.guard(&snapshot, Instant::now());
        if halt.is_none() {
            info!(
                "Preflight ok: {} candles, market closes at {}",
                snapshot.len(),
                self.settings.market_hours.close
            );
        }
        halt
    }

    fn guard(&self, snapshot: &WindowSnapshot, now: Instant) -> Option<HaltReason> {
        let local = self.clock.local_time();
        if self
            .settings
            .market_hours
            .closes_within(local, self.settings.close_margin)
        {
            warn!(
                "Market closes at {} (now {}), stopping",
                self.settings.market_hours.close,
                local.format("%H:%M:%S")
            );
            return Some(HaltReason::MarketClosing);
        }
        if !snapshot.instrument_open {
            error!("Instrument {} is not available", self.settings.symbol);
            return Some(HaltReason::UpstreamUnavailable(format!(
                "{} closed",
                self.settings.symbol
            )));
        }
        if snapshot.is_stale(now, self.settings.max_staleness) {
            let age = snapshot
                .last_refresh
                .map(|at| format!("{:?}", now.saturating_duration_since(at)))
                .unwrap_or_else(|| "never".to_string());
            error!("Candle feed is stale (last refresh {})", age);
            return Some(HaltReason::UpstreamUnavailable(format!(
                "no candle refresh within {:?}",
                self.settings.max_staleness
            )));
        }
        None
    }

    async fn tick(&mut self) -> Option<HaltReason> {
        let now = Instant::now();
        let snapshot = self.window.snapshot().await;
        if let Some(halt) = self.guard(&snapshot, now) {
            return Some(halt);
        }

        let phase = self.cycle.observe(now);
        if snapshot.len() < self.settings.min_candles {
            debug!(
                "Waiting for data: {} of {} candles",
                snapshot.len(),
                self.settings.min_candles
            );
            self.publish("warming_up", Some(snapshot.len())).await;
            return None;
        }

        let window_len = snapshot.len();
        let events = self.events.as_ref().and_then(|e| e.latest(Utc::now()));
        let window = MarketWindow::new(snapshot.candles).with_event(events);

        let signals = self.strategies.evaluate_all(&window);
        let decision = self.consolidator.consolidate(&signals);
        let predicted = self.predictor.predict(&window.candles);
        let assessment = self.cycle.assess(&decision, predicted, now);

        self.last_decision = Some(decision.clone());
        self.last_effective = Some(assessment.effective_confidence);
        self.log_assessment(phase, &assessment, now);

        if assessment.fire {
            let outcome = self
                .gate
                .attempt(&decision, assessment.effective_confidence)
                .await;
            self.stats.record(&outcome);
            if outcome.should_reset() {
                self.cycle.reset(Instant::now());
                info!("Cycle reset after trade attempt");
            } else {
                warn!("Trade attempt stopped before the executor: {:?}", outcome);
            }
        }

        self.publish("running", Some(window_len)).await;
        None
    }

    fn log_assessment(&mut self, phase: Phase, assessment: &CycleAssessment, now: Instant) {
        match phase {
            Phase::Calibration => {
                let due = self
                    .last_progress_log
                    .map_or(true, |at| now.saturating_duration_since(at) >= CALIBRATION_LOG_INTERVAL);
                if due {
                    self.last_progress_log = Some(now);
                    info!(
                        "Calibrating: {}s elapsed | confidence {:.3}",
                        self.cycle.elapsed(now).as_secs(),
                        assessment.effective_confidence
                    );
                }
            }
            Phase::Active => debug!(
                "Extra {}s | effective confidence {:.3} / {:.2} | predictor {}",
                assessment.extra_elapsed.as_secs(),
                assessment.effective_confidence,
                self.cycle.threshold(),
                if assessment.predictor_agrees { "agrees" } else { "silent" }
            ),
        }
    }

    async fn publish(&self, status: &str, window_len: Option<usize>) {
        let window_len = match window_len {
            Some(len) => len,
            None => self.window.len().await,
        };
        let now = Instant::now();
        let state = NowState {
            timestamp: Utc::now().to_rfc3339(),
            mode: self.settings.mode.as_str().to_string(),
            symbol: self.settings.symbol.clone(),
            status: status.to_string(),
            phase: self.cycle.phase(),
            last_decision: self.last_decision.clone(),
            effective_confidence: self.last_effective,
            threshold: self.cycle.threshold(),
            extra_elapsed_secs: self.cycle.extra_elapsed(now).as_secs(),
            window_len,
            model_version: self.predictor.version(),
            session_stats: self.stats.clone(),
        };

        if let Some(manager) = &self.state_manager {
            if let Err(e) = manager.write_now(&state).await {
                warn!("Failed to write state snapshot: {}", e);
            }
        }
        self.status.send_replace(Some(state));
    }
}
