//! End-to-end decision loop test harness
//!
//! Drives the full loop on tokio's paused clock:
//! window snapshot → strategies → consolidation → predictor → cycle → gate → reset


use std::sync::Arc;
use std::time::Duration;

use candle_feed::{Candle, SharedWindow};
use chrono::{TimeZone, Utc};
use mock_executor::{FixedClock, FixedPredictor, FixedSource, MockAccount, MockTradeExecutor, SettleBehavior};
use option_runner::{
    config::{AssetConfig, CycleConfig, RiskConfig, TradingMode},
    cycle::Phase,
    executor::ExecutorError,
    gate::{GateSettings, TradeGate},
    intent::TradeIntentState,
    risk::RiskSizer,
    runner::{AgentRunner, HaltReason, RunnerSettings},
    signal::Direction,
    state::StateManager,
    strategies::{MarketEvent, MarketEvents, StrategySet},
};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::Instant;

fn candles(n: usize) -> Vec<Candle> {
    (0..n as i64)
        .map(|i| Candle {
            timestamp: Utc.timestamp_opt(1_700_000_000 + i * 60, 0).unwrap(),
            open: Decimal::new(11000, 4),
            high: Decimal::new(11010, 4),
            low: Decimal::new(10990, 4),
            close: Decimal::new(11000, 4),
            volume: Decimal::from(100),
        })
        .collect()
}

struct Scenario {
    calibration_secs: u64,
    direction: Direction,
    confidence: f64,
    predicted: Option<Direction>,
    behavior: SettleBehavior,
    balance: i64,
    max_staleness: Duration,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            calibration_secs: 10,
            direction: Direction::Call,
            confidence: 0.85,
            predicted: Some(Direction::Call),
            behavior: SettleBehavior::Immediately(40),
            balance: 1000,
            max_staleness: Duration::from_secs(3600),
        }
    }
}

struct Harness {
    runner: AgentRunner,
    executor: Arc<MockTradeExecutor>,
    account: Arc<MockAccount>,
    window: SharedWindow,
}

fn settings(max_staleness: Duration) -> RunnerSettings {
    let asset = AssetConfig::default();
    RunnerSettings {
        symbol: asset.symbol.clone(),
        mode: TradingMode::Paper,
        tick: Duration::from_secs(1),
        min_candles: 10,
        max_staleness,
        market_hours: asset.market_hours(),
        close_margin: asset.close_safety_margin(),
    }
}

fn gate_settings() -> GateSettings {
    GateSettings {
        symbol: "EURUSD-OTC-op".to_string(),
        trade_duration: Duration::from_secs(60),
        settlement_timeout: Duration::from_secs(65),
        poll_interval: Duration::from_millis(500),
        request_timeout: Duration::from_secs(10),
    }
}

async fn harness(scenario: Scenario) -> Harness {
    let window = SharedWindow::new(100);
    window.merge(candles(20), Instant::now()).await;

    let executor = Arc::new(MockTradeExecutor::new(scenario.behavior));
    let account = Arc::new(MockAccount::new(scenario.balance));
    let gate = TradeGate::new(
        executor.clone(),
        account.clone(),
        RiskSizer::new(&RiskConfig::default()),
        gate_settings(),
    );

    let mut strategies = StrategySet::new();
    strategies.register(Box::new(FixedSource {
        direction: scenario.direction,
        confidence: scenario.confidence,
    }));

    let cycle = CycleConfig {
        calibration_secs: scenario.calibration_secs,
        trade_threshold: 1.0,
        time_bonus_per_sec: 0.001,
        predictor_bonus: 0.1,
        tick_millis: 1000,
    };

    let runner = AgentRunner::new(
        settings(scenario.max_staleness),
        cycle,
        window.clone(),
        strategies,
        Arc::new(FixedPredictor(scenario.predicted)),
        gate,
    )
    .with_clock(Arc::new(FixedClock::at(10, 0)));

    Harness {
        runner,
        executor,
        account,
        window,
    }
}

/// Run the loop, requesting a stop after `duration`
async fn run_for(runner: &mut AgentRunner, duration: Duration) -> HaltReason {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        let _ = tx.send(true);
    });
    runner.run(rx).await
}

#[tokio::test(start_paused = true)]
async fn test_calibration_never_trades() {
    let mut h = harness(Scenario {
        calibration_secs: 300,
        confidence: 1.0,
        ..Scenario::default()
    })
    .await;

    let halt = run_for(&mut h.runner, Duration::from_secs(120)).await;

    assert_eq!(halt, HaltReason::StopRequested);
    assert!(h.executor.placed().is_empty());
    assert_eq!(h.account.queries(), 0);
    assert_eq!(h.runner.cycle_state().phase, Phase::Calibration);
    assert_eq!(h.runner.stats().trades, 0);
}

#[tokio::test(start_paused = true)]
async fn test_time_bonus_fires_trade_and_resets_cycle() {
    // 0.85 + 0.1 predictor bonus needs 50s past calibration to reach 1.0
    let mut h = harness(Scenario::default()).await;
    let started = Instant::now();

    let halt = run_for(&mut h.runner, Duration::from_secs(100)).await;

    assert_eq!(halt, HaltReason::StopRequested);
    let placed = h.executor.placed();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].direction, Direction::Call);
    assert_eq!(placed[0].stake, Decimal::from(50));
    assert_eq!(placed[0].symbol, "EURUSD-OTC-op");

    let state = h.runner.cycle_state();
    assert_eq!(state.phase, Phase::Active);
    let reset_at = state.last_reset.expect("cycle should reset after the trade");
    let offset = reset_at.duration_since(started);
    assert!(offset >= Duration::from_secs(60) && offset < Duration::from_secs(62));

    let stats = h.runner.stats();
    assert_eq!((stats.trades, stats.wins), (1, 1));
    assert_eq!(stats.net_profit, Decimal::from(40));
}

#[tokio::test(start_paused = true)]
async fn test_predictor_agreement_fires_right_after_calibration() {
    let mut h = harness(Scenario {
        confidence: 0.95,
        behavior: SettleBehavior::Never,
        ..Scenario::default()
    })
    .await;

    let started = Instant::now();

    // Stop arrives while the attempt fired at 10s is waiting for settlement
    let halt = run_for(&mut h.runner, Duration::from_secs(12)).await;

    assert_eq!(halt, HaltReason::StopRequested);
    assert!(started.elapsed() >= Duration::from_secs(10 + 65));
    assert!(started.elapsed() < Duration::from_secs(10 + 67));

    // The attempt ran to its timeout and no tick started after the stop
    assert_eq!(h.executor.placed().len(), 1);
    assert_eq!(h.account.queries(), 1);
    assert_eq!(h.runner.stats().skipped, 1);
    let journal = h.runner.gate().journal();
    assert_eq!(journal.len(), 1);
    assert!(journal
        .intents()
        .all(|i| matches!(i.state, TradeIntentState::TimedOut { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_placement_does_not_stall_loop() {
    let mut h = harness(Scenario {
        confidence: 0.95,
        behavior: SettleBehavior::HangOnPlace,
        ..Scenario::default()
    })
    .await;
    let started = Instant::now();

    let halt = run_for(&mut h.runner, Duration::from_secs(15)).await;

    // Fired at 10s, placement gave up 10s later and the stop was then seen
    assert_eq!(halt, HaltReason::StopRequested);
    assert!(started.elapsed() >= Duration::from_secs(20));
    assert!(started.elapsed() < Duration::from_secs(22));
    assert_eq!(h.runner.stats().skipped, 1);

    let reset_at = h.runner.cycle_state().last_reset.expect("placement timeout must reset the cycle");
    let offset = reset_at.duration_since(started);
    assert!(offset >= Duration::from_secs(20) && offset < Duration::from_secs(22));

    let journal = h.runner.gate().journal();
    assert_eq!(journal.len(), 1);
    assert!(journal.intents().all(|i| matches!(
        &i.state,
        TradeIntentState::Failed { stage, .. } if stage == "place"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_calibration_starts_when_run_starts() {
    let mut h = harness(Scenario {
        confidence: 0.95,
        ..Scenario::default()
    })
    .await;

    // Setup time before the loop does not count towards calibration
    tokio::time::sleep(Duration::from_secs(30)).await;
    let started = Instant::now();
    run_for(&mut h.runner, Duration::from_secs(5)).await;

    assert!(h.executor.placed().is_empty());
    let state = h.runner.cycle_state();
    assert_eq!(state.phase, Phase::Calibration);
    assert_eq!(state.cycle_start, started);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_predictor_adds_no_bonus() {
    let mut h = harness(Scenario {
        confidence: 0.95,
        predicted: None,
        ..Scenario::default()
    })
    .await;

    run_for(&mut h.runner, Duration::from_secs(40)).await;

    assert!(h.executor.placed().is_empty());
    assert_eq!(h.runner.cycle_state().phase, Phase::Active);
}

#[tokio::test(start_paused = true)]
async fn test_settlement_timeout_skips_and_resets() {
    let mut h = harness(Scenario {
        behavior: SettleBehavior::Never,
        ..Scenario::default()
    })
    .await;
    let started = Instant::now();

    let halt = run_for(&mut h.runner, Duration::from_secs(150)).await;

    assert_eq!(halt, HaltReason::StopRequested);
    assert_eq!(h.executor.placed().len(), 1);
    assert!(h.executor.polls() > 100);

    let stats = h.runner.stats();
    assert_eq!((stats.trades, stats.skipped), (0, 1));

    // Fired at 60s, gave up 65s later
    let reset_at = h.runner.cycle_state().last_reset.expect("timeout must reset the cycle");
    let offset = reset_at.duration_since(started);
    assert!(offset >= Duration::from_secs(125) && offset < Duration::from_secs(128));

    let journal = h.runner.gate().journal();
    assert_eq!(journal.len(), 1);
    assert!(journal.pending().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_order_resets_cycle() {
    let mut h = harness(Scenario {
        confidence: 0.95,
        behavior: SettleBehavior::Reject,
        ..Scenario::default()
    })
    .await;

    run_for(&mut h.runner, Duration::from_millis(10_500)).await;

    assert!(h.executor.placed().is_empty());
    assert!(h.runner.cycle_state().last_reset.is_some());
    assert_eq!(h.runner.stats().skipped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_risk_skips_without_reset() {
    let mut h = harness(Scenario {
        confidence: 0.95,
        balance: 0,
        ..Scenario::default()
    })
    .await;

    let halt = run_for(&mut h.runner, Duration::from_secs(20)).await;

    assert_eq!(halt, HaltReason::StopRequested);
    assert!(h.executor.placed().is_empty());
    assert!(h.runner.cycle_state().last_reset.is_none());

    // Retried on every tick after calibration, balance fetched fresh each time
    let skipped = h.runner.stats().skipped as usize;
    assert!(skipped >= 9);
    assert_eq!(h.account.queries(), skipped);
}

#[tokio::test(start_paused = true)]
async fn test_neutral_consolidation_never_trades() {
    let mut h = harness(Scenario {
        direction: Direction::Neutral,
        confidence: 1.0,
        predicted: Some(Direction::Neutral),
        ..Scenario::default()
    })
    .await;

    run_for(&mut h.runner, Duration::from_secs(200)).await;

    assert!(h.executor.placed().is_empty());
    assert_eq!(h.account.queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_never_refreshed_window_halts_at_startup() {
    let mut h = harness(Scenario::default()).await;
    let empty = SharedWindow::new(10);
    let gate = TradeGate::new(
        h.executor.clone(),
        h.account.clone(),
        RiskSizer::new(&RiskConfig::default()),
        gate_settings(),
    );
    h.runner = AgentRunner::new(
        settings(Duration::from_secs(120)),
        CycleConfig::default(),
        empty,
        StrategySet::new(),
        Arc::new(FixedPredictor(None)),
        gate,
    )
    .with_clock(Arc::new(FixedClock::at(10, 0)));

    let halt = run_for(&mut h.runner, Duration::from_secs(5)).await;
    assert!(matches!(halt, HaltReason::UpstreamUnavailable(_)));
}

#[tokio::test(start_paused = true)]
async fn test_stale_feed_halts_loop() {
    let mut h = harness(Scenario {
        calibration_secs: 300,
        max_staleness: Duration::from_secs(30),
        ..Scenario::default()
    })
    .await;
    let started = Instant::now();

    let halt = run_for(&mut h.runner, Duration::from_secs(600)).await;

    assert!(matches!(halt, HaltReason::UpstreamUnavailable(_)));
    let elapsed = started.elapsed();
    assert!(elapsed > Duration::from_secs(30) && elapsed < Duration::from_secs(33));
}

#[tokio::test(start_paused = true)]
async fn test_closed_instrument_halts_loop() {
    let mut h = harness(Scenario::default()).await;
    h.window.set_instrument_open(false).await;

    let halt = run_for(&mut h.runner, Duration::from_secs(60)).await;
    assert!(matches!(halt, HaltReason::UpstreamUnavailable(_)));
}

#[tokio::test(start_paused = true)]
async fn test_market_close_margin_halts_loop() {
    let h = harness(Scenario::default()).await;
    let mut runner = h.runner.with_clock(Arc::new(FixedClock::at(16, 55)));

    let halt = run_for(&mut runner, Duration::from_secs(60)).await;
    assert_eq!(halt, HaltReason::MarketClosing);

    let h = harness(Scenario::default()).await;
    let mut runner = h.runner.with_clock(Arc::new(FixedClock::at(16, 45)));
    let halt = run_for(&mut runner, Duration::from_secs(5)).await;
    assert_eq!(halt, HaltReason::StopRequested);
}

#[tokio::test(start_paused = true)]
async fn test_short_window_waits_for_data() {
    let mut h = harness(Scenario {
        confidence: 0.95,
        ..Scenario::default()
    })
    .await;
    let short = SharedWindow::new(100);
    short.merge(candles(5), Instant::now()).await;
    let gate = TradeGate::new(
        h.executor.clone(),
        h.account.clone(),
        RiskSizer::new(&RiskConfig::default()),
        gate_settings(),
    );
    let mut strategies = StrategySet::new();
    strategies.register(Box::new(FixedSource {
        direction: Direction::Call,
        confidence: 0.95,
    }));
    h.runner = AgentRunner::new(
        settings(Duration::from_secs(3600)),
        CycleConfig {
            calibration_secs: 10,
            ..CycleConfig::default()
        },
        short,
        strategies,
        Arc::new(FixedPredictor(Some(Direction::Call))),
        gate,
    )
    .with_clock(Arc::new(FixedClock::at(10, 0)));
    let status = h.runner.subscribe();

    run_for(&mut h.runner, Duration::from_secs(30)).await;

    assert!(h.executor.placed().is_empty());
    let state = status.borrow().clone().expect("status published");
    assert!(state.last_decision.is_none());
    assert_eq!(state.window_len, 5);
    // Calibration still elapses while waiting
    assert_eq!(state.phase, Phase::Active);
}

#[tokio::test(start_paused = true)]
async fn test_market_event_reaches_strategies() {
    let mut h = harness(Scenario::default()).await;
    let events = MarketEvents::new(chrono::Duration::minutes(15));
    events.publish(MarketEvent {
        direction: Direction::Put,
        impact: 0.9,
        headline: "Rate decision".to_string(),
        at: Utc::now(),
    });

    let mut strategies = StrategySet::new();
    strategies.register(Box::new(option_runner::strategies::EventImpactSource::new(0.7)));
    let gate = TradeGate::new(
        h.executor.clone(),
        h.account.clone(),
        RiskSizer::new(&RiskConfig::default()),
        gate_settings(),
    );
    h.runner = AgentRunner::new(
        settings(Duration::from_secs(3600)),
        CycleConfig {
            calibration_secs: 10,
            ..CycleConfig::default()
        },
        h.window.clone(),
        strategies,
        Arc::new(FixedPredictor(Some(Direction::Put))),
        gate,
    )
    .with_events(events)
    .with_clock(Arc::new(FixedClock::at(10, 0)));

    run_for(&mut h.runner, Duration::from_millis(10_500)).await;

    // 0.9 impact + 0.1 agreement clears the threshold at the end of calibration
    let placed = h.executor.placed();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].direction, Direction::Put);
}

#[tokio::test(start_paused = true)]
async fn test_state_snapshot_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let manager = StateManager::new(dir.path().to_str().unwrap());
    manager.init().await.unwrap();

    let h = harness(Scenario {
        calibration_secs: 300,
        ..Scenario::default()
    })
    .await;
    let mut runner = h
        .runner
        .with_state_manager(StateManager::new(dir.path().to_str().unwrap()));

    run_for(&mut runner, Duration::from_secs(5)).await;

    let state = manager.read_now().await.unwrap();
    assert_eq!(state.status, "stop requested");
    assert_eq!(state.phase, Phase::Calibration);
    assert_eq!(state.mode, "paper");
    assert_eq!(state.window_len, 20);
    let decision = state.last_decision.expect("decision recorded");
    assert_eq!(decision.direction, Direction::Call);
    assert_eq!(decision.dominant_strategy.as_deref(), Some("fixed"));
    assert!((state.effective_confidence.unwrap() - 0.95).abs() < 1e-9);
}

#[test]
fn test_timeout_error_is_reported_in_journal() {
    let state = TradeIntentState::TimedOut {
        trade_id: option_runner::executor::TradeId("mock-1".to_string()),
    };
    assert!(state.is_finalized());
    assert_eq!(
        ExecutorError::Timeout(Duration::from_secs(65)).to_string(),
        "No broker response within 65s"
    );
}
