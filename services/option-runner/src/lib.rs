//! Option Runner Library
//!
//! Confidence-gated binary options agent: strategies, consolidation, the
//! cycle state machine, risk sizing and the trade gate.

pub mod config;
pub mod consolidator;
pub mod cycle;
pub mod executor;
pub mod gate;
pub mod intent;
pub mod paper;
pub mod predictor;
pub mod risk;
pub mod runner;
pub mod signal;
pub mod state;
pub mod strategies;

// Re-export main types for convenience
pub use config::{AgentConfig, CycleConfig, RiskConfig, TradingMode};
pub use consolidator::SignalConsolidator;
pub use cycle::{CycleAssessment, CycleState, CycleStateMachine, Phase};
pub use executor::{
    Account, AccountError, ExecutorError, Settlement, TradeExecutor, TradeId, TradeOutcome,
    TradeRequest,
};
pub use gate::{GateOutcome, GateSettings, SkipReason, TradeGate};
pub use intent::{IntentRegistry, TradeIntent, TradeIntentState};
pub use paper::{PaperBroker, SyntheticSource};
pub use predictor::{DirectionPredictor, ModelPredictor, ModelRegistry, RetrainScheduler};
pub use risk::{RiskDecision, RiskError, RiskSizer};
pub use runner::{AgentRunner, HaltReason, LocalClock, RunnerSettings, SystemClock};
pub use signal::{ConsolidatedDecision, Direction, Signal};
pub use state::{NowState, SessionStats, StateManager};
pub use strategies::{MarketEvent, MarketEvents, MarketWindow, SignalSource, StrategySet};
