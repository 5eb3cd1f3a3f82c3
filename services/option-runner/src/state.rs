//! State Management - `state/now.json` snapshot of the decision loop

use std::path::PathBuf;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::cycle::Phase;
use crate::gate::GateOutcome;
use crate::signal::ConsolidatedDecision;

/// Manages state files for observability
pub struct StateManager {
    state_dir: PathBuf,
}

/// Current status (state/now.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowState {
    pub timestamp: String,
    pub mode: String,
    pub symbol: String,
    pub status: String,
    pub phase: Phase,
    pub last_decision: Option<ConsolidatedDecision>,
    pub effective_confidence: Option<f64>,
    pub threshold: f64,
    pub extra_elapsed_secs: u64,
    pub window_len: usize,
    pub model_version: u64,
    pub session_stats: SessionStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub refunds: u32,
    /// Attempts that ended without a settled trade
    pub skipped: u32,
    pub net_profit: Decimal,
}

impl SessionStats {
    pub fn record(&mut self, outcome: &GateOutcome) {
        match outcome {
            GateOutcome::Executed(trade) => {
                self.trades += 1;
                self.net_profit += trade.profit;
                if trade.is_win() {
                    self.wins += 1;
                } else if trade.is_loss() {
                    self.losses += 1;
                } else {
                    self.refunds += 1;
                }
            }
            GateOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.wins + self.losses;
        (decided > 0).then(|| self.wins as f64 / decided as f64)
    }
}

impl StateManager {
    pub fn new(workspace_dir: &str) -> Self {
        Self {
            state_dir: PathBuf::from(workspace_dir).join("state"),
        }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.state_dir).await?;
        Ok(())
    }

    pub fn now_path(&self) -> PathBuf {
        self.state_dir.join("now.json")
    }

    pub async fn write_now(&self, state: &NowState) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        fs::write(self.now_path(), json).await?;
        debug!("Wrote state/now.json");
        Ok(())
    }

    pub async fn read_now(&self) -> anyhow::Result<NowState> {
        let json = fs::read_to_string(self.now_path()).await?;
        Ok(serde_json::from_str(&json)?)
    }
}
