//! Periodic model retraining
//!
//! Runs as its own task. Each round trains on a snapshot of the candle
//! window off the async runtime, saves the model and publishes it to the
//! registry. The decision loop picks the new version up on its next tick.

use std::path::PathBuf;
use std::time::Duration;

use candle_feed::SharedWindow;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::{DirectionModel, ModelError, ModelRegistry, TrainingParams};

pub struct RetrainScheduler {
    registry: ModelRegistry,
    window: SharedWindow,
    params: TrainingParams,
    interval: Duration,
    path: PathBuf,
}

impl RetrainScheduler {
    pub fn new(
        registry: ModelRegistry,
        window: SharedWindow,
        params: TrainingParams,
        interval: Duration,
        path: PathBuf,
    ) -> Self {
        Self {
            registry,
            window,
            params,
            interval,
            path,
        }
    }

    /// Train on the current window and publish, returning the new version
    pub async fn retrain_once(&self) -> Result<u64, ModelError> {
        let snapshot = self.window.snapshot().await;
        let params = self.params;
        let path = self.path.clone();

        let model = tokio::task::spawn_blocking(move || -> Result<DirectionModel, ModelError> {
            let model = DirectionModel::train(&snapshot.candles, &params)?;
            model.save(&path)?;
            Ok(model)
        })
        .await
        .map_err(|e| ModelError::TaskFailed(e.to_string()))??;

        Ok(self.registry.publish(model))
    }

    /// Spawn the retrain loop; the first round runs one interval from now
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Model retrain scheduled every {:?}", self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.retrain_once().await {
                            Ok(version) => info!("Retrained direction model, now v{}", version),
                            Err(e) => warn!("Model retrain failed, keeping v{}: {}", self.registry.version(), e),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Model retrain scheduler stopped");
        })
    }
}
