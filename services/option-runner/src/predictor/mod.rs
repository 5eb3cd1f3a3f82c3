//! Direction predictor
//!
//! The decision loop only sees [`DirectionPredictor`]. The concrete
//! predictor reads whatever model is currently published in the
//! [`ModelRegistry`]; the retrain scheduler publishes new versions without
//! touching loop state.

use std::path::Path;
use std::sync::{Arc, RwLock};

use candle_feed::Candle;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::signal::Direction;

pub mod model;
pub mod scheduler;

pub use model::{DirectionModel, TrainingParams};
pub use scheduler::RetrainScheduler;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Not enough data to train: need {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Model file is corrupt: {0}")]
    Corrupt(String),

    #[error("Training task failed: {0}")]
    TaskFailed(String),

    #[error("Model I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Independent directional opinion used as a reinforcement check.
///
/// `None` means unavailable (no model yet, or not enough history). Callers
/// treat that as no agreement, never as a fault.
pub trait DirectionPredictor: Send + Sync {
    fn predict(&self, candles: &[Candle]) -> Option<Direction>;

    /// Version of the model behind the predictions, 0 if unversioned
    fn version(&self) -> u64 {
        0
    }
}

/// A model together with the version it was published under
#[derive(Debug)]
pub struct PublishedModel {
    pub version: u64,
    pub published_at: DateTime<Utc>,
    pub model: DirectionModel,
}

/// Versioned, swap-on-publish model reference
#[derive(Clone, Default)]
pub struct ModelRegistry {
    current: Arc<RwLock<Option<Arc<PublishedModel>>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a model, returning its version (0 if it could not be published)
    pub fn publish(&self, model: DirectionModel) -> u64 {
        let Ok(mut slot) = self.current.write() else {
            warn!("Model registry lock poisoned, model not published");
            return 0;
        };
        let version = slot.as_ref().map_or(1, |m| m.version + 1);
        *slot = Some(Arc::new(PublishedModel {
            version,
            published_at: Utc::now(),
            model,
        }));
        info!("Published direction model v{}", version);
        version
    }

    pub fn current(&self) -> Option<Arc<PublishedModel>> {
        self.current.read().ok()?.clone()
    }

    /// Current version, 0 when nothing is published
    pub fn version(&self) -> u64 {
        self.current().map_or(0, |m| m.version)
    }
}

/// Predictor backed by the registry's current model
#[derive(Clone)]
pub struct ModelPredictor {
    registry: ModelRegistry,
}

impl ModelPredictor {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }
}

impl DirectionPredictor for ModelPredictor {
    fn predict(&self, candles: &[Candle]) -> Option<Direction> {
        self.registry.current()?.model.predict(candles)
    }

    fn version(&self) -> u64 {
        self.registry.version()
    }
}

/// Publish a saved model if it is still fresh, otherwise train one
///
/// Failures are logged and leave the registry empty; the loop runs without
/// predictor reinforcement until the scheduler succeeds.
pub fn bootstrap(
    registry: &ModelRegistry,
    path: &Path,
    max_age: chrono::Duration,
    candles: &[Candle],
    params: &TrainingParams,
) {
    match DirectionModel::load_if_fresh(path, max_age, Utc::now()) {
        Ok(Some(model)) => {
            info!("Saved model at {} is recent, reusing it", path.display());
            registry.publish(model);
            return;
        }
        Ok(None) => info!("No recent saved model, training a new one"),
        Err(e) => warn!("Failed to load saved model: {}", e),
    }

    match DirectionModel::train(candles, params) {
        Ok(model) => {
            if let Err(e) = model.save(path) {
                warn!("Failed to save model: {}", e);
            }
            registry.publish(model);
        }
        Err(e) => warn!("Initial model training failed: {}", e),
    }
}
