//! Trained model state, its publication slot, and the training routine.
//!
//! A `ModelState` is immutable once built and belongs to the instrument whose
//! window trained it. Retraining builds a complete new state off to the side
//! and then swaps that instrument's `Arc` inside `ModelSlot` under a short
//! write lock. Readers clone the `Arc` and keep scoring against the
//! state they loaded, so nobody ever sees a half-trained model, and a failed
//! retrain leaves the previous state in place.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{ConfigFingerprint, Instrument, Window};
use crate::features::FeatureCache;
use crate::rng::RngHierarchy;

use super::boost::GradientBoosting;
use super::features::{engineer_features, forward_labels, FEATURE_NAMES};
use super::forest::RandomForest;
use super::scaler::StandardScaler;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingError {
    #[error("window has {available} bars, training needs at least {required}")]
    InsufficientHistory { available: usize, required: usize },
    #[error("{available} clean training samples, need at least {required}")]
    InsufficientSamples { available: usize, required: usize },
    #[error("all {samples} training labels are the same class")]
    DegenerateLabels { samples: usize },
    #[error("background retrain worker is not running")]
    WorkerUnavailable,
}

/// Hyperparameters for one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingParams {
    pub horizon: usize,
    pub train_fraction: f64,
    pub min_samples: usize,
    pub min_window: usize,
    pub n_trees: usize,
    pub forest_depth: usize,
    pub n_stages: usize,
    pub boost_depth: usize,
    pub learning_rate: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            horizon: 5,
            train_fraction: 0.7,
            min_samples: 50,
            min_window: 100,
            n_trees: 100,
            forest_depth: 10,
            n_stages: 100,
            boost_depth: 5,
            learning_rate: 0.1,
        }
    }
}

/// The two model probabilities and their average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsemblePrediction {
    pub forest: f64,
    pub boosting: f64,
    pub probability_up: f64,
}

/// Everything needed to score a feature row, plus training metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    instrument: Instrument,
    feature_names: Vec<String>,
    scaler: StandardScaler,
    forest: RandomForest,
    boosting: GradientBoosting,
    feature_importance: BTreeMap<String, f64>,
    training_sample_count: usize,
    trained_at: DateTime<Utc>,
    /// Timestamp of the newest bar in the training window.
    trained_through: DateTime<Utc>,
    horizon: usize,
    config_fingerprint: ConfigFingerprint,
}

impl ModelState {
    /// Score one unscaled feature row (columns in `feature_names` order).
    pub fn predict(&self, raw: &[f64]) -> EnsemblePrediction {
        let scaled = self.scaler.transform(raw);
        let forest = self.forest.predict_proba(&scaled);
        let boosting = self.boosting.predict_proba(&scaled);
        EnsemblePrediction {
            forest,
            boosting,
            probability_up: (forest + boosting) / 2.0,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn feature_importance(&self) -> &BTreeMap<String, f64> {
        &self.feature_importance
    }

    /// The `n` most important features, highest first (ties by name).
    pub fn top_features(&self, n: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_importance
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    pub fn training_sample_count(&self) -> usize {
        self.training_sample_count
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn trained_through(&self) -> DateTime<Utc> {
        self.trained_through
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn config_fingerprint(&self) -> &ConfigFingerprint {
        &self.config_fingerprint
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    pub fn boosting(&self) -> &GradientBoosting {
        &self.boosting
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Train a fresh ensemble on the most recent samples of `window`.
pub fn train_model(
    window: &Window,
    cache: &mut FeatureCache,
    params: &TrainingParams,
    rng: &RngHierarchy,
    fingerprint: &ConfigFingerprint,
) -> Result<ModelState, TrainingError> {
    if window.len() < params.min_window {
        return Err(TrainingError::InsufficientHistory {
            available: window.len(),
            required: params.min_window,
        });
    }
    let Some(last_bar) = window.last() else {
        return Err(TrainingError::InsufficientHistory {
            available: 0,
            required: params.min_window,
        });
    };

    let matrix = engineer_features(window, cache);
    let labels = forward_labels(&window.closes(), params.horizon);
    let usable: Vec<(usize, f64)> = labels
        .iter()
        .enumerate()
        .filter_map(|(i, l)| l.filter(|_| matrix.is_complete(i)).map(|l| (i, l)))
        .collect();

    if usable.len() < params.min_samples {
        return Err(TrainingError::InsufficientSamples {
            available: usable.len(),
            required: params.min_samples,
        });
    }
    let take = (params.train_fraction * usable.len() as f64).floor() as usize;
    let recent = &usable[usable.len() - take..];
    let x: Vec<Vec<f64>> = recent.iter().map(|(i, _)| matrix.rows()[*i].clone()).collect();
    let y: Vec<f64> = recent.iter().map(|(_, l)| *l).collect();

    let positives = y.iter().filter(|v| **v > 0.5).count();
    if positives == 0 || positives == y.len() {
        return Err(TrainingError::DegenerateLabels { samples: y.len() });
    }

    let scaler = StandardScaler::fit(&x);
    let scaled = scaler.transform_all(&x);

    let ((forest, forest_imp), (boosting, boost_imp)) = rayon::join(
        || RandomForest::fit(&scaled, &y, params.n_trees, params.forest_depth, rng),
        || {
            GradientBoosting::fit(
                &scaled,
                &y,
                params.n_stages,
                params.boost_depth,
                params.learning_rate,
                rng,
            )
        },
    );

    let feature_importance = FEATURE_NAMES
        .iter()
        .zip(forest_imp.iter().zip(&boost_imp))
        .map(|(name, (f, b))| (name.to_string(), (f + b) / 2.0))
        .collect();

    debug!(
        instrument = window.instrument(),
        samples = y.len(),
        positives,
        "trained ml ensemble"
    );

    Ok(ModelState {
        instrument: window.instrument().to_string(),
        feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        scaler,
        forest,
        boosting,
        feature_importance,
        training_sample_count: y.len(),
        trained_at: Utc::now(),
        trained_through: last_bar.timestamp,
        horizon: params.horizon,
        config_fingerprint: fingerprint.clone(),
    })
}

/// Where a strategy's model for one instrument stands relative to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelLifecycle {
    Untrained,
    Trained,
    /// At least `retrain_interval` bars arrived after the last training attempt.
    Stale { new_bars: usize },
}

#[derive(Debug, Default)]
struct SlotEntry {
    model: Option<Arc<ModelState>>,
    /// Newest bar of the last training attempt, successful or not.
    attempted_through: Option<DateTime<Utc>>,
    retrain_pending: bool,
}

/// Shared, atomically swapped model references, one per instrument.
#[derive(Debug, Default)]
pub struct ModelSlot {
    entries: RwLock<BTreeMap<Instrument, SlotEntry>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Instrument, SlotEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<Instrument, SlotEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn load(&self, instrument: &str) -> Option<Arc<ModelState>> {
        self.read().get(instrument).and_then(|e| e.model.clone())
    }

    /// Instruments with a published model.
    pub fn instruments(&self) -> Vec<Instrument> {
        self.read()
            .iter()
            .filter(|(_, e)| e.model.is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Replace the state served for the model's instrument. Readers holding
    /// the old `Arc` keep it.
    pub fn publish(&self, state: ModelState) -> Arc<ModelState> {
        let state = Arc::new(state);
        let mut entries = self.write();
        let entry = entries.entry(state.instrument.clone()).or_default();
        entry.attempted_through = entry.attempted_through.max(Some(state.trained_through));
        entry.model = Some(Arc::clone(&state));
        state
    }

    /// Note a training attempt on a window ending at `through`.
    pub(crate) fn record_attempt(&self, instrument: &str, through: DateTime<Utc>) {
        let mut entries = self.write();
        let entry = entries.entry(instrument.to_string()).or_default();
        entry.attempted_through = entry.attempted_through.max(Some(through));
    }

    pub fn lifecycle(&self, window: &Window, retrain_interval: usize) -> ModelLifecycle {
        let entries = self.read();
        let Some((model, attempted)) = entries
            .get(window.instrument())
            .and_then(|e| e.model.as_ref().map(|m| (m, e.attempted_through)))
        else {
            return ModelLifecycle::Untrained;
        };
        let through = attempted.map_or(model.trained_through, |a| a.max(model.trained_through));
        let new_bars = window
            .bars()
            .iter()
            .rev()
            .take_while(|b| b.timestamp > through)
            .count();
        if new_bars >= retrain_interval {
            ModelLifecycle::Stale { new_bars }
        } else {
            ModelLifecycle::Trained
        }
    }

    /// Mark a background retrain as queued. Returns false if one already is.
    pub(crate) fn begin_retrain(&self, instrument: &str) -> bool {
        let mut entries = self.write();
        let entry = entries.entry(instrument.to_string()).or_default();
        !std::mem::replace(&mut entry.retrain_pending, true)
    }

    pub(crate) fn finish_retrain(&self, instrument: &str) {
        if let Some(entry) = self.write().get_mut(instrument) {
            entry.retrain_pending = false;
        }
    }

    pub fn retrain_pending(&self, instrument: &str) -> bool {
        self.read()
            .get(instrument)
            .is_some_and(|e| e.retrain_pending)
    }
}
