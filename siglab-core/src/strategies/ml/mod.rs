//! ML ensemble strategy: a random forest and a gradient-boosted model vote
//! on whether the close `horizon` bars ahead will be higher.
//!
//! Each instrument gets its own model, trained from that instrument's window
//! on first use and again once `retrain_interval` new bars have arrived
//! since the last attempt. Training runs
//! inline by default. After `spawn_retrain_worker` it runs on a dedicated
//! thread and scoring keeps using the previously published model meanwhile.

pub mod boost;
pub mod features;
pub mod forest;
pub mod model;
pub mod scaler;
pub mod tree;
pub mod worker;

pub use features::{engineer_features, forward_labels, FeatureMatrix, FEATURE_NAMES};
pub use model::{
    train_model, EnsemblePrediction, ModelLifecycle, ModelSlot, ModelState, TrainingError,
    TrainingParams,
};
pub use worker::{RetrainCommand, RetrainOutcome, RetrainWorker, TrainingSummary};

use std::sync::mpsc::Sender;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{ConfigError, StrategyConfig};
use crate::domain::{ConfigFingerprint, Signal, SignalAction, StrategyId, Window};
use crate::features::FeatureCache;
use crate::indicators::{Atr, FeatureError};
use crate::rng::RngHierarchy;

use super::{EvalContext, StrategyError};

#[derive(Debug, Clone, PartialEq)]
pub struct MlConfig {
    pub training: TrainingParams,
    /// Buy when P(up) exceeds this, sell when it is at most `1 - threshold`.
    pub threshold: f64,
    pub retrain_interval: usize,
    pub atr_period: usize,
    pub stop_atr_multiplier: f64,
    pub profit_atr_multiplier: f64,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            training: TrainingParams::default(),
            threshold: 0.6,
            retrain_interval: 500,
            atr_period: 14,
            stop_atr_multiplier: 1.5,
            profit_atr_multiplier: 2.0,
        }
    }
}

impl MlConfig {
    pub fn from_config(config: &StrategyConfig) -> Result<Self, ConfigError> {
        let d = Self::default();
        let t = &d.training;
        let threshold = config.param_fraction("threshold", d.threshold)?;
        if threshold <= 0.5 {
            return Err(config.invalid("threshold", threshold, "expected a value in (0.5, 1]"));
        }
        let train_fraction = config.param_fraction("train_fraction", t.train_fraction)?;
        if train_fraction == 0.0 {
            return Err(config.invalid("train_fraction", 0.0, "expected a value in (0, 1]"));
        }
        Ok(Self {
            training: TrainingParams {
                horizon: config.param_usize("horizon", t.horizon)?,
                train_fraction,
                min_samples: config.param_usize("min_samples", t.min_samples)?,
                min_window: config.param_usize("min_window", t.min_window)?,
                n_trees: config.param_usize("n_trees", t.n_trees)?,
                forest_depth: config.param_usize("forest_depth", t.forest_depth)?,
                n_stages: config.param_usize("n_stages", t.n_stages)?,
                boost_depth: config.param_usize("boost_depth", t.boost_depth)?,
                learning_rate: config.param_positive("learning_rate", t.learning_rate)?,
            },
            threshold,
            retrain_interval: config.param_usize("retrain_interval", d.retrain_interval)?,
            atr_period: config.param_usize("atr_period", d.atr_period)?,
            stop_atr_multiplier: config.param_positive("stop_atr_multiplier", d.stop_atr_multiplier)?,
            profit_atr_multiplier: config
                .param_positive("profit_atr_multiplier", d.profit_atr_multiplier)?,
        })
    }
}

/// Training context shared between the strategy and its retrain worker.
#[derive(Debug)]
pub(crate) struct Trainer {
    id: StrategyId,
    params: TrainingParams,
    rng: RngHierarchy,
    fingerprint: ConfigFingerprint,
    slot: Arc<ModelSlot>,
}

impl Trainer {
    pub(crate) fn slot(&self) -> &ModelSlot {
        &self.slot
    }

    /// Train and publish. On failure the previously published state stays
    /// and the attempt still counts toward the retrain interval.
    pub(crate) fn retrain(
        &self,
        window: &Window,
        cache: &mut FeatureCache,
    ) -> Result<Arc<ModelState>, TrainingError> {
        match train_model(window, cache, &self.params, &self.rng, &self.fingerprint) {
            Ok(state) => {
                let state = self.slot.publish(state);
                info!(
                    strategy = %self.id,
                    instrument = window.instrument(),
                    samples = state.training_sample_count(),
                    "published retrained model"
                );
                Ok(state)
            }
            Err(e) => {
                if let Some(bar) = window.last() {
                    self.slot.record_attempt(window.instrument(), bar.timestamp);
                }
                warn!(
                    strategy = %self.id,
                    instrument = window.instrument(),
                    error = %e,
                    kept_previous = self.slot.load(window.instrument()).is_some(),
                    "model retrain failed"
                );
                Err(e)
            }
        }
    }
}

#[derive(Debug)]
pub struct MlEnsembleStrategy {
    id: StrategyId,
    config: MlConfig,
    trainer: Arc<Trainer>,
    background: Option<Sender<RetrainCommand>>,
}

impl MlEnsembleStrategy {
    pub fn new(id: StrategyId, config: MlConfig, seed: u64, fingerprint: ConfigFingerprint) -> Self {
        let trainer = Trainer {
            id,
            params: config.training.clone(),
            rng: RngHierarchy::new(seed),
            fingerprint,
            slot: Arc::new(ModelSlot::new()),
        };
        Self {
            id,
            config,
            trainer: Arc::new(trainer),
            background: None,
        }
    }

    pub fn from_config(config: &StrategyConfig, seed: u64) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.id,
            MlConfig::from_config(config)?,
            seed,
            config.fingerprint(),
        ))
    }

    pub fn id(&self) -> StrategyId {
        self.id
    }

    pub fn config(&self) -> &MlConfig {
        &self.config
    }

    pub fn model(&self, instrument: &str) -> Option<Arc<ModelState>> {
        self.trainer.slot.load(instrument)
    }

    /// Instruments this strategy has a model for.
    pub fn trained_instruments(&self) -> Vec<String> {
        self.trainer.slot.instruments()
    }

    /// Replace the model served for its instrument, e.g. with one restored
    /// from JSON.
    pub fn install_model(&self, state: ModelState) -> Arc<ModelState> {
        self.trainer.slot.publish(state)
    }

    pub fn lifecycle(&self, window: &Window) -> ModelLifecycle {
        self.trainer.slot.lifecycle(window, self.config.retrain_interval)
    }

    /// Train on `window` now and publish the result.
    pub fn retrain(&self, window: &Window) -> Result<Arc<ModelState>, TrainingError> {
        self.trainer.retrain(window, &mut FeatureCache::new())
    }

    /// Move retraining onto a dedicated thread.
    pub fn spawn_retrain_worker(&mut self) -> Result<RetrainWorker, TrainingError> {
        let (worker, tx) = RetrainWorker::spawn(self.id, Arc::clone(&self.trainer))?;
        self.background = Some(tx);
        Ok(worker)
    }

    pub fn generate_signal(
        &self,
        window: &Window,
        ctx: &mut EvalContext,
    ) -> Result<Option<Signal>, StrategyError> {
        let min_window = self.config.training.min_window;
        if window.len() < min_window {
            return Err(FeatureError::InsufficientData {
                indicator: "ml_ensemble".into(),
                required: min_window,
                available: window.len(),
            }
            .into());
        }

        if self.lifecycle(window) != ModelLifecycle::Trained {
            self.refresh(window, ctx)?;
        }
        let Some(model) = self.trainer.slot.load(window.instrument()) else {
            // Background retrain still in flight.
            return Ok(None);
        };

        let matrix = engineer_features(window, &mut ctx.features);
        let last = matrix.len() - 1;
        if !matrix.is_complete(last) {
            return Err(FeatureError::NonFinite {
                indicator: "ml_features".into(),
            }
            .into());
        }
        let prediction = model.predict(&matrix.rows()[last]);
        let p = prediction.probability_up;

        let (action, confidence) = if p > self.config.threshold {
            (SignalAction::Buy, p)
        } else if p <= 1.0 - self.config.threshold {
            (SignalAction::Sell, 1.0 - p)
        } else {
            (SignalAction::Hold, p.max(1.0 - p))
        };

        let bar = window.bars()[last];
        let mut signal = Signal::new(action, confidence, self.id, bar.timestamp)
            .with_meta("probability_up", p)
            .with_meta("forest_probability", prediction.forest)
            .with_meta("boosting_probability", prediction.boosting)
            .with_meta("training_samples", model.training_sample_count() as f64);

        if action.is_directional() {
            let atr = ctx.features.latest(window, &Atr::new(self.config.atr_period))?;
            let stop = atr * self.config.stop_atr_multiplier;
            let target = atr * self.config.profit_atr_multiplier;
            signal = if action == SignalAction::Buy {
                signal.with_levels(bar.close - stop, bar.close + target)
            } else {
                signal.with_levels(bar.close + stop, bar.close - target)
            };
        }
        Ok(Some(signal))
    }

    /// Retrain inline or queue a background retrain.
    ///
    /// Failure is only an error when there is no previous model to fall back on.
    fn refresh(&self, window: &Window, ctx: &mut EvalContext) -> Result<(), StrategyError> {
        let instrument = window.instrument();
        let has_model = self.trainer.slot.load(instrument).is_some();
        let failure = match &self.background {
            Some(tx) => {
                if !self.trainer.slot.begin_retrain(instrument) {
                    return Ok(());
                }
                match tx.send(RetrainCommand::Retrain(Box::new(window.clone()))) {
                    Ok(()) => return Ok(()),
                    Err(_) => {
                        self.trainer.slot.finish_retrain(instrument);
                        TrainingError::WorkerUnavailable
                    }
                }
            }
            None => match self.trainer.retrain(window, &mut ctx.features) {
                Ok(_) => return Ok(()),
                Err(e) => e,
            },
        };
        if has_model {
            ctx.training_errors.push((self.id, failure));
            Ok(())
        } else {
            Err(failure.into())
        }
    }
}
