//! Strategy variants and the factory that builds them from configuration.
//!
//! The set of strategies is closed, so they are dispatched through one enum
//! rather than trait objects. Every variant reads its indicators through the
//! cycle's `FeatureCache` in `EvalContext`, never computes NaN into a
//! decision, and returns `Ok(None)` when it has no view on the window.

pub mod fibonacci;
pub mod ml;
pub mod trend;
pub mod zscore;

pub use fibonacci::{extension_levels, retracement_levels, FibConfig, FibonacciStrategy};
pub use ml::{MlConfig, MlEnsembleStrategy, TrainingError};
pub use trend::{TrendConfig, TrendStrategy};
pub use zscore::{ZScoreConfig, ZScoreStrategy, INV_PHI, PHI};

use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, StrategyConfig, StrategyKind};
use crate::domain::{DataQualityError, OpenPosition, Signal, StrategyId, Window};
use crate::features::FeatureCache;
use crate::indicators::FeatureError;

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    DataQuality(#[from] DataQualityError),
    #[error(transparent)]
    Training(#[from] TrainingError),
}

impl StrategyError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, StrategyError::Feature(FeatureError::InsufficientData { .. }))
    }
}

// ─── Evaluation context ──────────────────────────────────────────────

/// Per-instrument, per-cycle state handed to every strategy.
#[derive(Debug, Default)]
pub struct EvalContext {
    pub features: FeatureCache,
    /// Open position in this instrument, if the caller holds one.
    pub position: Option<OpenPosition>,
    /// Retrain failures that were absorbed because an older model kept serving.
    pub training_errors: Vec<(StrategyId, TrainingError)>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(position: OpenPosition) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }
}

// ─── Strategy ────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum Strategy {
    Trend(TrendStrategy),
    ZScore(ZScoreStrategy),
    Fibonacci(FibonacciStrategy),
    MlEnsemble(MlEnsembleStrategy),
}

impl Strategy {
    pub fn id(&self) -> StrategyId {
        match self {
            Strategy::Trend(s) => s.id(),
            Strategy::ZScore(s) => s.id(),
            Strategy::Fibonacci(s) => s.id(),
            Strategy::MlEnsemble(s) => s.id(),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Trend(_) => StrategyKind::TrendRsiEmaAtr,
            Strategy::ZScore(_) => StrategyKind::ZscorePhi,
            Strategy::Fibonacci(_) => StrategyKind::FibonacciConfluence,
            Strategy::MlEnsemble(_) => StrategyKind::MlEnsemble,
        }
    }

    /// Evaluate the newest bar of `window`.
    ///
    /// A window too short for the strategy's indicators is not an error: it
    /// yields `Ok(None)`.
    pub fn generate_signal(
        &self,
        window: &Window,
        ctx: &mut EvalContext,
    ) -> Result<Option<Signal>, StrategyError> {
        let result = match self {
            Strategy::Trend(s) => s.generate_signal(window, ctx),
            Strategy::ZScore(s) => s.generate_signal(window, ctx),
            Strategy::Fibonacci(s) => s.generate_signal(window, ctx),
            Strategy::MlEnsemble(s) => s.generate_signal(window, ctx),
        };
        match result {
            Err(e) if e.is_insufficient_data() => {
                debug!(strategy = %self.id(), instrument = window.instrument(), reason = %e, "no signal");
                Ok(None)
            }
            other => other,
        }
    }

    pub fn as_ml(&self) -> Option<&MlEnsembleStrategy> {
        match self {
            Strategy::MlEnsemble(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ml_mut(&mut self) -> Option<&mut MlEnsembleStrategy> {
        match self {
            Strategy::MlEnsemble(s) => Some(s),
            _ => None,
        }
    }
}

// ─── Factory ─────────────────────────────────────────────────────────

/// Build a strategy from its configuration. `seed` feeds model training.
pub fn build_strategy(config: &StrategyConfig, seed: u64) -> Result<Strategy, ConfigError> {
    Ok(match config.kind {
        StrategyKind::TrendRsiEmaAtr => Strategy::Trend(TrendStrategy::new(
            config.id,
            TrendConfig::from_config(config)?,
        )),
        StrategyKind::ZscorePhi => Strategy::ZScore(ZScoreStrategy::new(
            config.id,
            ZScoreConfig::from_config(config)?,
        )),
        StrategyKind::FibonacciConfluence => Strategy::Fibonacci(FibonacciStrategy::new(
            config.id,
            FibConfig::from_config(config)?,
        )),
        StrategyKind::MlEnsemble => {
            Strategy::MlEnsemble(MlEnsembleStrategy::from_config(config, seed)?)
        }
    })
}
