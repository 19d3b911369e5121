//! Signal engine: runs every configured strategy over every instrument's
//! window and aggregates one decision per instrument.
//!
//! Instruments are evaluated in parallel with rayon. Within one instrument
//! the strategies run in id order against a shared `FeatureCache`, so an
//! indicator two strategies both need is computed once. A failing strategy
//! only loses its own candidate: its error is recorded on the instrument's
//! report and the other strategies still vote.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregator::{aggregate, rank_instruments};
use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Instrument, OpenPosition, Signal, StrategyId, Window};
use crate::strategies::ml::{RetrainWorker, TrainingError};
use crate::strategies::{build_strategy, EvalContext, Strategy, StrategyError};

/// Outcome of one cycle for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentReport {
    pub instrument: Instrument,
    /// Aggregated decision, if any strategy produced a signal.
    pub decision: Option<Signal>,
    pub candidates: Vec<Signal>,
    pub errors: Vec<(StrategyId, StrategyError)>,
    /// Retrain failures absorbed by a previously trained model.
    pub training_warnings: Vec<(StrategyId, TrainingError)>,
    pub has_gaps: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// One report per input window, sorted by instrument.
    pub instruments: Vec<InstrumentReport>,
}

impl CycleReport {
    pub fn decisions(&self) -> BTreeMap<Instrument, Signal> {
        self.instruments
            .iter()
            .filter_map(|r| r.decision.clone().map(|d| (r.instrument.clone(), d)))
            .collect()
    }

    /// Instruments ordered by decision strength.
    pub fn ranked(&self) -> Vec<(Instrument, Signal)> {
        let decisions = self.decisions();
        rank_instruments(&decisions)
            .into_iter()
            .map(|(k, s)| (k.to_string(), s.clone()))
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.instruments.iter().map(|r| r.errors.len()).sum()
    }

    pub fn report(&self, instrument: &str) -> Option<&InstrumentReport> {
        self.instruments.iter().find(|r| r.instrument == instrument)
    }
}

#[derive(Debug)]
pub struct SignalEngine {
    config: EngineConfig,
    strategies: Vec<Strategy>,
}

impl SignalEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut strategies = config
            .strategies
            .iter()
            .map(|s| build_strategy(s, config.seed))
            .collect::<Result<Vec<_>, _>>()?;
        strategies.sort_by_key(Strategy::id);
        info!(strategies = strategies.len(), seed = config.seed, "signal engine ready");
        Ok(Self { config, strategies })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn strategy(&self, id: StrategyId) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.id() == id)
    }

    /// Move every ML strategy's retraining onto its own worker thread.
    pub fn spawn_retrain_workers(&mut self) -> Result<Vec<RetrainWorker>, TrainingError> {
        self.strategies
            .iter_mut()
            .filter_map(Strategy::as_ml_mut)
            .map(|ml| ml.spawn_retrain_worker())
            .collect()
    }

    /// Run every strategy on one window.
    pub fn evaluate_instrument(
        &self,
        window: &Window,
        position: Option<OpenPosition>,
    ) -> InstrumentReport {
        if window.timeframe().num_seconds() != self.config.timeframe_secs {
            warn!(
                instrument = window.instrument(),
                window_secs = window.timeframe().num_seconds(),
                expected_secs = self.config.timeframe_secs,
                "window timeframe differs from engine timeframe"
            );
        }
        let mut ctx = EvalContext {
            position,
            ..EvalContext::default()
        };
        let mut candidates = Vec::new();
        let mut errors = Vec::new();
        for strategy in &self.strategies {
            match strategy.generate_signal(window, &mut ctx) {
                Ok(Some(signal)) => candidates.push(signal),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        instrument = window.instrument(),
                        strategy = %strategy.id(),
                        error = %e,
                        "strategy failed"
                    );
                    errors.push((strategy.id(), e));
                }
            }
        }
        let decision = aggregate(&candidates).cloned();
        debug!(
            instrument = window.instrument(),
            candidates = candidates.len(),
            cache_hits = ctx.features.hits(),
            cache_misses = ctx.features.misses(),
            decision = ?decision.as_ref().map(Signal::action),
            "instrument evaluated"
        );
        InstrumentReport {
            instrument: window.instrument().to_string(),
            decision,
            candidates,
            errors,
            training_warnings: ctx.training_errors,
            has_gaps: window.has_gaps(),
        }
    }

    /// Evaluate all instruments for one cycle.
    ///
    /// `positions` carries the caller's open positions by instrument.
    pub fn evaluate_cycle(
        &self,
        windows: &[Window],
        positions: &BTreeMap<Instrument, OpenPosition>,
    ) -> CycleReport {
        let mut instruments: Vec<InstrumentReport> = windows
            .par_iter()
            .map(|w| self.evaluate_instrument(w, positions.get(w.instrument()).copied()))
            .collect();
        instruments.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        let report = CycleReport { instruments };
        info!(
            instruments = report.instruments.len(),
            decisions = report.decisions().len(),
            errors = report.error_count(),
            "cycle complete"
        );
        report
    }
}
