//! Background retrain worker.
//!
//! Scoring threads never block on training when a worker is attached: the
//! strategy queues a `RetrainCommand` and keeps serving the current model.
//! The worker trains off to the side, publishes into the shared `ModelSlot`
//! under the window's instrument and reports a `RetrainOutcome` on the completion channel.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::{Instrument, StrategyId, Window};
use crate::features::FeatureCache;

use super::model::{ModelState, TrainingError};
use super::Trainer;

#[derive(Debug)]
pub enum RetrainCommand {
    Retrain(Box<Window>),
    Shutdown,
}

/// Lightweight description of a freshly published model.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub training_sample_count: usize,
    pub trained_through: DateTime<Utc>,
    pub top_features: Vec<(String, f64)>,
}

impl From<&ModelState> for TrainingSummary {
    fn from(m: &ModelState) -> Self {
        Self {
            training_sample_count: m.training_sample_count(),
            trained_through: m.trained_through(),
            top_features: m.top_features(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrainOutcome {
    pub strategy_id: StrategyId,
    pub instrument: Instrument,
    pub result: Result<TrainingSummary, TrainingError>,
}

/// Handle to a running retrain thread.
#[derive(Debug)]
pub struct RetrainWorker {
    commands: Sender<RetrainCommand>,
    outcomes: Receiver<RetrainOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl RetrainWorker {
    pub(crate) fn spawn(
        strategy_id: StrategyId,
        trainer: Arc<Trainer>,
    ) -> Result<(Self, Sender<RetrainCommand>), TrainingError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("siglab-retrain-{}", strategy_id.0))
            .spawn(move || worker_loop(strategy_id, &trainer, cmd_rx, done_tx))
            .map_err(|e| {
                warn!(%strategy_id, error = %e, "failed to spawn retrain worker");
                TrainingError::WorkerUnavailable
            })?;
        let worker = Self {
            commands: cmd_tx.clone(),
            outcomes: done_rx,
            handle: Some(handle),
        };
        Ok((worker, cmd_tx))
    }

    /// Wait up to `timeout` for the next completed retrain.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RetrainOutcome> {
        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<RetrainOutcome> {
        self.outcomes.try_recv().ok()
    }

    /// Stop the worker after its current job and wait for it to exit.
    pub fn shutdown(mut self) {
        let _ = self.commands.send(RetrainCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RetrainWorker {
    fn drop(&mut self) {
        let _ = self.commands.send(RetrainCommand::Shutdown);
    }
}

fn worker_loop(
    strategy_id: StrategyId,
    trainer: &Trainer,
    rx: Receiver<RetrainCommand>,
    tx: Sender<RetrainOutcome>,
) {
    loop {
        match rx.recv() {
            Ok(RetrainCommand::Shutdown) | Err(_) => break,
            Ok(RetrainCommand::Retrain(window)) => {
                debug!(%strategy_id, bars = window.len(), "background retrain started");
                let result = trainer
                    .retrain(&window, &mut FeatureCache::new())
                    .map(|m| TrainingSummary::from(m.as_ref()));
                let instrument = window.instrument().to_string();
                trainer.slot().finish_retrain(&instrument);
                let outcome = RetrainOutcome {
                    strategy_id,
                    instrument,
                    result,
                };
                if tx.send(outcome).is_err() {
                    debug!(%strategy_id, "retrain outcome receiver dropped");
                }
            }
        }
    }
}
