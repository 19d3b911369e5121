//! Monte Carlo terminal-value simulation.
//!
//! Each path starts at 1.0 and compounds `horizon` normally distributed
//! period returns drawn from N(mean, std). Paths are split into fixed-size
//! chunks; chunk `c` draws from `RngHierarchy::rng_for("monte_carlo", c)`,
//! so the terminal values do not depend on how many worker threads run.
//!
//! Simulations run on a private bounded rayon pool and honor a
//! `CancelToken` and an optional deadline. A cancelled or timed-out run
//! returns `SimulationError`, never a partial summary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use siglab_core::rng::RngHierarchy;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::MonteCarloConfig;
use crate::stats::{mean, percentile_sorted, population_std, sorted};

const STREAM: &str = "monte_carlo";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("simulation cancelled")]
    Cancelled,
    #[error("simulation exceeded its deadline")]
    TimedOut,
    #[error("simulated value became non-finite")]
    Diverged,
    #[error("invalid simulation parameters: {0}")]
    InvalidParameters(String),
    #[error("simulation worker exited without a result")]
    WorkerLost,
    #[error("could not start simulation pool: {0}")]
    PoolUnavailable(String),
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Distribution of simulated terminal values (1.0 = break-even).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub paths: usize,
    pub horizon: usize,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation of terminal values.
    pub std: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    /// Fraction of paths ending above 1.0.
    pub probability_profit: f64,
    /// Fraction of paths ending below 1.0.
    pub probability_loss: f64,
    pub min: f64,
    pub max: f64,
}

impl MonteCarloSummary {
    pub fn from_terminal_values(values: &[f64], horizon: usize) -> Self {
        let s = sorted(values);
        let n = values.len().max(1) as f64;
        let p50 = percentile_sorted(&s, 50.0);
        Self {
            paths: values.len(),
            horizon,
            mean: mean(values),
            median: p50,
            std: population_std(values),
            p5: percentile_sorted(&s, 5.0),
            p25: percentile_sorted(&s, 25.0),
            p50,
            p75: percentile_sorted(&s, 75.0),
            p95: percentile_sorted(&s, 95.0),
            probability_profit: values.iter().filter(|v| **v > 1.0).count() as f64 / n,
            probability_loss: values.iter().filter(|v| **v < 1.0).count() as f64 / n,
            min: s.first().copied().unwrap_or(0.0),
            max: s.last().copied().unwrap_or(0.0),
        }
    }
}

/// Simulate terminal values and summarize them.
pub fn simulate(
    mean_return: f64,
    std_return: f64,
    config: &MonteCarloConfig,
    cancel: &CancelToken,
) -> Result<MonteCarloSummary, SimulationError> {
    let values = simulate_terminal_values(mean_return, std_return, config, cancel)?;
    Ok(MonteCarloSummary::from_terminal_values(&values, config.horizon))
}

/// Raw terminal values in path order.
pub fn simulate_terminal_values(
    mean_return: f64,
    std_return: f64,
    config: &MonteCarloConfig,
    cancel: &CancelToken,
) -> Result<Vec<f64>, SimulationError> {
    validate(mean_return, std_return, config)?;
    let started = Instant::now();
    let deadline = config
        .timeout_ms
        .map(|ms| started + Duration::from_millis(ms));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .thread_name(|i| format!("siglab-mc-{i}"))
        .build()
        .map_err(|e| SimulationError::PoolUnavailable(e.to_string()))?;

    let chunks = config.paths.div_ceil(config.chunk_size);
    let rngs = RngHierarchy::new(config.seed);
    debug!(
        paths = config.paths,
        horizon = config.horizon,
        chunks,
        threads = pool.current_num_threads(),
        "monte carlo started"
    );

    let result: Result<Vec<Vec<f64>>, SimulationError> = pool.install(|| {
        (0..chunks)
            .into_par_iter()
            .map(|c| {
                let first = c * config.chunk_size;
                let count = config.chunk_size.min(config.paths - first);
                let mut rng = rngs.rng_for(STREAM, c as u64);
                let mut out = Vec::with_capacity(count);
                for _ in 0..count {
                    if cancel.is_cancelled() {
                        return Err(SimulationError::Cancelled);
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Err(SimulationError::TimedOut);
                    }
                    out.push(simulate_path(&mut rng, mean_return, std_return, config.horizon)?);
                }
                Ok(out)
            })
            .collect()
    });

    match result {
        Ok(chunks) => {
            let values: Vec<f64> = chunks.into_iter().flatten().collect();
            debug!(
                paths = values.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "monte carlo finished"
            );
            Ok(values)
        }
        Err(e) => {
            warn!(error = %e, "monte carlo aborted");
            Err(e)
        }
    }
}

fn validate(mean_return: f64, std_return: f64, config: &MonteCarloConfig) -> Result<(), SimulationError> {
    if !mean_return.is_finite() || !std_return.is_finite() {
        return Err(SimulationError::InvalidParameters(
            "mean and std must be finite".into(),
        ));
    }
    if std_return < 0.0 {
        return Err(SimulationError::InvalidParameters(format!(
            "negative std {std_return}"
        )));
    }
    if config.paths == 0 || config.horizon == 0 || config.chunk_size == 0 {
        return Err(SimulationError::InvalidParameters(
            "paths, horizon and chunk_size must be positive".into(),
        ));
    }
    Ok(())
}

fn simulate_path<R: Rng>(rng: &mut R, mean: f64, std: f64, horizon: usize) -> Result<f64, SimulationError> {
    let mut value = 1.0;
    for _ in 0..horizon {
        value *= 1.0 + mean + std * standard_normal(rng);
    }
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SimulationError::Diverged)
    }
}

/// Box-Muller draw; `u1` is taken from (0, 1] so the log stays finite.
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

// ─── Background simulation ───────────────────────────────────────────

/// Handle to a simulation running on its own thread.
///
/// The result arrives over a completion channel. Dropping the handle
/// cancels the run and joins the thread.
#[derive(Debug)]
pub struct SimulationHandle {
    cancel: CancelToken,
    result: Receiver<Result<MonteCarloSummary, SimulationError>>,
    handle: Option<JoinHandle<()>>,
}

impl SimulationHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Non-blocking poll. `None` while the simulation is still running.
    pub fn try_result(&self) -> Option<Result<MonteCarloSummary, SimulationError>> {
        match self.result.try_recv() {
            Ok(r) => Some(r),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SimulationError::WorkerLost)),
        }
    }

    /// Block up to `timeout`; on expiry the run is cancelled and
    /// `TimedOut` returned.
    pub fn wait(self, timeout: Duration) -> Result<MonteCarloSummary, SimulationError> {
        match self.result.recv_timeout(timeout) {
            Ok(r) => r,
            Err(RecvTimeoutError::Timeout) => {
                self.cancel.cancel();
                Err(SimulationError::TimedOut)
            }
            Err(RecvTimeoutError::Disconnected) => Err(SimulationError::WorkerLost),
        }
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Start a simulation on a dedicated thread and return immediately.
pub fn spawn_simulation(
    mean_return: f64,
    std_return: f64,
    config: MonteCarloConfig,
) -> Result<SimulationHandle, SimulationError> {
    validate(mean_return, std_return, &config)?;
    let cancel = CancelToken::new();
    let (tx, rx) = mpsc::channel();
    let token = cancel.clone();
    let handle = thread::Builder::new()
        .name("siglab-monte-carlo".into())
        .spawn(move || {
            let result = simulate(mean_return, std_return, &config, &token);
            if tx.send(result).is_err() {
                debug!("simulation result receiver dropped");
            }
        })
        .map_err(|e| SimulationError::PoolUnavailable(e.to_string()))?;
    Ok(SimulationHandle {
        cancel,
        result: rx,
        handle: Some(handle),
    })
}
