//! Portfolio context: aggregated signals plus return and trade history in,
//! allocation, position sizes and a portfolio risk report out.
//!
//! The caller owns the context and passes it where it is needed; there is
//! no process-wide portfolio manager.

use std::collections::BTreeMap;

use siglab_core::domain::{Instrument, Signal, SignalAction};
use tracing::{debug, info, warn};

use crate::config::{RiskConfig, RiskConfigError};
use crate::kelly::KellySizer;
use crate::metrics::TradeStats;
use crate::monte_carlo::CancelToken;
use crate::optimizer::{
    optimize_or_equal_weight, portfolio_returns, AllocationResult, OptimizationError,
};
use crate::report::{RiskEngine, RiskError, RiskReport};

/// Recommended size for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSize {
    pub instrument: Instrument,
    /// Allocation weight from the optimizer.
    pub weight: f64,
    /// Conservative Kelly fraction for this instrument.
    pub kelly_fraction: f64,
    /// Capital fraction to commit: the smaller of weight and Kelly.
    pub fraction: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioDecision {
    pub allocation: Option<AllocationResult>,
    /// Why the optimizer fell back to equal weights, or why no allocation
    /// could be built at all.
    pub allocation_error: Option<OptimizationError>,
    pub positions: Vec<PositionSize>,
    /// Buy decisions left out for lack of return history.
    pub skipped: Vec<Instrument>,
    pub risk: Option<RiskReport>,
    pub risk_error: Option<RiskError>,
}

impl PortfolioDecision {
    pub fn is_degraded(&self) -> bool {
        self.allocation.as_ref().is_some_and(|a| a.degraded)
    }

    pub fn position(&self, instrument: &str) -> Option<&PositionSize> {
        self.positions.iter().find(|p| p.instrument == instrument)
    }
}

#[derive(Debug, Clone)]
pub struct PortfolioContext {
    engine: RiskEngine,
    sizer: KellySizer,
    returns: BTreeMap<Instrument, Vec<f64>>,
    trades: BTreeMap<Instrument, Vec<f64>>,
}

impl PortfolioContext {
    pub fn new(config: RiskConfig) -> Result<Self, RiskConfigError> {
        let sizer = KellySizer::new(config.kelly_fraction, config.max_position_fraction);
        Ok(Self {
            engine: RiskEngine::new(config)?,
            sizer,
            returns: BTreeMap::new(),
            trades: BTreeMap::new(),
        })
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    /// Append per-period returns. Non-finite values are dropped and only the
    /// newest `max_history` are kept.
    pub fn record_returns(&mut self, instrument: &str, returns: &[f64]) {
        let cap = self.engine.config().max_history;
        let history = self.returns.entry(instrument.to_string()).or_default();
        let before = history.len();
        history.extend(returns.iter().copied().filter(|r| r.is_finite()));
        let dropped = returns.len() - (history.len() - before);
        if dropped > 0 {
            warn!(instrument, dropped, "non-finite returns dropped");
        }
        trim_front(history, cap);
    }

    pub fn record_trade(&mut self, instrument: &str, pnl: f64) {
        if pnl.is_finite() {
            let cap = self.engine.config().max_history;
            let trades = self.trades.entry(instrument.to_string()).or_default();
            trades.push(pnl);
            trim_front(trades, cap);
        }
    }

    pub fn trades(&self, instrument: &str) -> Option<&[f64]> {
        self.trades.get(instrument).map(Vec::as_slice)
    }

    pub fn returns(&self, instrument: &str) -> Option<&[f64]> {
        self.returns.get(instrument).map(Vec::as_slice)
    }

    pub fn trade_stats(&self, instrument: &str) -> TradeStats {
        self.trades
            .get(instrument)
            .map(|t| TradeStats::from_pnls(t))
            .unwrap_or_default()
    }

    /// Kelly fraction from trade history once there is enough of it,
    /// otherwise from the signal's confidence and the default payoff.
    pub fn kelly_for(&self, instrument: &str, signal: &Signal) -> f64 {
        let stats = self.trade_stats(instrument);
        if stats.trades >= self.engine.config().min_trades {
            self.sizer.size_from_trades(&stats)
        } else {
            self.sizer
                .size(signal.confidence(), self.engine.config().default_payoff_ratio)
        }
    }

    pub fn decide(&self, decisions: &BTreeMap<Instrument, Signal>) -> PortfolioDecision {
        self.decide_cancellable(decisions, &CancelToken::new())
    }

    /// Allocate across the Buy decisions. Each step degrades on its own: a
    /// failed optimization falls back to equal weights, a failed simulation
    /// leaves `risk` empty.
    pub fn decide_cancellable(
        &self,
        decisions: &BTreeMap<Instrument, Signal>,
        cancel: &CancelToken,
    ) -> PortfolioDecision {
        let config = self.engine.config();
        let mut decision = PortfolioDecision::default();

        let mut names = Vec::new();
        let mut histories = Vec::new();
        for (instrument, signal) in decisions {
            if signal.action() != SignalAction::Buy {
                continue;
            }
            match self.returns(instrument) {
                Some(h) if h.len() >= config.min_history => {
                    names.push(instrument.clone());
                    histories.push(h);
                }
                _ => decision.skipped.push(instrument.clone()),
            }
        }
        if names.is_empty() {
            debug!(skipped = decision.skipped.len(), "no buy candidates to allocate");
            return decision;
        }

        // Align on the most recent common stretch.
        let len = histories.iter().map(|h| h.len()).min().unwrap_or(0);
        let aligned: Vec<Vec<f64>> = histories
            .iter()
            .map(|h| h[h.len() - len..].to_vec())
            .collect();

        let input = match self.engine.optimization_input(names.clone(), &aligned) {
            Ok(input) => input,
            Err(e) => {
                warn!(error = %e, "could not build optimization input");
                decision.allocation_error = Some(e);
                return decision;
            }
        };
        let (allocation, error) = optimize_or_equal_weight(&input, config.allocation_method);
        decision.allocation_error = error;

        for name in &names {
            let weight = allocation.weight(name);
            let kelly = decisions
                .get(name)
                .map_or(0.0, |signal| self.kelly_for(name, signal));
            decision.positions.push(PositionSize {
                instrument: name.clone(),
                weight,
                kelly_fraction: kelly,
                fraction: weight.min(kelly),
            });
        }

        let series = portfolio_returns(&allocation.weight_vector(&names), &aligned);
        match self.engine.report_cancellable(&series, cancel) {
            Ok(report) => decision.risk = Some(report),
            Err(e) => decision.risk_error = Some(e),
        }

        info!(
            instruments = names.len(),
            method = %allocation.method,
            degraded = allocation.degraded,
            sharpe = allocation.sharpe,
            "portfolio allocated"
        );
        decision.allocation = Some(allocation);
        decision
    }
}

fn trim_front(history: &mut Vec<f64>, cap: usize) {
    if history.len() > cap {
        let excess = history.len() - cap;
        history.drain(..excess);
    }
}
