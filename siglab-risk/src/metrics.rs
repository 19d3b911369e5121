//! Risk and performance metrics: pure functions over a per-period return
//! series.
//!
//! VaR, CVaR and drawdown are reported as non-negative loss magnitudes:
//! a VaR_95 of 0.03 means a 3% loss is exceeded on 5% of periods.
//! Ratios return 0.0 when their denominator vanishes.

use serde::{Deserialize, Serialize};

use crate::stats::{correlation, covariance, mean, percentile_sorted, sorted, std_dev};

/// Aggregate risk metrics for one return series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnMetrics {
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub cvar_99: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub observations: usize,
}

impl ReturnMetrics {
    pub fn compute(returns: &[f64], risk_free_rate: f64, periods_per_year: usize) -> Self {
        Self {
            var_95: value_at_risk(returns, 0.95),
            var_99: value_at_risk(returns, 0.99),
            cvar_95: conditional_value_at_risk(returns, 0.95),
            cvar_99: conditional_value_at_risk(returns, 0.99),
            max_drawdown: max_drawdown(returns),
            sharpe: sharpe_ratio(returns, risk_free_rate, periods_per_year),
            sortino: sortino_ratio(returns, risk_free_rate, periods_per_year),
            calmar: calmar_ratio(returns, periods_per_year),
            annualized_return: annualized_return(returns, periods_per_year),
            annualized_volatility: annualized_volatility(returns, periods_per_year),
            observations: returns.len(),
        }
    }
}

// ─── Tail risk ───────────────────────────────────────────────────────

/// Historical VaR at `confidence` (e.g. 0.95): the negated
/// `(1 - confidence)` lower percentile of returns, floored at zero.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let threshold = percentile_sorted(&sorted(returns), (1.0 - confidence) * 100.0);
    (-threshold).max(0.0)
}

/// Expected shortfall: mean of the returns at or below the VaR threshold.
pub fn conditional_value_at_risk(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let s = sorted(returns);
    let threshold = percentile_sorted(&s, (1.0 - confidence) * 100.0);
    let tail: Vec<f64> = s.iter().copied().take_while(|r| *r <= threshold).collect();
    (-mean(&tail)).max(0.0)
}

/// Square-root-of-time scaling of a one-period loss bound.
pub fn scale_to_horizon(one_period: f64, periods: usize) -> f64 {
    one_period * (periods as f64).sqrt()
}

// ─── Drawdown ────────────────────────────────────────────────────────

/// Compounded value path starting at 1.0 (one longer than `returns`).
pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
    let mut curve = Vec::with_capacity(returns.len() + 1);
    let mut value = 1.0;
    curve.push(value);
    for r in returns {
        value *= 1.0 + r;
        curve.push(value);
    }
    curve
}

/// Largest peak-to-trough decline of the compounded curve, as a fraction.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut peak = 1.0_f64;
    let mut worst = 0.0_f64;
    for value in equity_curve(returns) {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}

// ─── Annualized ratios ───────────────────────────────────────────────

/// Mean per-period return compounded over one year.
pub fn annualized_return(returns: &[f64], periods_per_year: usize) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    (1.0 + mean(returns)).powi(periods_per_year as i32) - 1.0
}

pub fn annualized_volatility(returns: &[f64], periods_per_year: usize) -> f64 {
    std_dev(returns) * (periods_per_year as f64).sqrt()
}

/// Sharpe = mean(r - rf/period) / std(r) * sqrt(periods per year).
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: usize) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let per_period_rf = risk_free_rate / periods_per_year as f64;
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    (mean(returns) - per_period_rf) / std * (periods_per_year as f64).sqrt()
}

/// Sortino: like Sharpe, with only below-target deviations in the denominator.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: usize) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let per_period_rf = risk_free_rate / periods_per_year as f64;
    let excess: Vec<f64> = returns.iter().map(|r| r - per_period_rf).collect();
    let downside_sq: f64 = excess.iter().filter(|r| **r < 0.0).map(|r| r * r).sum();
    let downside = (downside_sq / returns.len() as f64).sqrt();
    if downside < 1e-15 {
        return 0.0;
    }
    mean(&excess) / downside * (periods_per_year as f64).sqrt()
}

/// Calmar = annualized return / max drawdown.
pub fn calmar_ratio(returns: &[f64], periods_per_year: usize) -> f64 {
    let dd = max_drawdown(returns);
    if dd < 1e-15 {
        return 0.0;
    }
    annualized_return(returns, periods_per_year) / dd
}

// ─── Trade statistics ────────────────────────────────────────────────

/// Summary of closed-trade PnLs, the input to Kelly sizing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    /// Average losing trade as a positive amount.
    pub avg_loss: f64,
    /// avg_win / avg_loss, the Kelly `b`.
    pub payoff_ratio: f64,
    /// Gross profit / gross loss, capped at 100.
    pub profit_factor: f64,
}

impl TradeStats {
    pub fn from_pnls(pnls: &[f64]) -> Self {
        let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = pnls.iter().filter(|p| **p < 0.0).map(|p| -p).collect();
        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().sum();
        let avg_win = mean(&wins);
        let avg_loss = mean(&losses);

        let payoff_ratio = if avg_loss > 0.0 {
            avg_win / avg_loss
        } else if avg_win > 0.0 {
            100.0
        } else {
            0.0
        };
        let profit_factor = if gross_loss < 1e-10 {
            if gross_profit > 0.0 {
                100.0
            } else {
                0.0
            }
        } else {
            (gross_profit / gross_loss).min(100.0)
        };

        Self {
            trades: pnls.len(),
            wins: wins.len(),
            losses: losses.len(),
            win_rate: if pnls.is_empty() {
                0.0
            } else {
                wins.len() as f64 / pnls.len() as f64
            },
            avg_win,
            avg_loss,
            payoff_ratio,
            profit_factor,
        }
    }
}

// ─── Benchmark comparison ────────────────────────────────────────────

/// Strategy returns measured against a benchmark over their common tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub strategy_return: f64,
    pub benchmark_return: f64,
    pub excess_return: f64,
    pub beta: f64,
    /// Annualized Jensen-style alpha without a risk-free leg.
    pub alpha: f64,
    pub correlation: f64,
    pub tracking_error: f64,
    pub information_ratio: f64,
    pub observations: usize,
}

impl BenchmarkComparison {
    /// `None` when the two series share fewer than two observations.
    pub fn compute(strategy: &[f64], benchmark: &[f64], periods_per_year: usize) -> Option<Self> {
        let n = strategy.len().min(benchmark.len());
        if n < 2 {
            return None;
        }
        let s = &strategy[strategy.len() - n..];
        let b = &benchmark[benchmark.len() - n..];
        let ppy = periods_per_year as f64;

        let total = |r: &[f64]| equity_curve(r).last().copied().unwrap_or(1.0) - 1.0;
        let strategy_return = total(s);
        let benchmark_return = total(b);

        let var_b = covariance(b, b);
        let beta = if var_b < 1e-15 { 0.0 } else { covariance(s, b) / var_b };
        let alpha = (mean(s) - beta * mean(b)) * ppy;

        let excess: Vec<f64> = s.iter().zip(b).map(|(x, y)| x - y).collect();
        let tracking_error = std_dev(&excess) * ppy.sqrt();
        let information_ratio = if tracking_error < 1e-15 {
            0.0
        } else {
            mean(&excess) * ppy / tracking_error
        };

        Some(Self {
            strategy_return,
            benchmark_return,
            excess_return: strategy_return - benchmark_return,
            beta,
            alpha,
            correlation: correlation(s, b),
            tracking_error,
            information_ratio,
            observations: n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ladder() -> Vec<f64> {
        (0..10).map(|i| -0.05 + 0.01 * i as f64).collect()
    }

    #[test]
    fn var_is_negated_lower_percentile() {
        let r = ladder();
        assert!((value_at_risk(&r, 0.95) - 0.0455).abs() < 1e-12);
        assert!((value_at_risk(&r, 0.99) - 0.0491).abs() < 1e-12);
    }

    #[test]
    fn cvar_averages_the_tail() {
        let r = ladder();
        assert!((conditional_value_at_risk(&r, 0.95) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn var_of_all_gains_is_zero() {
        let r = [0.01, 0.02, 0.03];
        assert_eq!(value_at_risk(&r, 0.95), 0.0);
        assert_eq!(conditional_value_at_risk(&r, 0.95), 0.0);
    }

    #[test]
    fn horizon_scaling_uses_square_root_of_time() {
        assert!((scale_to_horizon(0.02, 4) - 0.04).abs() < 1e-15);
    }

    #[test]
    fn drawdown_from_peak() {
        // 1.0 → 1.1 → 0.55 → 0.66
        assert!((max_drawdown(&[0.1, -0.5, 0.2]) - 0.5).abs() < 1e-12);
        assert_eq!(max_drawdown(&[0.01, 0.02]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn ratios_of_constant_returns() {
        let flat = [0.001; 50];
        assert_eq!(sharpe_ratio(&flat, 0.0, 252), 0.0);
        assert_eq!(sortino_ratio(&flat, 0.0, 252), 0.0);
        assert_eq!(calmar_ratio(&flat, 252), 0.0);
    }

    #[test]
    fn sharpe_sign_follows_excess_return() {
        let r: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 0.01 } else { -0.005 }).collect();
        assert!(sharpe_ratio(&r, 0.0, 252) > 0.0);
        assert!(sharpe_ratio(&r, 2.0, 252) < 0.0);
        assert!(sortino_ratio(&r, 0.0, 252) > sharpe_ratio(&r, 0.0, 252));
    }

    #[test]
    fn trade_stats_from_pnls() {
        let t = TradeStats::from_pnls(&[100.0, -50.0, 200.0, -50.0, 0.0]);
        assert_eq!(t.trades, 5);
        assert_eq!(t.wins, 2);
        assert_eq!(t.losses, 2);
        assert!((t.win_rate - 0.4).abs() < 1e-12);
        assert!((t.avg_win - 150.0).abs() < 1e-12);
        assert!((t.avg_loss - 50.0).abs() < 1e-12);
        assert!((t.payoff_ratio - 3.0).abs() < 1e-12);
        assert!((t.profit_factor - 3.0).abs() < 1e-12);
    }

    #[test]
    fn trade_stats_without_losses_are_capped() {
        let t = TradeStats::from_pnls(&[10.0, 20.0]);
        assert_eq!(t.profit_factor, 100.0);
        assert_eq!(t.payoff_ratio, 100.0);
        assert_eq!(TradeStats::from_pnls(&[]), TradeStats::default());
    }

    #[test]
    fn leveraged_benchmark_has_beta_two() {
        let b: Vec<f64> = (0..60).map(|i| 0.01 * ((i as f64) * 0.7).sin()).collect();
        let s: Vec<f64> = b.iter().map(|x| 2.0 * x).collect();
        let c = BenchmarkComparison::compute(&s, &b, 252).unwrap();
        assert!((c.beta - 2.0).abs() < 1e-9);
        assert!((c.correlation - 1.0).abs() < 1e-9);
        assert!(c.alpha.abs() < 1e-9);
        assert_eq!(c.observations, 60);
    }

    #[test]
    fn benchmark_needs_two_observations() {
        assert!(BenchmarkComparison::compute(&[0.01], &[0.02, 0.01], 252).is_none());
    }

    proptest! {
        #[test]
        fn deeper_quantile_is_a_larger_loss(
            r in prop::collection::vec(-0.2..0.2_f64, 2..200),
        ) {
            let v95 = value_at_risk(&r, 0.95);
            let v99 = value_at_risk(&r, 0.99);
            prop_assert!(v99 >= v95);
            prop_assert!(conditional_value_at_risk(&r, 0.95) >= v95);
            prop_assert!(v95 >= 0.0);
        }

        #[test]
        fn drawdown_is_a_fraction(r in prop::collection::vec(-0.5..0.5_f64, 0..200)) {
            let dd = max_drawdown(&r);
            prop_assert!((0.0..=1.0).contains(&dd));
        }
    }
}
