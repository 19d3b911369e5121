//! Kelly position sizing.
//!
//! Full Kelly f* = (p·b − q)/b with p the win probability, q = 1 − p and b
//! the payoff ratio. The sizer scales it by a conservative factor (quarter
//! Kelly by default) and clamps to [0, max_position_fraction].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics::TradeStats;

/// Raw Kelly fraction. Negative when the bet has no edge; 0.0 for a
/// non-positive or non-finite payoff ratio.
pub fn kelly_fraction(win_probability: f64, payoff_ratio: f64) -> f64 {
    if !win_probability.is_finite() || !payoff_ratio.is_finite() || payoff_ratio <= 0.0 {
        return 0.0;
    }
    let p = win_probability.clamp(0.0, 1.0);
    (p * payoff_ratio - (1.0 - p)) / payoff_ratio
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellySizer {
    pub conservative_factor: f64,
    pub max_position_fraction: f64,
}

impl Default for KellySizer {
    fn default() -> Self {
        Self {
            conservative_factor: 0.25,
            max_position_fraction: 1.0,
        }
    }
}

impl KellySizer {
    pub fn new(conservative_factor: f64, max_position_fraction: f64) -> Self {
        Self {
            conservative_factor,
            max_position_fraction,
        }
    }

    /// Recommended fraction of capital, always in [0, max_position_fraction].
    pub fn size(&self, win_probability: f64, payoff_ratio: f64) -> f64 {
        let cap = if self.max_position_fraction.is_finite() {
            self.max_position_fraction.max(0.0)
        } else {
            0.0
        };
        let scaled = kelly_fraction(win_probability, payoff_ratio) * self.conservative_factor;
        if !scaled.is_finite() {
            return 0.0;
        }
        scaled.clamp(0.0, cap)
    }

    /// Size from closed-trade statistics.
    pub fn size_from_trades(&self, stats: &TradeStats) -> f64 {
        let fraction = self.size(stats.win_rate, stats.payoff_ratio);
        debug!(
            trades = stats.trades,
            win_rate = stats.win_rate,
            payoff_ratio = stats.payoff_ratio,
            fraction,
            "kelly size from trades"
        );
        fraction
    }
}
