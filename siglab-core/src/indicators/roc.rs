//! Rate of change and momentum.
//!
//! ROC[t] = 100 * (close[t] - close[t-n]) / close[t-n]   (percent)
//! Momentum[t] = (close[t] - close[t-n]) / close[t-n]    (fraction)
//! Lookback: n.

use crate::domain::PriceBar;

use super::Indicator;

#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
    name: String,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ROC period must be >= 1");
        Self {
            period,
            name: format!("roc_{period}"),
        }
    }
}

impl Indicator for Roc {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        pct_change(&closes, self.period)
            .into_iter()
            .map(|v| v * 100.0)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Momentum {
    period: usize,
    name: String,
}

impl Momentum {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "momentum period must be >= 1");
        Self {
            period,
            name: format!("momentum_{period}"),
        }
    }
}

impl Indicator for Momentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        pct_change(&closes, self.period)
    }
}

/// Fractional change over `n` steps. Zero or non-finite base yields NaN.
pub fn pct_change(values: &[f64], n: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    for i in n..values.len() {
        let base = values[i - n];
        if base != 0.0 && base.is_finite() && values[i].is_finite() {
            result[i] = (values[i] - base) / base;
        }
    }
    result
}
