//! Williams %R.
//!
//! %R = -100 * (highest_high - close) / (highest_high - lowest_low), in [-100, 0].
//! Zero range saturates to -50.
//! Lookback: period - 1.

use crate::domain::PriceBar;

use super::stochastic::high_low;
use super::Indicator;

#[derive(Debug, Clone)]
pub struct WilliamsR {
    period: usize,
    name: String,
}

impl WilliamsR {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "Williams %R period must be >= 1");
        Self {
            period,
            name: format!("williams_r_{period}"),
        }
    }
}

impl Indicator for WilliamsR {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];
        if n < self.period {
            return result;
        }
        for i in (self.period - 1)..n {
            let (hh, ll) = high_low(&bars[i + 1 - self.period..=i]);
            let range = hh - ll;
            result[i] = if range == 0.0 {
                -50.0
            } else {
                -100.0 * (hh - bars[i].close) / range
            };
        }
        result
    }
}
