//! Commodity Channel Index (CCI).
//!
//! TP = (high + low + close) / 3
//! CCI = (TP - SMA(TP)) / (0.015 * mean absolute deviation of TP)
//! Zero deviation saturates to 0.
//! Lookback: period - 1.

use crate::domain::PriceBar;

use super::Indicator;

const LAMBERT: f64 = 0.015;

#[derive(Debug, Clone)]
pub struct Cci {
    period: usize,
    name: String,
}

impl Cci {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "CCI period must be >= 1");
        Self {
            period,
            name: format!("cci_{period}"),
        }
    }
}

impl Indicator for Cci {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let tp: Vec<f64> = bars.iter().map(PriceBar::typical_price).collect();
        let n = tp.len();
        let mut result = vec![f64::NAN; n];
        if n < self.period {
            return result;
        }
        for i in (self.period - 1)..n {
            let window = &tp[i + 1 - self.period..=i];
            let mean = window.iter().sum::<f64>() / self.period as f64;
            let mad = window.iter().map(|v| (v - mean).abs()).sum::<f64>() / self.period as f64;
            result[i] = if mad == 0.0 {
                0.0
            } else {
                (tp[i] - mean) / (LAMBERT * mad)
            };
        }
        result
    }
}
