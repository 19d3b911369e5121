//! Rolling Z-score of the close.
//!
//! Z = (close - SMA(lookback)) / sample_std(lookback)
//! Zero dispersion saturates to 0 (price equals its mean).
//! Lookback: lookback - 1.

use crate::domain::PriceBar;

use super::sma::{rolling_std, sma_of_series};
use super::Indicator;

#[derive(Debug, Clone)]
pub struct ZScore {
    lookback: usize,
    name: String,
}

impl ZScore {
    pub fn new(lookback: usize) -> Self {
        assert!(lookback >= 2, "Z-score lookback must be >= 2");
        Self {
            lookback,
            name: format!("zscore_{lookback}"),
        }
    }
}

impl Indicator for ZScore {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.lookback - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mean = sma_of_series(&closes, self.lookback);
        let std = rolling_std(&closes, self.lookback);
        closes
            .iter()
            .zip(mean.iter().zip(&std))
            .map(|(&c, (&m, &s))| {
                if !m.is_finite() || !s.is_finite() {
                    f64::NAN
                } else if s == 0.0 {
                    0.0
                } else {
                    (c - m) / s
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn zscore_known_value() {
        // 1, 2, 3: mean 2, sample std 1 → z(3) = 1
        let z = ZScore::new(3).compute(&make_bars(&[1.0, 2.0, 3.0]));
        assert_approx(z[2], 1.0, DEFAULT_EPSILON);
    }

    #[test]
    fn flat_zscore_is_zero() {
        let z = ZScore::new(3).compute(&make_bars(&[4.0; 3]));
        assert_approx(z[2], 0.0, DEFAULT_EPSILON);
    }
}
