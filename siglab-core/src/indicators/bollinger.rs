//! Bollinger band position.
//!
//! Middle = SMA(period), bands = middle ± k * sample std.
//! Position = (close - lower) / (upper - lower): 0 at the lower band, 1 at the upper.
//! Zero band width saturates to 0.5.
//! Lookback: period - 1.

use crate::domain::PriceBar;

use super::sma::{rolling_std, sma_of_series};
use super::Indicator;

#[derive(Debug, Clone)]
pub struct BollingerPosition {
    period: usize,
    k: f64,
    name: String,
}

impl BollingerPosition {
    pub fn new(period: usize, k: f64) -> Self {
        assert!(period >= 2, "Bollinger period must be >= 2");
        Self {
            period,
            k,
            name: format!("bb_position_{period}_{k}"),
        }
    }
}

impl Indicator for BollingerPosition {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let middle = sma_of_series(&closes, self.period);
        let std = rolling_std(&closes, self.period);
        closes
            .iter()
            .zip(middle.iter().zip(&std))
            .map(|(&c, (&m, &s))| {
                if !m.is_finite() || !s.is_finite() {
                    return f64::NAN;
                }
                let width = 2.0 * self.k * s;
                if width == 0.0 {
                    0.5
                } else {
                    (c - (m - self.k * s)) / width
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
    fn flat_series_sits_mid_band() {
        let result = BollingerPosition::new(5, 2.0).compute(&make_bars(&[10.0; 8]));
        assert!(result[3].is_nan());
        assert_approx(result[7], 0.5, DEFAULT_EPSILON);
    }

    #[test]
    fn close_at_mean_is_half() {
        // window 1, 3, 2: mean 2, close 2
        let result = BollingerPosition::new(3, 2.0).compute(&make_bars(&[1.0, 3.0, 2.0]));
        assert_approx(result[2], 0.5, DEFAULT_EPSILON);
    }

    #[test]
    fn close_above_mean_is_above_half() {
        let result = BollingerPosition::new(3, 2.0).compute(&make_bars(&[1.0, 2.0, 3.0]));
        // mean 2, std 1, lower 0, upper 4 → (3 - 0)/4
        assert_approx(result[2], 0.75, DEFAULT_EPSILON);
    }
}
