//! Volume ratio: current volume over its rolling average (current bar included).
//!
//! A zero average saturates to 1.0 (no information either way).
//! Lookback: period - 1.

use crate::domain::PriceBar;

use super::sma::sma_of_series;
use super::Indicator;

#[derive(Debug, Clone)]
pub struct VolumeRatio {
    period: usize,
    name: String,
}

impl VolumeRatio {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "volume period must be >= 1");
        Self {
            period,
            name: format!("volume_ratio_{period}"),
        }
    }
}

impl Indicator for VolumeRatio {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let avg = sma_of_series(&volumes, self.period);
        volumes
            .iter()
            .zip(&avg)
            .map(|(&v, &a)| {
                if !a.is_finite() {
                    f64::NAN
                } else if a == 0.0 {
                    1.0
                } else {
                    v / a
                }
            })
            .collect()
    }
}
