//! Stochastic oscillator.
//!
//! %K = 100 * (close - lowest_low(period)) / (highest_high(period) - lowest_low(period))
//! %D = SMA(smooth) of %K
//! Zero range saturates %K to 50.
//! Lookback: period - 1 for %K, period + smooth - 2 for %D.

use crate::domain::PriceBar;

use super::sma::sma_of_series;
use super::Indicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StochLine {
    K,
    D,
}

#[derive(Debug, Clone)]
pub struct Stochastic {
    period: usize,
    smooth: usize,
    line: StochLine,
    name: String,
}

impl Stochastic {
    pub fn new(period: usize, smooth: usize, line: StochLine) -> Self {
        assert!(period >= 1 && smooth >= 1, "stochastic periods must be >= 1");
        let prefix = match line {
            StochLine::K => "stoch_k",
            StochLine::D => "stoch_d",
        };
        Self {
            period,
            smooth,
            line,
            name: format!("{prefix}_{period}_{smooth}"),
        }
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.line {
            StochLine::K => self.period - 1,
            StochLine::D => self.period + self.smooth - 2,
        }
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let k = percent_k(bars, self.period);
        match self.line {
            StochLine::K => k,
            StochLine::D => sma_of_series(&k, self.smooth),
        }
    }
}

fn percent_k(bars: &[PriceBar], period: usize) -> Vec<f64> {
    let n = bars.len();
    let mut result = vec![f64::NAN; n];
    if n < period {
        return result;
    }
    for i in (period - 1)..n {
        let (hh, ll) = high_low(&bars[i + 1 - period..=i]);
        let range = hh - ll;
        result[i] = if range == 0.0 {
            50.0
        } else {
            100.0 * (bars[i].close - ll) / range
        };
    }
    result
}

/// Highest high and lowest low of a slice of bars.
pub(crate) fn high_low(bars: &[PriceBar]) -> (f64, f64) {
    bars.iter().fold((f64::MIN, f64::MAX), |(hh, ll), b| {
        (hh.max(b.high), ll.min(b.low))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_ohlc_bars, DEFAULT_EPSILON};

    fn bars() -> Vec<PriceBar> {
        make_ohlc_bars(&[
            (10.0, 12.0, 8.0, 11.0),
            (11.0, 13.0, 9.0, 12.0),
            (12.0, 14.0, 10.0, 13.0),
            (13.0, 13.0, 9.0, 10.0),
        ])
    }

    #[test]
    fn percent_k_known_values() {
        let k = Stochastic::new(3, 2, StochLine::K).compute(&bars());
        assert!(k[1].is_nan());
        // hh 14, ll 8, close 13 → 100 * 5/6
        assert_approx(k[2], 500.0 / 6.0, DEFAULT_EPSILON);
        // hh 14, ll 9, close 10 → 100 * 1/5
        assert_approx(k[3], 20.0, DEFAULT_EPSILON);
    }

    #[test]
    fn percent_d_is_sma_of_k() {
        let d = Stochastic::new(3, 2, StochLine::D).compute(&bars());
        assert!(d[2].is_nan());
        assert_approx(d[3], (500.0 / 6.0 + 20.0) / 2.0, DEFAULT_EPSILON);
    }

    #[test]
    fn zero_range_saturates_to_fifty() {
        let flat = make_ohlc_bars(&[(5.0, 5.0, 5.0, 5.0); 4]);
        let k = Stochastic::new(3, 3, StochLine::K).compute(&flat);
        assert_approx(k[3], 50.0, DEFAULT_EPSILON);
    }
}
