//! MACD: moving average convergence/divergence.
//!
//! MACD line = EMA(fast) - EMA(slow)
//! Signal line = EMA(signal) of the MACD line
//! Histogram = MACD line - signal line
//!
//! Lookback: slow - 1 for the MACD line, slow + signal - 2 for signal/histogram.

use crate::domain::PriceBar;

use super::ema::ema_of_series;
use super::Indicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdLine {
    Macd,
    Signal,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    line: MacdLine,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize, line: MacdLine) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(slow > fast, "MACD slow period must exceed fast period");
        let prefix = match line {
            MacdLine::Macd => "macd",
            MacdLine::Signal => "macd_signal",
            MacdLine::Histogram => "macd_hist",
        };
        Self {
            fast,
            slow,
            signal,
            line,
            name: format!("{prefix}_{fast}_{slow}_{signal}"),
        }
    }

    /// The standard 12/26/9 configuration.
    pub fn standard(line: MacdLine) -> Self {
        Self::new(12, 26, 9, line)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.line {
            MacdLine::Macd => self.slow - 1,
            MacdLine::Signal | MacdLine::Histogram => self.slow + self.signal - 2,
        }
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);
        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        match self.line {
            MacdLine::Macd => macd,
            MacdLine::Signal => ema_of_series(&macd, self.signal),
            MacdLine::Histogram => {
                let signal = ema_of_series(&macd, self.signal);
                macd.iter().zip(&signal).map(|(m, s)| m - s).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn macd_constant_series_is_zero() {
        let bars = make_bars(&[100.0; 50]);
        for line in [MacdLine::Macd, MacdLine::Signal, MacdLine::Histogram] {
            let m = Macd::standard(line);
            let result = m.compute(&bars);
            assert!(result[m.lookback() - 1].is_nan());
            assert_approx(result[m.lookback()], 0.0, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn macd_rising_series_is_positive() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let macd = Macd::standard(MacdLine::Macd).compute(&make_bars(&closes));
        assert!(*macd.last().unwrap() > 0.0);
    }

    #[test]
    fn histogram_is_line_minus_signal() {
        let closes: Vec<f64> = (0..80)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0)
            .collect();
        let bars = make_bars(&closes);
        let line = Macd::standard(MacdLine::Macd).compute(&bars);
        let signal = Macd::standard(MacdLine::Signal).compute(&bars);
        let hist = Macd::standard(MacdLine::Histogram).compute(&bars);
        let i = 70;
        assert_approx(hist[i], line[i] - signal[i], DEFAULT_EPSILON);
    }

    #[test]
    fn macd_lookbacks() {
        assert_eq!(Macd::standard(MacdLine::Macd).lookback(), 25);
        assert_eq!(Macd::standard(MacdLine::Signal).lookback(), 33);
        assert_eq!(Macd::standard(MacdLine::Histogram).name(), "macd_hist_12_26_9");
    }
}
