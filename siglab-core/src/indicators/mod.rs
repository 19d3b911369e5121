//! Feature library: pure technical indicator functions over a price window.
//!
//! Every indicator implements `Indicator`: bars in, a same-length series out,
//! with the first `lookback()` values set to `f64::NAN` (warmup). Strategies
//! never read the raw series directly. They go through `Indicator::latest` or
//! the per-cycle `FeatureCache`, which turn a short window into
//! `FeatureError::InsufficientData` and a non-finite reading into
//! `FeatureError::NonFinite`, so no NaN ever reaches a strategy decision.
//!
//! Divisions that can hit zero (RSI average loss, Bollinger width, stochastic
//! range, CCI mean deviation) saturate to a documented value instead.
//!
//! Multi-series indicators (MACD, stochastic) are exposed as separate named
//! instances per line.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod cci;
pub mod ema;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod swing;
pub mod volume;
pub mod williams_r;
pub mod zscore;

pub use adx::Adx;
pub use atr::Atr;
pub use bollinger::BollingerPosition;
pub use cci::Cci;
pub use ema::Ema;
pub use macd::{Macd, MacdLine};
pub use roc::{Momentum, Roc};
pub use rsi::Rsi;
pub use sma::{ReturnVolatility, Sma, StdDev};
pub use stochastic::{StochLine, Stochastic};
pub use swing::{detect_swings, latest_swing_pair, SwingKind, SwingPair, SwingPoint};
pub use volume::VolumeRatio;
pub use williams_r::WilliamsR;
pub use zscore::ZScore;

use thiserror::Error;

use crate::domain::PriceBar;

/// Failures of the feature library.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("{indicator} needs {required} bars, window has {available}")]
    InsufficientData {
        indicator: String,
        required: usize,
        available: usize,
    },
    #[error("{indicator} produced a non-finite value")]
    NonFinite { indicator: String },
}

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No indicator value at bar t may depend on price data from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Series name (e.g. "rsi_14", "macd_signal_12_26_9").
    fn name(&self) -> &str;

    /// Number of leading NaN values before the first valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    ///
    /// Returns a `Vec<f64>` of the same length as `bars`.
    fn compute(&self, bars: &[PriceBar]) -> Vec<f64>;

    /// Minimum window length for one valid value.
    fn required_bars(&self) -> usize {
        self.lookback() + 1
    }

    /// Value at the newest bar, or an error if the window is too short.
    fn latest(&self, bars: &[PriceBar]) -> Result<f64, FeatureError> {
        ensure_len(self, bars.len())?;
        let series = self.compute(bars);
        last_finite(self.name(), &series)
    }
}

pub(crate) fn ensure_len<I: Indicator + ?Sized>(
    indicator: &I,
    available: usize,
) -> Result<(), FeatureError> {
    let required = indicator.required_bars();
    if available < required {
        return Err(FeatureError::InsufficientData {
            indicator: indicator.name().to_string(),
            required,
            available,
        });
    }
    Ok(())
}

pub(crate) fn last_finite(name: &str, series: &[f64]) -> Result<f64, FeatureError> {
    match series.last() {
        Some(v) if v.is_finite() => Ok(*v),
        _ => Err(FeatureError::NonFinite {
            indicator: name.to_string(),
        }),
    }
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLCV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
    use chrono::{Duration, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                timestamp: base + Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Create bars from explicit (open, high, low, close) tuples.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<PriceBar> {
    use chrono::{Duration, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| PriceBar {
            timestamp: base + Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
