//! Feature engineering for the ML ensemble.
//!
//! One row per bar, 28 columns in `FEATURE_NAMES` order. Rows inside an
//! indicator's warmup contain NaN and are skipped for training. Every
//! series goes through the per-cycle `FeatureCache`, so retraining and
//! scoring on the same window share the indicator work.

use std::sync::Arc;

use crate::domain::Window;
use crate::features::{FeatureCache, FeatureVector};
use crate::indicators::roc::pct_change;
use crate::indicators::{
    Adx, Atr, BollingerPosition, Cci, Indicator, Macd, MacdLine, Momentum, ReturnVolatility, Roc,
    Rsi, Sma, StochLine, Stochastic, VolumeRatio, WilliamsR,
};

pub const FEATURE_NAMES: [&str; 28] = [
    "returns",
    "momentum_5",
    "momentum_10",
    "momentum_20",
    "price_to_sma_10",
    "price_to_sma_20",
    "price_to_sma_50",
    "volatility_10",
    "volatility_20",
    "rsi_14",
    "rsi_7",
    "macd",
    "macd_signal",
    "macd_hist",
    "bb_position",
    "atr_percent",
    "volume_ratio",
    "higher_high",
    "lower_low",
    "higher_close",
    "body_ratio",
    "roc_10",
    "roc_20",
    "stoch_k",
    "stoch_d",
    "williams_r",
    "cci",
    "adx",
];

/// Per-bar feature rows for a whole window.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row `i` is usable when every column is finite.
    pub fn is_complete(&self, i: usize) -> bool {
        self.rows
            .get(i)
            .is_some_and(|r| r.iter().all(|v| v.is_finite()))
    }

    /// Named view of row `i`.
    pub fn named_row(&self, i: usize) -> FeatureVector {
        self.rows
            .get(i)
            .map(|r| {
                FEATURE_NAMES
                    .iter()
                    .zip(r)
                    .map(|(n, v)| (n.to_string(), *v))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn series(cache: &mut FeatureCache, window: &Window, ind: &dyn Indicator) -> Arc<Vec<f64>> {
    cache.series(window, ind)
}

fn ratio_to(closes: &[f64], base: &[f64]) -> Vec<f64> {
    closes
        .iter()
        .zip(base)
        .map(|(c, b)| if *b == 0.0 { f64::NAN } else { (c - b) / b })
        .collect()
}

/// 1.0 where the value rose versus the previous bar (fell, when `rising` is
/// false), NaN on the first bar.
fn step_flag(values: &[f64], rising: bool) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        let up = if rising {
            values[i] > values[i - 1]
        } else {
            values[i] < values[i - 1]
        };
        out[i] = if up { 1.0 } else { 0.0 };
    }
    out
}

pub fn engineer_features(window: &Window, cache: &mut FeatureCache) -> FeatureMatrix {
    let bars = window.bars();
    let closes = window.closes();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

    let atr = series(cache, window, &Atr::new(14));
    let atr_percent: Vec<f64> = atr.iter().zip(&closes).map(|(a, c)| a / c).collect();

    let columns: Vec<Vec<f64>> = vec![
        pct_change(&closes, 1),
        series(cache, window, &Momentum::new(5)).to_vec(),
        series(cache, window, &Momentum::new(10)).to_vec(),
        series(cache, window, &Momentum::new(20)).to_vec(),
        ratio_to(&closes, &series(cache, window, &Sma::new(10))),
        ratio_to(&closes, &series(cache, window, &Sma::new(20))),
        ratio_to(&closes, &series(cache, window, &Sma::new(50))),
        series(cache, window, &ReturnVolatility::new(10)).to_vec(),
        series(cache, window, &ReturnVolatility::new(20)).to_vec(),
        series(cache, window, &Rsi::new(14)).to_vec(),
        series(cache, window, &Rsi::new(7)).to_vec(),
        series(cache, window, &Macd::standard(MacdLine::Macd)).to_vec(),
        series(cache, window, &Macd::standard(MacdLine::Signal)).to_vec(),
        series(cache, window, &Macd::standard(MacdLine::Histogram)).to_vec(),
        series(cache, window, &BollingerPosition::new(20, 2.0)).to_vec(),
        atr_percent,
        series(cache, window, &VolumeRatio::new(20)).to_vec(),
        step_flag(&highs, true),
        step_flag(&lows, false),
        step_flag(&closes, true),
        bars.iter().map(|b| b.body_ratio()).collect(),
        series(cache, window, &Roc::new(10)).to_vec(),
        series(cache, window, &Roc::new(20)).to_vec(),
        series(cache, window, &Stochastic::new(14, 3, StochLine::K)).to_vec(),
        series(cache, window, &Stochastic::new(14, 3, StochLine::D)).to_vec(),
        series(cache, window, &WilliamsR::new(14)).to_vec(),
        series(cache, window, &Cci::new(20)).to_vec(),
        series(cache, window, &Adx::new(14)).to_vec(),
    ];
    debug_assert_eq!(columns.len(), FEATURE_NAMES.len());

    let rows = (0..bars.len())
        .map(|i| columns.iter().map(|col| col[i]).collect())
        .collect();
    FeatureMatrix { rows }
}

/// 1.0 if the close `horizon` bars ahead is higher, 0.0 otherwise.
/// `None` for the last `horizon` bars (no future yet).
pub fn forward_labels(closes: &[f64], horizon: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| {
            closes
                .get(i + horizon)
                .map(|future| if *future > closes[i] { 1.0 } else { 0.0 })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;
    use chrono::Duration;

    fn wavy(n: usize) -> Window {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + 10.0 * (i as f64 * 0.3).sin() + i as f64 * 0.05)
            .collect();
        Window::new("TEST", Duration::days(1), make_bars(&closes)).unwrap()
    }

    #[test]
    fn one_row_per_bar_with_all_columns() {
        let w = wavy(120);
        let mut cache = FeatureCache::new();
        let m = engineer_features(&w, &mut cache);
        assert_eq!(m.len(), 120);
        assert!(m.rows().iter().all(|r| r.len() == FEATURE_NAMES.len()));
    }

    #[test]
    fn warmup_rows_are_incomplete() {
        let w = wavy(120);
        let mut cache = FeatureCache::new();
        let m = engineer_features(&w, &mut cache);
        assert!(!m.is_complete(10));
        assert!(m.is_complete(119));
        assert_eq!(m.named_row(119).len(), 28);
    }

    #[test]
    fn labels_look_forward() {
        let labels = forward_labels(&[1.0, 2.0, 1.5, 3.0], 2);
        assert_eq!(labels, vec![Some(1.0), Some(1.0), None, None]);
    }

    #[test]
    fn features_share_the_cycle_cache() {
        let w = wavy(120);
        let mut cache = FeatureCache::new();
        engineer_features(&w, &mut cache);
        let misses = cache.misses();
        engineer_features(&w, &mut cache);
        assert_eq!(cache.misses(), misses);
    }
}
