//! Swing high / swing low detection.
//!
//! A bar is a swing high if its high is the maximum of the symmetric
//! neighborhood `[i - half_width, i + half_width]`, and a swing low if its low
//! is the minimum. Bars closer than `half_width` to either end of the window
//! have no complete neighborhood and are never swings.

use serde::{Deserialize, Serialize};

use crate::domain::PriceBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
    pub kind: SwingKind,
}

/// The most recent swing high and swing low of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPair {
    pub high: SwingPoint,
    pub low: SwingPoint,
}

impl SwingPair {
    pub fn range(&self) -> f64 {
        self.high.price - self.low.price
    }

    /// Range relative to the lower point.
    pub fn relative_size(&self) -> f64 {
        self.range() / self.low.price
    }

    /// True when the low came first (price swung up into the high).
    pub fn is_uptrend(&self) -> bool {
        self.low.index < self.high.index
    }
}

/// All swing points in index order (a bar can be both a high and a low).
pub fn detect_swings(bars: &[PriceBar], half_width: usize) -> Vec<SwingPoint> {
    let n = bars.len();
    let mut swings = Vec::new();
    if half_width == 0 || n < 2 * half_width + 1 {
        return swings;
    }
    for i in half_width..(n - half_width) {
        let hood = &bars[i - half_width..=i + half_width];
        if hood.iter().all(|b| bars[i].high >= b.high) {
            swings.push(SwingPoint {
                index: i,
                price: bars[i].high,
                kind: SwingKind::High,
            });
        }
        if hood.iter().all(|b| bars[i].low <= b.low) {
            swings.push(SwingPoint {
                index: i,
                price: bars[i].low,
                kind: SwingKind::Low,
            });
        }
    }
    swings
}

/// Latest swing high and swing low, if they form a swing of at least
/// `min_swing_size` (fraction of the low price).
pub fn latest_swing_pair(
    bars: &[PriceBar],
    half_width: usize,
    min_swing_size: f64,
) -> Option<SwingPair> {
    let swings = detect_swings(bars, half_width);
    let high = swings.iter().rev().find(|s| s.kind == SwingKind::High)?;
    let low = swings.iter().rev().find(|s| s.kind == SwingKind::Low)?;
    let pair = SwingPair {
        high: *high,
        low: *low,
    };
    if pair.range() <= 0.0 || pair.low.price <= 0.0 || pair.relative_size() < min_swing_size {
        return None;
    }
    Some(pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_bars;

    fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
        let data: Vec<_> = closes.iter().map(|&c| (c, c, c, c)).collect();
        make_ohlc_bars(&data)
    }

    #[test]
    fn detects_peak_and_trough() {
        let bars = bars_from_closes(&[100.0, 102.0, 110.0, 104.0, 101.0, 100.0, 103.0, 105.0]);
        let swings = detect_swings(&bars, 2);
        assert!(swings.contains(&SwingPoint {
            index: 2,
            price: 110.0,
            kind: SwingKind::High
        }));
        assert!(swings.contains(&SwingPoint {
            index: 5,
            price: 100.0,
            kind: SwingKind::Low
        }));
    }

    #[test]
    fn edges_are_not_swings() {
        let bars = bars_from_closes(&[120.0, 100.0, 105.0, 110.0, 90.0]);
        let swings = detect_swings(&bars, 2);
        assert!(swings.iter().all(|s| s.index == 2));
    }

    #[test]
    fn pair_requires_minimum_size() {
        let bars = bars_from_closes(&[100.0, 100.5, 101.0, 100.5, 100.0, 100.5, 101.0]);
        // 101 vs 100 is a 1% swing
        assert!(latest_swing_pair(&bars, 2, 0.02).is_none());
        assert!(latest_swing_pair(&bars, 2, 0.005).is_some());
    }

    #[test]
    fn pair_reports_trend_direction() {
        let bars = bars_from_closes(&[105.0, 103.0, 100.0, 103.0, 106.0, 110.0, 107.0, 104.0]);
        let pair = latest_swing_pair(&bars, 2, 0.02).unwrap();
        assert_eq!(pair.low.index, 2);
        assert_eq!(pair.high.index, 5);
        assert!(pair.is_uptrend());
        assert!((pair.range() - 10.0).abs() < 1e-12);
    }
}
