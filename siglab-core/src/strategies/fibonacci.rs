//! Fibonacci retracement confluence.
//!
//! The most recent swing high and swing low inside the last `lookback` bars
//! define a range. Levels are `low + ratio * range`: retracements for ratios
//! in [0, 1], extensions beyond. A signal needs the close to sit within
//! `tolerance` (relative) of a retracement level, plus at least
//! `min_confirmations` of four confirmations for one side:
//!
//! | long                     | short                    |
//! |--------------------------|--------------------------|
//! | RSI < `rsi_oversold`     | RSI > `rsi_overbought`   |
//! | MACD line > signal line  | MACD line < signal line  |
//! | volume ratio > 1         | volume ratio > 1         |
//! | close >= 0.618 level     | close <= 0.382 level     |
//!
//! Confidence is `confirmations / 4`. The stop sits at the next level beyond
//! the confluence level, the target at the next level past the close in the
//! trade's direction.
//!
//! Entries only happen when flat. With an open position the strategy only
//! exits: on a breached stop or target, or when the close reaches a
//! resistance level (long) or support level (short).

use crate::config::{ConfigError, StrategyConfig};
use crate::domain::{OpenPosition, PositionSide, PriceBar, Signal, SignalAction, StrategyId, Window};
use crate::indicators::{
    latest_swing_pair, FeatureError, Macd, MacdLine, Rsi, SwingPair, VolumeRatio,
};

use super::{EvalContext, StrategyError};

pub const RETRACEMENT_RATIOS: [f64; 7] = [0.0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0];
pub const EXTENSION_RATIOS: [f64; 5] = [1.272, 1.414, 1.618, 2.0, 2.618];

const CONFIRMATION_COUNT: f64 = 4.0;
const FALLBACK_STOP_FRACTION: f64 = 0.1;
const FALLBACK_TARGET_FRACTION: f64 = 0.236;
const BREACH_CONFIDENCE: f64 = 1.0;
const LEVEL_EXIT_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FibLevel {
    pub ratio: f64,
    pub price: f64,
}

fn levels(low: f64, high: f64, ratios: &[f64]) -> Vec<FibLevel> {
    let range = high - low;
    ratios
        .iter()
        .map(|&ratio| FibLevel {
            ratio,
            price: low + ratio * range,
        })
        .collect()
}

/// Retracement levels from `low` (ratio 0) to `high` (ratio 1), ascending.
pub fn retracement_levels(low: f64, high: f64) -> Vec<FibLevel> {
    levels(low, high, &RETRACEMENT_RATIOS)
}

/// Extension levels above `high`, ascending.
pub fn extension_levels(low: f64, high: f64) -> Vec<FibLevel> {
    levels(low, high, &EXTENSION_RATIOS)
}

/// Levels that cap a long: retracements above the midpoint and every extension.
pub fn resistance_levels(low: f64, high: f64) -> Vec<f64> {
    retracement_levels(low, high)
        .into_iter()
        .filter(|l| l.ratio > 0.5)
        .chain(extension_levels(low, high))
        .map(|l| l.price)
        .collect()
}

/// Levels that hold up a short: retracements below the midpoint.
pub fn support_levels(low: f64, high: f64) -> Vec<f64> {
    retracement_levels(low, high)
        .into_iter()
        .filter(|l| l.ratio < 0.5)
        .map(|l| l.price)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FibConfig {
    pub lookback: usize,
    pub swing_half_width: usize,
    /// Minimum swing range as a fraction of the swing low.
    pub min_swing_size: f64,
    /// Maximum relative distance from a level to count as confluence.
    pub tolerance: f64,
    pub min_confirmations: usize,
    pub min_confidence: f64,
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub volume_period: usize,
}

impl Default for FibConfig {
    fn default() -> Self {
        Self {
            lookback: 50,
            swing_half_width: 5,
            min_swing_size: 0.02,
            tolerance: 0.015,
            min_confirmations: 3,
            min_confidence: 0.6,
            rsi_period: 14,
            rsi_oversold: 35.0,
            rsi_overbought: 65.0,
            volume_period: 20,
        }
    }
}

impl FibConfig {
    pub fn from_config(config: &StrategyConfig) -> Result<Self, ConfigError> {
        let d = Self::default();
        let min_confirmations = config.param_usize("min_confirmations", d.min_confirmations)?;
        if min_confirmations > 4 {
            return Err(config.invalid(
                "min_confirmations",
                min_confirmations as f64,
                "at most 4 confirmations exist",
            ));
        }
        let lookback = config.param_usize("lookback", d.lookback)?;
        let swing_half_width = config.param_usize("swing_half_width", d.swing_half_width)?;
        if lookback < 2 * swing_half_width + 1 {
            return Err(config.invalid(
                "lookback",
                lookback as f64,
                "lookback cannot hold one full swing neighborhood",
            ));
        }
        Ok(Self {
            lookback,
            swing_half_width,
            min_swing_size: config.param_fraction("min_swing_size", d.min_swing_size)?,
            tolerance: config.param_fraction("tolerance", d.tolerance)?,
            min_confirmations,
            min_confidence: config.param_fraction("min_confidence", d.min_confidence)?,
            rsi_period: config.param_usize("rsi_period", d.rsi_period)?,
            rsi_oversold: config.param("rsi_oversold", d.rsi_oversold),
            rsi_overbought: config.param("rsi_overbought", d.rsi_overbought),
            volume_period: config.param_usize("volume_period", d.volume_period)?,
        })
    }
}

#[derive(Debug)]
pub struct FibonacciStrategy {
    id: StrategyId,
    config: FibConfig,
    rsi: Rsi,
    macd: Macd,
    macd_signal: Macd,
    volume: VolumeRatio,
}

impl FibonacciStrategy {
    pub fn new(id: StrategyId, config: FibConfig) -> Self {
        Self {
            id,
            rsi: Rsi::new(config.rsi_period),
            macd: Macd::standard(MacdLine::Macd),
            macd_signal: Macd::standard(MacdLine::Signal),
            volume: VolumeRatio::new(config.volume_period),
            config,
        }
    }

    pub fn id(&self) -> StrategyId {
        self.id
    }

    pub fn generate_signal(
        &self,
        window: &Window,
        ctx: &mut EvalContext,
    ) -> Result<Option<Signal>, StrategyError> {
        let c = &self.config;
        if window.len() < c.lookback {
            return Err(FeatureError::InsufficientData {
                indicator: "fibonacci_swings".into(),
                required: c.lookback,
                available: window.len(),
            }
            .into());
        }
        let cache = &mut ctx.features;
        let macd_signal = cache.latest(window, &self.macd_signal)?;
        let macd = cache.latest(window, &self.macd)?;
        let rsi = cache.latest(window, &self.rsi)?;
        let volume_ratio = cache.latest(window, &self.volume)?;
        let Some(bar) = window.last() else {
            return Ok(None);
        };
        let close = bar.close;

        let recent = &window.bars()[window.len() - c.lookback..];
        let swing = latest_swing_pair(recent, c.swing_half_width, c.min_swing_size);
        if let Some(position) = ctx.position {
            return Ok(self.exit_signal(&position, bar, swing.as_ref()));
        }
        let Some(pair) = swing else {
            return Ok(None);
        };
        let (low, high) = (pair.low.price, pair.high.price);
        let range = pair.range();
        let retracements = retracement_levels(low, high);

        let Some((confluence, distance)) = retracements
            .iter()
            .map(|l| (*l, (close - l.price).abs() / l.price))
            .min_by(|a, b| a.1.total_cmp(&b.1))
        else {
            return Ok(None);
        };
        if distance > c.tolerance {
            return Ok(None);
        }

        let level_at = |ratio: f64| low + ratio * range;
        let volume_ok = volume_ratio > 1.0;
        let long_votes = [
            rsi < c.rsi_oversold,
            macd > macd_signal,
            volume_ok,
            close >= level_at(0.618),
        ];
        let short_votes = [
            rsi > c.rsi_overbought,
            macd < macd_signal,
            volume_ok,
            close <= level_at(0.382),
        ];
        let long = long_votes.iter().filter(|v| **v).count();
        let short = short_votes.iter().filter(|v| **v).count();

        let (action, confirmations) = if long >= c.min_confirmations && long >= short {
            (SignalAction::Buy, long)
        } else if short >= c.min_confirmations {
            (SignalAction::Sell, short)
        } else {
            return Ok(None);
        };
        let confidence = confirmations as f64 / CONFIRMATION_COUNT;
        if confidence < c.min_confidence {
            return Ok(None);
        }

        let mut all: Vec<f64> = retracements
            .iter()
            .chain(extension_levels(low, high).iter())
            .map(|l| l.price)
            .collect();
        all.sort_by(f64::total_cmp);
        let below = |p: f64| all.iter().rev().copied().find(|l| *l < p);
        let above = |p: f64| all.iter().copied().find(|l| *l > p);

        let (stop_loss, take_profit) = match action {
            SignalAction::Buy => (
                below(confluence.price.min(close))
                    .unwrap_or(close - FALLBACK_STOP_FRACTION * range),
                above(confluence.price.max(close))
                    .unwrap_or(close + FALLBACK_TARGET_FRACTION * range),
            ),
            _ => (
                above(confluence.price.max(close))
                    .unwrap_or(close + FALLBACK_STOP_FRACTION * range),
                below(confluence.price.min(close))
                    .unwrap_or(close - FALLBACK_TARGET_FRACTION * range),
            ),
        };

        let mut signal = Signal::new(action, confidence, self.id, bar.timestamp)
            .with_levels(stop_loss, take_profit)
            .with_meta("swing_high", high)
            .with_meta("swing_low", low)
            .with_meta("uptrend", if pair.is_uptrend() { 1.0 } else { 0.0 })
            .with_meta("confluence_ratio", confluence.ratio)
            .with_meta("confluence_level", confluence.price)
            .with_meta("confluence_distance", distance)
            .with_meta("confirmations", confirmations as f64)
            .with_meta("rsi", rsi)
            .with_meta("macd", macd)
            .with_meta("macd_signal", macd_signal)
            .with_meta("volume_ratio", volume_ratio);
        let supports = all.iter().rev().filter(|l| **l < close).take(3);
        for (i, level) in supports.enumerate() {
            signal = signal.with_meta(format!("support_{}", i + 1), *level);
        }
        let resistances = all.iter().filter(|l| **l > close).take(3);
        for (i, level) in resistances.enumerate() {
            signal = signal.with_meta(format!("resistance_{}", i + 1), *level);
        }
        Ok(Some(signal))
    }

    fn exit_signal(
        &self,
        position: &OpenPosition,
        bar: &PriceBar,
        swing: Option<&SwingPair>,
    ) -> Option<Signal> {
        let close = bar.close;
        let exit = match position.side {
            PositionSide::Long => SignalAction::Sell,
            PositionSide::Short => SignalAction::Buy,
        };
        if position.level_breached(close) {
            return Some(
                Signal::new(exit, BREACH_CONFIDENCE, self.id, bar.timestamp)
                    .with_meta("entry_price", position.entry_price),
            );
        }
        let pair = swing?;
        let (low, high) = (pair.low.price, pair.high.price);
        let levels = match position.side {
            PositionSide::Long => resistance_levels(low, high),
            PositionSide::Short => support_levels(low, high),
        };
        let level = levels
            .into_iter()
            .find(|l| (close - l).abs() / close <= self.config.tolerance)?;
        Some(
            Signal::new(exit, LEVEL_EXIT_CONFIDENCE, self.id, bar.timestamp)
                .with_meta("entry_price", position.entry_price)
                .with_meta("exit_level", level),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from(closes: &[f64], last_volume: f64) -> Vec<PriceBar> {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let n = closes.len();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                timestamp: base + Duration::days(i as i64),
                open: c,
                high: c + 0.2,
                low: c - 0.2,
                close: c,
                volume: if i + 1 == n { last_volume } else { 1000.0 },
            })
            .collect()
    }

    /// Swing low at 100, quick rally to 120, slow drift to 120.5, then a
    /// six-bar sell-off into the 0.618 retracement.
    fn retracement_to_golden_level(last_volume: f64) -> Window {
        let mut closes: Vec<f64> = (0..20)
            .map(|i| if i % 2 == 0 { 109.5 } else { 110.5 })
            .collect();
        closes.extend((1..=10).map(|i| 110.0 - i as f64));
        closes.extend((1..=5).map(|i| 100.0 + 4.0 * i as f64));
        closes.extend((1..=25).map(|i| 120.0 + 0.02 * i as f64));
        let top = closes[closes.len() - 1];
        let target = 112.77;
        closes.extend((1..=6).map(|i| top - (top - target) * i as f64 / 6.0));
        Window::new("FIB", Duration::days(1), bars_from(&closes, last_volume)).unwrap()
    }

    #[test]
    fn level_formulas() {
        let r = retracement_levels(100.0, 110.0);
        let e = extension_levels(100.0, 110.0);
        assert_approx(r[4].price, 106.18, 1e-9);
        assert_approx(e[2].price, 116.18, 1e-9);
        assert_eq!(r[0].price, 100.0);
        assert_eq!(r[6].price, 110.0);
    }

    #[test]
    fn levels_are_monotone() {
        let r = retracement_levels(50.0, 80.0);
        let e = extension_levels(50.0, 80.0);
        assert!(r.windows(2).all(|w| w[0].price < w[1].price));
        assert!(e.windows(2).all(|w| w[0].price < w[1].price));
        assert!(e[0].price > r[6].price);
    }

    #[test]
    fn buys_golden_retracement_with_confirmations() {
        let s = FibonacciStrategy::new(StrategyId(3), FibConfig::default());
        let w = retracement_to_golden_level(2000.0);
        let signal = s.generate_signal(&w, &mut EvalContext::new()).unwrap().unwrap();
        assert_eq!(signal.action(), SignalAction::Buy);
        assert_eq!(signal.confidence(), 0.75);
        assert_eq!(signal.meta("confluence_ratio"), Some(0.618));
        assert_eq!(signal.meta("confirmations"), Some(3.0));
        // Swing 99.8 → 120.7: stop at the 0.5 level, target at the 0.786 level
        assert_approx(signal.stop_loss().unwrap(), 99.8 + 0.5 * 20.9, 1e-9);
        assert_approx(signal.take_profit().unwrap(), 99.8 + 0.786 * 20.9, 1e-9);
        assert!(signal.meta("support_1").is_some());
        assert!(signal.meta("resistance_1").is_some());
    }

    #[test]
    fn two_confirmations_are_not_enough() {
        let s = FibonacciStrategy::new(StrategyId(3), FibConfig::default());
        let w = retracement_to_golden_level(1000.0);
        assert!(s.generate_signal(&w, &mut EvalContext::new()).unwrap().is_none());
    }

    #[test]
    fn far_from_every_level_is_silent() {
        let config = FibConfig {
            tolerance: 0.0001,
            ..FibConfig::default()
        };
        let s = FibonacciStrategy::new(StrategyId(3), config);
        let mut closes: Vec<f64> = retracement_to_golden_level(2000.0).closes();
        if let Some(last) = closes.last_mut() {
            *last = 111.5;
        }
        let w = Window::new("FIB", Duration::days(1), bars_from(&closes, 2000.0)).unwrap();
        assert!(s.generate_signal(&w, &mut EvalContext::new()).unwrap().is_none());
    }

    #[test]
    fn breached_long_stop_exits_instead_of_adding() {
        let s = FibonacciStrategy::new(StrategyId(3), FibConfig::default());
        let w = retracement_to_golden_level(2000.0);
        let close = w.last().unwrap().close;
        let mut ctx = EvalContext::new();
        ctx.position = Some(OpenPosition::long(118.0).with_levels(close + 1.0, 130.0));
        let signal = s.generate_signal(&w, &mut ctx).unwrap().unwrap();
        assert_eq!(signal.action(), SignalAction::Sell);
        assert_eq!(signal.confidence(), 1.0);
        assert_eq!(signal.meta("entry_price"), Some(118.0));
    }

    #[test]
    fn long_exits_at_resistance_confluence() {
        let s = FibonacciStrategy::new(StrategyId(3), FibConfig::default());
        let w = retracement_to_golden_level(2000.0);
        let mut ctx = EvalContext::new();
        ctx.position = Some(OpenPosition::long(108.0).with_levels(100.0, 130.0));
        let signal = s.generate_signal(&w, &mut ctx).unwrap().unwrap();
        assert_eq!(signal.action(), SignalAction::Sell);
        assert_eq!(signal.confidence(), 0.8);
        assert_approx(signal.meta("exit_level").unwrap(), 99.8 + 0.618 * 20.9, 1e-9);
    }

    #[test]
    fn short_target_hit_is_covered() {
        let s = FibonacciStrategy::new(StrategyId(3), FibConfig::default());
        let w = retracement_to_golden_level(2000.0);
        let mut ctx = EvalContext::new();
        ctx.position = Some(OpenPosition::short(118.0).with_levels(125.0, 113.0));
        let signal = s.generate_signal(&w, &mut ctx).unwrap().unwrap();
        assert_eq!(signal.action(), SignalAction::Buy);
        assert_eq!(signal.confidence(), 1.0);
    }

    #[test]
    fn open_short_away_from_support_is_silent() {
        let s = FibonacciStrategy::new(StrategyId(3), FibConfig::default());
        let w = retracement_to_golden_level(2000.0);
        let mut ctx = EvalContext::new();
        ctx.position = Some(OpenPosition::short(118.0).with_levels(125.0, 100.0));
        assert!(s.generate_signal(&w, &mut ctx).unwrap().is_none());
    }

    #[test]
    fn opposite_level_sets() {
        let r = resistance_levels(100.0, 110.0);
        let s = support_levels(100.0, 110.0);
        assert_eq!(r.len(), 7);
        assert_eq!(s.len(), 3);
        assert!(s.iter().all(|l| *l < 105.0));
        assert!(r.iter().all(|l| *l > 105.0));
    }

    #[test]
    fn config_caps_confirmations() {
        use crate::config::StrategyKind;
        let c = StrategyConfig::new(3, StrategyKind::FibonacciConfluence)
            .with_param("min_confirmations", 5.0);
        assert!(FibConfig::from_config(&c).is_err());
    }
}
