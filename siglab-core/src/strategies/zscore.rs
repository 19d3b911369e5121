//! Z-score mean reversion with golden-ratio bands.
//!
//! Enter long when the close sits more than φ standard deviations below its
//! rolling mean and short-term momentum is not still rising against the
//! trade; the mirror image for shorts. Exit once the Z-score has come back
//! inside 1/φ of zero (or overshot through it), or momentum turns hard
//! against the position.
//!
//! Thin markets are ignored: below `min_volume_ratio` the strategy has no
//! view at all, and entries additionally need above-average volume and a
//! minimum coefficient of variation.

use crate::config::{ConfigError, StrategyConfig};
use crate::domain::{PositionSide, Signal, SignalAction, StrategyId, Window};
use crate::indicators::{Momentum, Sma, StdDev, VolumeRatio, ZScore};

use super::{EvalContext, StrategyError};

/// Entry band, compared exactly.
pub const PHI: f64 = 1.618;
/// Exit band, compared exactly.
pub const INV_PHI: f64 = 0.618;

const EXIT_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct ZScoreConfig {
    pub lookback: usize,
    pub momentum_period: usize,
    /// Minimum rolling std / rolling mean for an entry.
    pub min_volatility: f64,
    pub min_volume_ratio: f64,
    pub entry_volume_ratio: f64,
    /// Momentum against an open position that forces an exit.
    pub exit_momentum: f64,
}

impl Default for ZScoreConfig {
    fn default() -> Self {
        Self {
            lookback: 21,
            momentum_period: 5,
            min_volatility: 0.01,
            min_volume_ratio: 0.8,
            entry_volume_ratio: 1.0,
            exit_momentum: 0.02,
        }
    }
}

impl ZScoreConfig {
    pub fn from_config(config: &StrategyConfig) -> Result<Self, ConfigError> {
        let d = Self::default();
        let lookback = config.param_usize("lookback", d.lookback)?;
        if lookback < 2 {
            return Err(config.invalid("lookback", lookback as f64, "expected at least 2"));
        }
        Ok(Self {
            lookback,
            momentum_period: config.param_usize("momentum_period", d.momentum_period)?,
            min_volatility: config.param_fraction("min_volatility", d.min_volatility)?,
            min_volume_ratio: config.param_positive("min_volume_ratio", d.min_volume_ratio)?,
            entry_volume_ratio: config.param_positive("entry_volume_ratio", d.entry_volume_ratio)?,
            exit_momentum: config.param_positive("exit_momentum", d.exit_momentum)?,
        })
    }
}

#[derive(Debug)]
pub struct ZScoreStrategy {
    id: StrategyId,
    config: ZScoreConfig,
    zscore: ZScore,
    mean: Sma,
    std: StdDev,
    momentum: Momentum,
    volume: VolumeRatio,
}

impl ZScoreStrategy {
    pub fn new(id: StrategyId, config: ZScoreConfig) -> Self {
        Self {
            id,
            zscore: ZScore::new(config.lookback),
            mean: Sma::new(config.lookback),
            std: StdDev::new(config.lookback),
            momentum: Momentum::new(config.momentum_period),
            volume: VolumeRatio::new(config.lookback),
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
        let cache = &mut ctx.features;
        let z = cache.latest(window, &self.zscore)?;
        let mean = cache.latest(window, &self.mean)?;
        let std = cache.latest(window, &self.std)?;
        let momentum = cache.latest(window, &self.momentum)?;
        let volume_ratio = cache.latest(window, &self.volume)?;
        let Some(bar) = window.last() else {
            return Ok(None);
        };
        let c = &self.config;

        if volume_ratio < c.min_volume_ratio {
            return Ok(None);
        }
        let volatility = if mean > 0.0 { std / mean } else { 0.0 };

        let decision = match ctx.position {
            Some(pos) => match pos.side {
                PositionSide::Long if z > -INV_PHI || momentum < -c.exit_momentum => {
                    Some((SignalAction::Sell, EXIT_CONFIDENCE, None))
                }
                PositionSide::Short if z < INV_PHI || momentum > c.exit_momentum => {
                    Some((SignalAction::Buy, EXIT_CONFIDENCE, None))
                }
                _ => None,
            },
            None => {
                let tradable = volatility > c.min_volatility && volume_ratio > c.entry_volume_ratio;
                let confidence = (z.abs() / (2.0 * PHI)).min(1.0);
                // Stop a further 1/φ std beyond the entry, target the mean.
                if tradable && z < -PHI && momentum <= 0.0 {
                    let levels = (bar.close - INV_PHI * std, mean);
                    Some((SignalAction::Buy, confidence, Some(levels)))
                } else if tradable && z > PHI && momentum >= 0.0 {
                    let levels = (bar.close + INV_PHI * std, mean);
                    Some((SignalAction::Sell, confidence, Some(levels)))
                } else {
                    None
                }
            }
        };
        let Some((action, confidence, levels)) = decision else {
            return Ok(None);
        };

        let mut signal = Signal::new(action, confidence, self.id, bar.timestamp)
            .with_meta("zscore", z)
            .with_meta("mean", mean)
            .with_meta("std", std)
            .with_meta("momentum", momentum)
            .with_meta("volatility", volatility)
            .with_meta("volume_ratio", volume_ratio);
        if let Some((stop_loss, take_profit)) = levels {
            signal = signal.with_levels(stop_loss, take_profit);
        }
        Ok(Some(signal))
    }
}
