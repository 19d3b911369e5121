//! Trend-filtered RSI mean reversion with ATR risk levels.
//!
//! Entry long: RSI below `oversold`, close above the long EMA (uptrend), and
//! volume at least `volume_factor` times its rolling average.
//! Entry short: RSI above `overbought`.
//! Confidence starts at 0.7 and grows to 0.9 with the depth of the RSI
//! extreme. Stops sit `stop_atr_multiplier` ATRs away, targets
//! `profit_atr_multiplier` ATRs away.
//!
//! With an open position the strategy only looks for the exit: the opposite
//! RSI extreme or a breached stop/target.

use crate::config::{ConfigError, StrategyConfig};
use crate::domain::{PositionSide, Signal, SignalAction, StrategyId, Window};
use crate::indicators::{Atr, Ema, Rsi, VolumeRatio};

use super::{EvalContext, StrategyError};

const BASE_CONFIDENCE: f64 = 0.7;
const DEPTH_CONFIDENCE: f64 = 0.2;
const BREACH_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, PartialEq)]
pub struct TrendConfig {
    pub rsi_period: usize,
    pub ema_period: usize,
    pub atr_period: usize,
    pub oversold: f64,
    pub overbought: f64,
    pub stop_atr_multiplier: f64,
    pub profit_atr_multiplier: f64,
    pub volume_period: usize,
    pub volume_factor: f64,
    /// Short-term EMAs reported in metadata only.
    pub ema_fast: usize,
    pub ema_slow: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_period: 200,
            atr_period: 14,
            oversold: 30.0,
            overbought: 70.0,
            stop_atr_multiplier: 1.5,
            profit_atr_multiplier: 2.0,
            volume_period: 20,
            volume_factor: 1.2,
            ema_fast: 12,
            ema_slow: 26,
        }
    }
}

impl TrendConfig {
    pub fn from_config(config: &StrategyConfig) -> Result<Self, ConfigError> {
        let d = Self::default();
        let oversold = config.param("oversold", d.oversold);
        let overbought = config.param("overbought", d.overbought);
        if !(0.0 < oversold && oversold < overbought && overbought < 100.0) {
            return Err(config.invalid(
                "oversold",
                oversold,
                "expected 0 < oversold < overbought < 100",
            ));
        }
        Ok(Self {
            rsi_period: config.param_usize("rsi_period", d.rsi_period)?,
            ema_period: config.param_usize("ema_period", d.ema_period)?,
            atr_period: config.param_usize("atr_period", d.atr_period)?,
            oversold,
            overbought,
            stop_atr_multiplier: config.param_positive("stop_atr_multiplier", d.stop_atr_multiplier)?,
            profit_atr_multiplier: config
                .param_positive("profit_atr_multiplier", d.profit_atr_multiplier)?,
            volume_period: config.param_usize("volume_period", d.volume_period)?,
            volume_factor: config.param_positive("volume_factor", d.volume_factor)?,
            ema_fast: config.param_usize("ema_fast", d.ema_fast)?,
            ema_slow: config.param_usize("ema_slow", d.ema_slow)?,
        })
    }
}

#[derive(Debug)]
pub struct TrendStrategy {
    id: StrategyId,
    config: TrendConfig,
    rsi: Rsi,
    ema: Ema,
    ema_fast: Ema,
    ema_slow: Ema,
    atr: Atr,
    volume: VolumeRatio,
}

impl TrendStrategy {
    pub fn new(id: StrategyId, config: TrendConfig) -> Self {
        Self {
            id,
            rsi: Rsi::new(config.rsi_period),
            ema: Ema::new(config.ema_period),
            ema_fast: Ema::new(config.ema_fast),
            ema_slow: Ema::new(config.ema_slow),
            atr: Atr::new(config.atr_period),
            volume: VolumeRatio::new(config.volume_period),
            config,
        }
    }

    pub fn id(&self) -> StrategyId {
        self.id
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    pub fn generate_signal(
        &self,
        window: &Window,
        ctx: &mut EvalContext,
    ) -> Result<Option<Signal>, StrategyError> {
        let cache = &mut ctx.features;
        // Trend filter first: the longest lookback decides sufficiency.
        let ema = cache.latest(window, &self.ema)?;
        let rsi = cache.latest(window, &self.rsi)?;
        let atr = cache.latest(window, &self.atr)?;
        let volume_ratio = cache.latest(window, &self.volume)?;
        let ema_fast = cache.latest(window, &self.ema_fast)?;
        let ema_slow = cache.latest(window, &self.ema_slow)?;
        let Some(bar) = window.last() else {
            return Ok(None);
        };
        let close = bar.close;
        let c = &self.config;

        let buy_depth = ((c.oversold - rsi) / c.oversold).clamp(0.0, 1.0);
        let sell_depth = ((rsi - c.overbought) / (100.0 - c.overbought)).clamp(0.0, 1.0);

        let decision = match ctx.position {
            Some(pos) => {
                let breached = pos.level_breached(close);
                match pos.side {
                    PositionSide::Long if breached => Some((SignalAction::Sell, BREACH_CONFIDENCE)),
                    PositionSide::Long if rsi > c.overbought => {
                        Some((SignalAction::Sell, BASE_CONFIDENCE + DEPTH_CONFIDENCE * sell_depth))
                    }
                    PositionSide::Short if breached => Some((SignalAction::Buy, BREACH_CONFIDENCE)),
                    PositionSide::Short if rsi < c.oversold => {
                        Some((SignalAction::Buy, BASE_CONFIDENCE + DEPTH_CONFIDENCE * buy_depth))
                    }
                    _ => None,
                }
            }
            None => {
                if rsi < c.oversold && close > ema && volume_ratio > c.volume_factor {
                    Some((SignalAction::Buy, BASE_CONFIDENCE + DEPTH_CONFIDENCE * buy_depth))
                } else if rsi > c.overbought {
                    Some((SignalAction::Sell, BASE_CONFIDENCE + DEPTH_CONFIDENCE * sell_depth))
                } else {
                    None
                }
            }
        };
        let Some((action, confidence)) = decision else {
            return Ok(None);
        };

        let stop = atr * c.stop_atr_multiplier;
        let target = atr * c.profit_atr_multiplier;
        let (stop_loss, take_profit) = match action {
            SignalAction::Buy => (close - stop, close + target),
            _ => (close + stop, close - target),
        };

        let signal = Signal::new(action, confidence, self.id, bar.timestamp)
            .with_levels(stop_loss, take_profit)
            .with_meta("rsi", rsi)
            .with_meta("ema", ema)
            .with_meta("ema_fast", ema_fast)
            .with_meta("ema_slow", ema_slow)
            .with_meta("atr", atr)
            .with_meta("volume_ratio", volume_ratio)
            .with_meta("exit", if ctx.position.is_some() { 1.0 } else { 0.0 });
        Ok(Some(signal))
    }
}
