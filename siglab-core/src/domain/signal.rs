//! Signal: the output of one strategy invocation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::StrategyId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn is_directional(self) -> bool {
        !matches!(self, SignalAction::Hold)
    }
}

/// A scored trade decision produced by exactly one strategy.
///
/// Confidence is clamped into [0, 1] on construction and cannot be changed
/// afterwards. `Signal` is consumed by the aggregator and by the external
/// execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    action: SignalAction,
    confidence: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    strategy_id: StrategyId,
    /// Timestamp of the bar the signal was evaluated on.
    timestamp: DateTime<Utc>,
    /// Supporting values (indicator readings, thresholds, probabilities).
    metadata: BTreeMap<String, f64>,
}

impl Signal {
    pub fn new(
        action: SignalAction,
        confidence: f64,
        strategy_id: StrategyId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            action,
            confidence: clamp_confidence(confidence),
            stop_loss: None,
            take_profit: None,
            strategy_id,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach stop-loss and take-profit levels. Non-finite levels are dropped.
    pub fn with_levels(mut self, stop_loss: f64, take_profit: f64) -> Self {
        self.stop_loss = stop_loss.is_finite().then_some(stop_loss);
        self.take_profit = take_profit.is_finite().then_some(take_profit);
        self
    }

    /// Attach a metadata entry. Non-finite values are not recorded.
    pub fn with_meta(mut self, key: impl Into<String>, value: f64) -> Self {
        if value.is_finite() {
            self.metadata.insert(key.into(), value);
        }
        self
    }

    pub fn action(&self) -> SignalAction {
        self.action
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn stop_loss(&self) -> Option<f64> {
        self.stop_loss
    }

    pub fn take_profit(&self) -> Option<f64> {
        self.take_profit
    }

    pub fn strategy_id(&self) -> StrategyId {
        self.strategy_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> &BTreeMap<String, f64> {
        &self.metadata
    }

    pub fn meta(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).copied()
    }

    pub fn is_directional(&self) -> bool {
        self.action.is_directional()
    }
}

fn clamp_confidence(c: f64) -> f64 {
    if c.is_nan() {
        0.0
    } else {
        c.clamp(0.0, 1.0)
    }
}
