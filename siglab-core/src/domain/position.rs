//! Caller-supplied view of an open position.
//!
//! Strategies keep no position state of their own. When the execution side
//! holds a position in an instrument it passes this snapshot in, and exit
//! rules (stop/target breach, Z-score reversion) are evaluated against it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: PositionSide,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl OpenPosition {
    pub fn long(entry_price: f64) -> Self {
        Self {
            side: PositionSide::Long,
            entry_price,
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn short(entry_price: f64) -> Self {
        Self {
            side: PositionSide::Short,
            entry_price,
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn with_levels(mut self, stop_loss: f64, take_profit: f64) -> Self {
        self.stop_loss = Some(stop_loss);
        self.take_profit = Some(take_profit);
        self
    }

    /// True if `price` has crossed the stop or the target.
    pub fn level_breached(&self, price: f64) -> bool {
        match self.side {
            PositionSide::Long => {
                self.stop_loss.is_some_and(|s| price <= s)
                    || self.take_profit.is_some_and(|t| price >= t)
            }
            PositionSide::Short => {
                self.stop_loss.is_some_and(|s| price >= s)
                    || self.take_profit.is_some_and(|t| price <= t)
            }
        }
    }
}
