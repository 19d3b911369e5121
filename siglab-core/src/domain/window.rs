//! Window: the time-ordered bar history for one instrument and timeframe.
//!
//! Construction validates and sanitizes the raw feed:
//! - timestamps must be strictly increasing (otherwise the window is rejected)
//! - negative prices or volume are rejected
//! - non-finite fields are forward-filled from the previous bar
//! - high/low are widened to cover open and close
//! - gaps larger than the timeframe are flagged, not rejected

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::bar::PriceBar;
use super::ids::WindowHash;

/// Data problems found while building or extending a window.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataQualityError {
    #[error("window for {instrument} contains no bars")]
    Empty { instrument: String },
    #[error("bar {index} of {instrument} has non-finite fields and nothing to fill from")]
    NonFinite { instrument: String, index: usize },
    #[error("bar {index} of {instrument} is not after the previous bar")]
    OutOfOrder { instrument: String, index: usize },
    #[error("bar {index} of {instrument} has a non-positive price")]
    NegativePrice { instrument: String, index: usize },
    #[error("bar {index} of {instrument} has negative volume")]
    NegativeVolume { instrument: String, index: usize },
}

/// Validated, time-ascending bar sequence for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    instrument: String,
    timeframe_secs: i64,
    capacity: Option<usize>,
    bars: Vec<PriceBar>,
    /// Indices of bars that follow a gap larger than the timeframe.
    gaps: Vec<usize>,
    /// Indices of bars that were repaired during validation.
    sanitized: Vec<usize>,
    hash: WindowHash,
}

impl Window {
    /// Build a growing window from raw feed bars.
    pub fn new(
        instrument: impl Into<String>,
        timeframe: Duration,
        bars: Vec<PriceBar>,
    ) -> Result<Self, DataQualityError> {
        let mut window = Self {
            instrument: instrument.into(),
            timeframe_secs: timeframe.num_seconds(),
            capacity: None,
            bars: Vec::with_capacity(bars.len()),
            gaps: Vec::new(),
            sanitized: Vec::new(),
            hash: WindowHash([0; 32]),
        };
        if bars.is_empty() {
            return Err(DataQualityError::Empty {
                instrument: window.instrument,
            });
        }
        for bar in bars {
            window.append(bar)?;
        }
        window.rehash();
        Ok(window)
    }

    /// Build a fixed-capacity window that keeps only the newest `capacity` bars.
    pub fn with_capacity(
        instrument: impl Into<String>,
        timeframe: Duration,
        capacity: usize,
        bars: Vec<PriceBar>,
    ) -> Result<Self, DataQualityError> {
        let mut window = Self::new(instrument, timeframe, bars)?;
        window.capacity = Some(capacity.max(1));
        window.evict();
        window.rehash();
        Ok(window)
    }

    /// Append a new bar from the feed, evicting the oldest when at capacity.
    pub fn push(&mut self, bar: PriceBar) -> Result<(), DataQualityError> {
        self.append(bar)?;
        self.evict();
        self.rehash();
        Ok(())
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn timeframe(&self) -> Duration {
        Duration::seconds(self.timeframe_secs)
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn gaps(&self) -> &[usize] {
        &self.gaps
    }

    pub fn sanitized(&self) -> &[usize] {
        &self.sanitized
    }

    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }

    /// Content hash of the bars, used to key per-cycle indicator memoization.
    pub fn content_hash(&self) -> WindowHash {
        self.hash
    }

    /// Copy of the first `len` bars as a new window.
    pub fn truncated(&self, len: usize) -> Self {
        let len = len.min(self.bars.len());
        let mut window = Self {
            instrument: self.instrument.clone(),
            timeframe_secs: self.timeframe_secs,
            capacity: self.capacity,
            bars: self.bars[..len].to_vec(),
            gaps: self.gaps.iter().copied().filter(|&i| i < len).collect(),
            sanitized: self.sanitized.iter().copied().filter(|&i| i < len).collect(),
            hash: WindowHash([0; 32]),
        };
        window.rehash();
        window
    }

    fn append(&mut self, raw: PriceBar) -> Result<(), DataQualityError> {
        let index = self.bars.len();
        let mut bar = raw;
        let mut repaired = false;

        if !bar.is_finite() {
            let Some(prev) = self.bars.last() else {
                return Err(DataQualityError::NonFinite {
                    instrument: self.instrument.clone(),
                    index,
                });
            };
            fill_non_finite(&mut bar, prev);
            repaired = true;
        }

        if bar.open <= 0.0 || bar.high <= 0.0 || bar.low <= 0.0 || bar.close <= 0.0 {
            return Err(DataQualityError::NegativePrice {
                instrument: self.instrument.clone(),
                index,
            });
        }
        if bar.volume < 0.0 {
            return Err(DataQualityError::NegativeVolume {
                instrument: self.instrument.clone(),
                index,
            });
        }

        let top = bar.open.max(bar.high).max(bar.low).max(bar.close);
        let bottom = bar.open.min(bar.high).min(bar.low).min(bar.close);
        if top != bar.high || bottom != bar.low {
            bar.high = top;
            bar.low = bottom;
            repaired = true;
        }

        if let Some(prev) = self.bars.last() {
            if bar.timestamp <= prev.timestamp {
                return Err(DataQualityError::OutOfOrder {
                    instrument: self.instrument.clone(),
                    index,
                });
            }
            let step = (bar.timestamp - prev.timestamp).num_seconds();
            if self.timeframe_secs > 0 && step > self.timeframe_secs {
                self.gaps.push(index);
            }
        }

        if repaired {
            warn!(instrument = %self.instrument, index, "sanitized malformed bar");
            self.sanitized.push(index);
        }
        self.bars.push(bar);
        Ok(())
    }

    fn evict(&mut self) {
        let Some(cap) = self.capacity else { return };
        if self.bars.len() <= cap {
            return;
        }
        let excess = self.bars.len() - cap;
        self.bars.drain(..excess);
        let shift = |v: &mut Vec<usize>| {
            *v = v
                .iter()
                .filter(|&&i| i >= excess)
                .map(|&i| i - excess)
                .collect();
        };
        shift(&mut self.gaps);
        shift(&mut self.sanitized);
    }

    fn rehash(&mut self) {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.instrument.as_bytes());
        hasher.update(&self.timeframe_secs.to_le_bytes());
        for bar in &self.bars {
            bar.hash_into(&mut hasher);
        }
        self.hash = WindowHash(*hasher.finalize().as_bytes());
    }
}

fn fill_non_finite(bar: &mut PriceBar, prev: &PriceBar) {
    let fill = |v: &mut f64, fallback: f64| {
        if !v.is_finite() {
            *v = fallback;
        }
    };
    fill(&mut bar.close, prev.close);
    let close = bar.close;
    fill(&mut bar.open, close);
    fill(&mut bar.high, close);
    fill(&mut bar.low, close);
    fill(&mut bar.volume, 0.0);
}
