//! Feature vectors and per-cycle indicator memoization.
//!
//! `FeatureCache` is created for one evaluation cycle of one instrument and
//! dropped at the end of it. Series are keyed by `(window content hash,
//! indicator name)`, so several strategies asking for `rsi_14` on the same
//! window compute it once, while a different window (e.g. a truncated one used
//! for training) can never read a stale series.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{Window, WindowHash};
use crate::indicators::{ensure_len, last_finite, FeatureError, Indicator};

/// Named scalar readings derived from one window. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: BTreeMap<String, f64>,
}

impl FeatureVector {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, f64)> for FeatureVector {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Per-cycle memo of indicator series.
#[derive(Debug, Default)]
pub struct FeatureCache {
    series: HashMap<(WindowHash, String), Arc<Vec<f64>>>,
    hits: usize,
    misses: usize,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full indicator series over the window, computed at most once per cycle.
    pub fn series(&mut self, window: &Window, indicator: &dyn Indicator) -> Arc<Vec<f64>> {
        let key = (window.content_hash(), indicator.name().to_string());
        if let Some(s) = self.series.get(&key) {
            self.hits += 1;
            return Arc::clone(s);
        }
        self.misses += 1;
        let computed = Arc::new(indicator.compute(window.bars()));
        self.series.insert(key, Arc::clone(&computed));
        computed
    }

    /// Reading at the newest bar.
    pub fn latest(&mut self, window: &Window, indicator: &dyn Indicator) -> Result<f64, FeatureError> {
        ensure_len(indicator, window.len())?;
        let series = self.series(window, indicator);
        last_finite(indicator.name(), &series)
    }

    /// Reading `back` bars before the newest one (0 = newest).
    pub fn at_offset(
        &mut self,
        window: &Window,
        indicator: &dyn Indicator,
        back: usize,
    ) -> Result<f64, FeatureError> {
        ensure_len(indicator, window.len().saturating_sub(back))?;
        let series = self.series(window, indicator);
        let idx = series.len() - 1 - back;
        last_finite(indicator.name(), &series[..=idx])
    }

    /// Latest readings of a set of indicators as one feature vector.
    pub fn snapshot(
        &mut self,
        window: &Window,
        indicators: &[&dyn Indicator],
    ) -> Result<FeatureVector, FeatureError> {
        indicators
            .iter()
            .map(|ind| Ok((ind.name().to_string(), self.latest(window, *ind)?)))
            .collect()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
