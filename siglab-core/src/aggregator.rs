//! Signal aggregation: one decision per instrument per cycle.
//!
//! Directional signals (buy/sell) always beat hold. Among the remaining
//! candidates the highest confidence wins, and an exact confidence tie goes
//! to the lower strategy id. The result does not depend on the order the
//! candidates arrive in.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::domain::{Instrument, Signal};

fn rank(a: &Signal, b: &Signal) -> Ordering {
    a.is_directional()
        .cmp(&b.is_directional())
        .then_with(|| a.confidence().total_cmp(&b.confidence()))
        // Lower id ranks higher.
        .then_with(|| b.strategy_id().cmp(&a.strategy_id()))
}

/// Pick the winning signal among one instrument's candidates.
pub fn aggregate(candidates: &[Signal]) -> Option<&Signal> {
    candidates.iter().max_by(|a, b| rank(a, b))
}

/// Aggregate every instrument's candidates.
pub fn aggregate_cycle(
    candidates: &BTreeMap<Instrument, Vec<Signal>>,
) -> BTreeMap<Instrument, Signal> {
    candidates
        .iter()
        .filter_map(|(instrument, signals)| {
            aggregate(signals).map(|s| (instrument.clone(), s.clone()))
        })
        .collect()
}

/// Instruments ordered for presentation: directional decisions first, then
/// by descending confidence, then by name.
pub fn rank_instruments(decisions: &BTreeMap<Instrument, Signal>) -> Vec<(&str, &Signal)> {
    let mut ranked: Vec<(&str, &Signal)> = decisions
        .iter()
        .map(|(k, v)| (k.as_str(), v))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.is_directional()
            .cmp(&a.1.is_directional())
            .then_with(|| b.1.confidence().total_cmp(&a.1.confidence()))
            .then_with(|| a.0.cmp(b.0))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SignalAction, StrategyId};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn sig(action: SignalAction, confidence: f64, id: u32) -> Signal {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        Signal::new(action, confidence, StrategyId(id), ts)
    }

    #[test]
    fn empty_has_no_decision() {
        assert!(aggregate(&[]).is_none());
    }

    #[test]
    fn directional_beats_more_confident_hold() {
        let c = [
            sig(SignalAction::Hold, 0.95, 1),
            sig(SignalAction::Sell, 0.55, 2),
        ];
        assert_eq!(aggregate(&c).unwrap().action(), SignalAction::Sell);
    }

    #[test]
    fn highest_confidence_wins() {
        let c = [
            sig(SignalAction::Buy, 0.7, 1),
            sig(SignalAction::Sell, 0.8, 2),
            sig(SignalAction::Buy, 0.6, 3),
        ];
        assert_eq!(aggregate(&c).unwrap().strategy_id(), StrategyId(2));
    }

    #[test]
    fn tie_goes_to_lower_id() {
        let c = [
            sig(SignalAction::Sell, 0.8, 5),
            sig(SignalAction::Buy, 0.8, 2),
            sig(SignalAction::Buy, 0.8, 9),
        ];
        assert_eq!(aggregate(&c).unwrap().strategy_id(), StrategyId(2));
    }

    #[test]
    fn only_holds_returns_best_hold() {
        let c = [sig(SignalAction::Hold, 0.5, 1), sig(SignalAction::Hold, 0.6, 2)];
        let best = aggregate(&c).unwrap();
        assert_eq!(best.action(), SignalAction::Hold);
        assert_eq!(best.strategy_id(), StrategyId(2));
    }

    #[test]
    fn cycle_skips_instruments_without_candidates() {
        let mut m = BTreeMap::new();
        m.insert("AAA".to_string(), vec![sig(SignalAction::Buy, 0.7, 1)]);
        m.insert("BBB".to_string(), vec![]);
        let out = aggregate_cycle(&m);
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("AAA"));
    }

    #[test]
    fn ranking_puts_directional_and_confident_first() {
        let mut m = BTreeMap::new();
        m.insert("AAA".to_string(), sig(SignalAction::Hold, 0.9, 1));
        m.insert("BBB".to_string(), sig(SignalAction::Buy, 0.6, 1));
        m.insert("CCC".to_string(), sig(SignalAction::Sell, 0.8, 1));
        m.insert("DDD".to_string(), sig(SignalAction::Buy, 0.8, 1));
        let names: Vec<&str> = rank_instruments(&m).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["CCC", "DDD", "BBB", "AAA"]);
    }

    fn action_strategy() -> impl Strategy<Value = SignalAction> {
        prop_oneof![
            Just(SignalAction::Buy),
            Just(SignalAction::Sell),
            Just(SignalAction::Hold)
        ]
    }

    proptest! {
        #[test]
        fn winner_is_order_independent(
            raw in prop::collection::vec((action_strategy(), 0.0f64..=1.0), 1..12),
            rotate in 0usize..12,
        ) {
            let signals: Vec<Signal> = raw
                .iter()
                .enumerate()
                .map(|(i, (a, c))| sig(*a, *c, i as u32))
                .collect();
            let mut shuffled = signals.clone();
            let k = rotate % shuffled.len();
            shuffled.rotate_left(k);
            shuffled.reverse();
            prop_assert_eq!(aggregate(&signals), aggregate(&shuffled));
        }

        #[test]
        fn winner_dominates_every_candidate(
            raw in prop::collection::vec((action_strategy(), 0.0f64..=1.0), 1..12),
        ) {
            let signals: Vec<Signal> = raw
                .iter()
                .enumerate()
                .map(|(i, (a, c))| sig(*a, *c, i as u32))
                .collect();
            let best = aggregate(&signals).unwrap();
            for s in &signals {
                if s.is_directional() == best.is_directional() {
                    prop_assert!(best.confidence() >= s.confidence());
                } else {
                    prop_assert!(best.is_directional());
                }
            }
        }
    }
}
