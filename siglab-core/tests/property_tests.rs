//! Property tests for feature library and strategy invariants.
//!
//! Uses proptest to verify:
//! 1. Indicator shape: output length equals input, warmup is NaN
//! 2. Bounded oscillators stay inside their ranges
//! 3. Window construction yields sane bars or a data-quality error
//! 4. Signal confidence is always inside [0, 1]
//! 5. Trend entries carry confidence in [0.7, 0.9]

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use siglab_core::domain::{PriceBar, Signal, SignalAction, StrategyId, Window};
use siglab_core::indicators::*;
use siglab_core::strategies::{EvalContext, TrendConfig, TrendStrategy};

// ── Strategies (proptest) ────────────────────────────────────────────

/// Random walk closes, strictly positive.
fn arb_closes(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-3.0..3.0_f64, min_len..max_len).prop_map(|steps| {
        let mut price = 100.0;
        steps
            .into_iter()
            .map(|s| {
                price = (price + s).max(5.0);
                price
            })
            .collect()
    })
}

fn arb_volumes(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(100.0..5000.0_f64, len)
}

fn bars_from(closes: &[f64], volumes: &[f64]) -> Vec<PriceBar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                timestamp: base + Duration::days(i as i64),
                open,
                high: open.max(close) + 0.5,
                low: (open.min(close) - 0.5).max(0.1),
                close,
                volume: volumes.get(i).copied().unwrap_or(1000.0),
            }
        })
        .collect()
}

// ── 1. Indicator shape ───────────────────────────────────────────────

proptest! {
    #[test]
    fn output_length_matches_input(closes in arb_closes(1, 120)) {
        let bars = bars_from(&closes, &[]);
        let indicators: Vec<Box<dyn Indicator>> = vec![
            Box::new(Sma::new(10)),
            Box::new(Ema::new(10)),
            Box::new(Rsi::new(14)),
            Box::new(Atr::new(14)),
            Box::new(Adx::new(7)),
            Box::new(Macd::standard(MacdLine::Histogram)),
            Box::new(Cci::new(20)),
            Box::new(ZScore::new(21)),
        ];
        for ind in &indicators {
            let out = ind.compute(&bars);
            prop_assert_eq!(out.len(), bars.len(), "{}", ind.name());
            let warm = ind.lookback().min(out.len());
            prop_assert!(out[..warm].iter().all(|v| v.is_nan()), "{}", ind.name());
        }
    }

    #[test]
    fn latest_never_returns_nan(closes in arb_closes(1, 80)) {
        let bars = bars_from(&closes, &[]);
        let rsi = Rsi::new(14);
        match rsi.latest(&bars) {
            Ok(v) => prop_assert!(v.is_finite()),
            Err(FeatureError::InsufficientData { required, available, .. }) => {
                prop_assert_eq!(required, 15);
                prop_assert_eq!(available, bars.len());
            }
            Err(e) => prop_assert!(false, "unexpected error {e}"),
        }
    }
}

// ── 2. Bounded oscillators ───────────────────────────────────────────

proptest! {
    #[test]
    fn oscillators_stay_in_range(closes in arb_closes(40, 160)) {
        let bars = bars_from(&closes, &[]);
        let in_range = |values: Vec<f64>, lo: f64, hi: f64| {
            values.iter().filter(|v| v.is_finite()).all(|v| (lo..=hi).contains(v))
        };
        prop_assert!(in_range(Rsi::new(14).compute(&bars), 0.0, 100.0));
        prop_assert!(in_range(Stochastic::new(14, 3, StochLine::K).compute(&bars), 0.0, 100.0));
        prop_assert!(in_range(Stochastic::new(14, 3, StochLine::D).compute(&bars), 0.0, 100.0));
        prop_assert!(in_range(WilliamsR::new(14).compute(&bars), -100.0, 0.0));
        prop_assert!(in_range(Adx::new(14).compute(&bars), 0.0, 100.0));
    }

    #[test]
    fn volume_ratio_is_positive(
        closes in arb_closes(30, 31),
        volumes in arb_volumes(30),
    ) {
        let bars = bars_from(&closes, &volumes);
        let ratio = VolumeRatio::new(20).compute(&bars);
        prop_assert!(ratio.iter().filter(|v| v.is_finite()).all(|v| *v > 0.0));
    }
}

// ── 3. Window sanitization ───────────────────────────────────────────

fn arb_raw_bar() -> impl Strategy<Value = (f64, f64, f64, f64, f64, bool)> {
    (
        1.0..500.0_f64,
        1.0..500.0_f64,
        1.0..500.0_f64,
        1.0..500.0_f64,
        0.0..10_000.0_f64,
        prop::bool::weighted(0.1),
    )
}

proptest! {
    /// Whatever the feed sends, a window either builds with sane bars or
    /// reports a data-quality error.
    #[test]
    fn window_bars_are_sane_or_rejected(raw in prop::collection::vec(arb_raw_bar(), 1..60)) {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars: Vec<PriceBar> = raw
            .iter()
            .enumerate()
            .map(|(i, &(o, h, l, c, v, corrupt))| PriceBar {
                timestamp: base + Duration::hours(i as i64),
                open: o,
                high: h,
                low: l,
                close: if corrupt { f64::NAN } else { c },
                volume: v,
            })
            .collect();
        let first_corrupt = raw[0].5;
        match Window::new("PROP", Duration::hours(1), bars) {
            Ok(w) => {
                prop_assert!(!first_corrupt);
                prop_assert_eq!(w.len(), raw.len());
                prop_assert!(w.bars().iter().all(PriceBar::is_sane));
                prop_assert!(!w.has_gaps());
            }
            Err(_) => prop_assert!(first_corrupt),
        }
    }
}

// ── 4. Signal confidence ─────────────────────────────────────────────

proptest! {
    #[test]
    fn confidence_is_clamped(raw in prop::num::f64::ANY) {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let s = Signal::new(SignalAction::Buy, raw, StrategyId(1), ts);
        prop_assert!((0.0..=1.0).contains(&s.confidence()));
    }
}

// ── 5. Trend entry confidence ────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn trend_entry_confidence_is_bounded(
        closes in arb_closes(210, 260),
        volumes in arb_volumes(260),
    ) {
        let bars = bars_from(&closes, &volumes);
        let window = Window::new("TREND", Duration::days(1), bars).unwrap();
        let strategy = TrendStrategy::new(StrategyId(1), TrendConfig::default());
        let mut ctx = EvalContext::new();
        if let Some(signal) = strategy.generate_signal(&window, &mut ctx).unwrap() {
            prop_assert!(signal.is_directional());
            prop_assert!((0.7..=0.9).contains(&signal.confidence()));
            let close = window.last().unwrap().close;
            match signal.action() {
                SignalAction::Buy => prop_assert!(signal.stop_loss().unwrap() < close),
                _ => prop_assert!(signal.stop_loss().unwrap() > close),
            }
        }
    }
}
