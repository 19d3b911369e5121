//! End-to-end scenarios: configuration to decision, model lifecycle,
//! persistence and concurrent model access.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use siglab_core::domain::{OpenPosition, PriceBar, SignalAction, StrategyId, Window};
use siglab_core::features::FeatureCache;
use siglab_core::rng::RngHierarchy;
use siglab_core::strategies::ml::{train_model, ModelLifecycle, ModelSlot, ModelState, TrainingParams};
use siglab_core::strategies::{EvalContext, MlEnsembleStrategy, TrainingError};
use siglab_core::{EngineConfig, SignalEngine, StrategyConfig, StrategyKind};

// ── Helpers ──────────────────────────────────────────────────────────

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "siglab_core=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

fn bars_at(start: DateTime<Utc>, closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                timestamp: start + Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

fn wavy_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + 8.0 * (i as f64 * 0.37).sin() + 3.0 * (i as f64 * 1.3).cos())
        .collect()
}

fn wavy_window(name: &str, start: DateTime<Utc>, n: usize) -> Window {
    Window::new(name, Duration::days(1), bars_at(start, &wavy_closes(n))).unwrap()
}

/// Long uptrend, then a sharp pullback closing on heavy volume.
fn pullback_window(name: &str) -> Window {
    let mut closes: Vec<f64> = (0..240).map(|i| 100.0 + i as f64).collect();
    let top = closes[239];
    closes.extend((1..=10).map(|i| top - 3.0 * i as f64));
    let mut bars = bars_at(base(), &closes);
    if let Some(last) = bars.last_mut() {
        last.volume = 1500.0;
    }
    Window::new(name, Duration::days(1), bars).unwrap()
}

fn small_ml(id: u32, min_samples: f64) -> MlEnsembleStrategy {
    let config = StrategyConfig::new(id, StrategyKind::MlEnsemble)
        .with_param("n_trees", 8.0)
        .with_param("forest_depth", 4.0)
        .with_param("n_stages", 10.0)
        .with_param("boost_depth", 3.0)
        .with_param("min_samples", min_samples);
    MlEnsembleStrategy::from_config(&config, 42).unwrap()
}

fn small_params() -> TrainingParams {
    TrainingParams {
        n_trees: 8,
        forest_depth: 4,
        n_stages: 10,
        boost_depth: 3,
        ..TrainingParams::default()
    }
}

fn trained_state(seed: u64) -> ModelState {
    let window = wavy_window("TRAIN", base(), 300);
    let fingerprint = StrategyConfig::new(9, StrategyKind::MlEnsemble).fingerprint();
    train_model(
        &window,
        &mut FeatureCache::new(),
        &small_params(),
        &RngHierarchy::new(seed),
        &fingerprint,
    )
    .unwrap()
}

// ── Configuration to decision ────────────────────────────────────────

const ENGINE_TOML: &str = r#"
timeframe_secs = 86400
seed = 42

[[strategies]]
id = 2
kind = "zscore_phi"

[[strategies]]
id = 1
kind = "trend_rsi_ema_atr"
params = { oversold = 30.0, overbought = 70.0 }
"#;

#[test]
fn engine_from_toml_buys_the_pullback() {
    init_logging();
    let config = EngineConfig::from_toml_str(ENGINE_TOML).unwrap();
    let engine = SignalEngine::new(config).unwrap();
    let report = engine.evaluate_cycle(&[pullback_window("SPY")], &BTreeMap::new());

    let spy = report.report("SPY").unwrap();
    assert!(spy.errors.is_empty());
    let decision = spy.decision.as_ref().unwrap();
    assert_eq!(decision.action(), SignalAction::Buy);
    assert!(spy
        .candidates
        .iter()
        .any(|s| s.strategy_id() == StrategyId(1) && s.action() == SignalAction::Buy));
    assert!(decision.stop_loss().unwrap() < 309.0);
    assert!(decision.take_profit().unwrap() > 309.0);
}

#[test]
fn open_long_is_closed_on_stop_breach() {
    let config = EngineConfig::from_toml_str(ENGINE_TOML).unwrap();
    let engine = SignalEngine::new(config).unwrap();
    let mut positions = BTreeMap::new();
    positions.insert("SPY".to_string(), OpenPosition::long(335.0).with_levels(320.0, 360.0));
    let report = engine.evaluate_cycle(&[pullback_window("SPY")], &positions);
    let decision = report.report("SPY").unwrap().decision.clone().unwrap();
    assert_eq!(decision.action(), SignalAction::Sell);
    assert_eq!(decision.strategy_id(), StrategyId(1));
    assert_eq!(decision.confidence(), 0.9);
}

#[test]
fn same_seed_gives_identical_cycles() {
    let config = EngineConfig {
        strategies: vec![
            StrategyConfig::new(1, StrategyKind::TrendRsiEmaAtr),
            StrategyConfig::new(2, StrategyKind::MlEnsemble)
                .with_param("n_trees", 6.0)
                .with_param("n_stages", 8.0),
        ],
        ..EngineConfig::default()
    };
    let windows = vec![
        wavy_window("AAA", base(), 300),
        pullback_window("BBB"),
    ];
    let a = SignalEngine::new(config.clone())
        .unwrap()
        .evaluate_cycle(&windows, &BTreeMap::new());
    let b = SignalEngine::new(config)
        .unwrap()
        .evaluate_cycle(&windows, &BTreeMap::new());
    assert_eq!(a, b);
    assert_eq!(a.instruments.len(), 2);
}

#[test]
fn cycle_scores_each_instrument_with_its_own_model() {
    let config = EngineConfig {
        strategies: vec![StrategyConfig::new(3, StrategyKind::MlEnsemble)
            .with_param("n_trees", 6.0)
            .with_param("n_stages", 8.0)],
        ..EngineConfig::default()
    };
    let rising: Vec<f64> = (0..300)
        .map(|i| 60.0 + 0.05 * i as f64 + 4.0 * (i as f64 * 0.23).sin())
        .collect();
    let aaa = wavy_window("AAA", base(), 300);
    let bbb = Window::new("BBB", Duration::days(1), bars_at(base(), &rising)).unwrap();

    let engine = SignalEngine::new(config.clone()).unwrap();
    let together = engine.evaluate_cycle(&[aaa.clone(), bbb.clone()], &BTreeMap::new());
    let ml = engine.strategy(StrategyId(3)).unwrap().as_ml().unwrap();
    assert_eq!(ml.trained_instruments(), vec!["AAA".to_string(), "BBB".to_string()]);

    for window in [aaa, bbb] {
        let alone = SignalEngine::new(config.clone())
            .unwrap()
            .evaluate_instrument(&window, None);
        let shared = together.report(window.instrument()).unwrap();
        assert!(shared.errors.is_empty());
        assert_eq!(shared.candidates, alone.candidates);
    }
}

// ── Model lifecycle ──────────────────────────────────────────────────

#[test]
fn failed_retrain_keeps_serving_previous_model() {
    init_logging();
    let history = wavy_window("ML", base(), 300);
    let trained = small_ml(1, 50.0);
    let state = trained.retrain(&history).unwrap();

    // Needs more clean samples than the new window can provide.
    let strict = small_ml(2, 500.0);
    let installed = strict.install_model((*state).clone());

    let later = wavy_window("ML", base() + Duration::days(400), 510);
    assert_eq!(strict.lifecycle(&later), ModelLifecycle::Stale { new_bars: 510 });

    let mut ctx = EvalContext::new();
    let signal = strict.generate_signal(&later, &mut ctx).unwrap().unwrap();
    assert_eq!(signal.strategy_id(), StrategyId(2));
    assert!(signal.meta("probability_up").is_some());

    assert_eq!(ctx.training_errors.len(), 1);
    let (id, err) = &ctx.training_errors[0];
    assert_eq!(*id, StrategyId(2));
    assert!(matches!(
        err,
        TrainingError::InsufficientSamples { available: 456, required: 500 }
    ));

    let served = strict.model("ML").unwrap();
    assert!(Arc::ptr_eq(&served, &installed));

    // The failed attempt counts: the same window does not retrain again.
    assert_eq!(strict.lifecycle(&later), ModelLifecycle::Trained);
    for _ in 0..2 {
        let mut again = EvalContext::new();
        assert!(strict.generate_signal(&later, &mut again).unwrap().is_some());
        assert!(again.training_errors.is_empty());
    }
    assert!(Arc::ptr_eq(&strict.model("ML").unwrap(), &installed));
}

#[test]
fn untrained_strategy_with_failed_training_reports_error() {
    let strict = small_ml(3, 400.0);
    let window = wavy_window("ML", base(), 300);
    let mut ctx = EvalContext::new();
    assert!(strict.generate_signal(&window, &mut ctx).is_err());
    assert!(strict.model("ML").is_none());
}

// ── Persistence ──────────────────────────────────────────────────────

#[test]
fn restored_model_scores_like_the_original() {
    let window = wavy_window("ML", base(), 300);
    let original = small_ml(1, 50.0);
    let state = original.retrain(&window).unwrap();

    let json = state.to_json().unwrap();
    let restored = ModelState::from_json(&json).unwrap();
    assert_eq!(&restored, state.as_ref());

    let copy = small_ml(1, 50.0);
    copy.install_model(restored);
    assert_eq!(copy.lifecycle(&window), ModelLifecycle::Trained);

    let a = original
        .generate_signal(&window, &mut EvalContext::new())
        .unwrap();
    let b = copy.generate_signal(&window, &mut EvalContext::new()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn top_features_are_sorted_by_importance() {
    let state = trained_state(42);
    let top = state.top_features(5);
    assert_eq!(top.len(), 5);
    assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
    let total: f64 = state.feature_importance().values().sum();
    assert!((total - 1.0).abs() < 1e-6);
}

// ── Concurrent model access ──────────────────────────────────────────

#[test]
fn readers_always_see_a_complete_model() {
    let first = trained_state(1);
    let second = trained_state(2);
    assert_ne!(first, second);

    let slot = ModelSlot::new();
    slot.publish(first.clone());
    assert_eq!(first.instrument(), "TRAIN");

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..50 {
                let next = if i % 2 == 0 { second.clone() } else { first.clone() };
                slot.publish(next);
            }
        });
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..200 {
                    let seen = slot.load("TRAIN").unwrap();
                    assert!(*seen == first || *seen == second);
                }
            });
        }
    });
}
