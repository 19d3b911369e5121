//! SigLab Core: signal generation for trading instruments.
//!
//! This crate turns price windows into one trading decision per instrument:
//! - Domain types (bars, validated windows, signals, open positions)
//! - Feature library of technical indicators with per-cycle memoization
//! - Four strategy variants: trend RSI/EMA/ATR, Z-score φ bands,
//!   Fibonacci confluence, and an ML forest + boosting ensemble
//! - Signal aggregation and the parallel per-cycle engine
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod aggregator;
pub mod config;
pub mod domain;
pub mod engine;
pub mod features;
pub mod indicators;
pub mod rng;
pub mod strategies;

pub use aggregator::{aggregate, aggregate_cycle, rank_instruments};
pub use config::{ConfigError, EngineConfig, StrategyConfig, StrategyKind};
pub use engine::{CycleReport, InstrumentReport, SignalEngine};
