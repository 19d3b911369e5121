//! Domain types for the signal engine.

pub mod bar;
pub mod ids;
pub mod position;
pub mod signal;
pub mod window;

pub use bar::PriceBar;
pub use ids::{ConfigFingerprint, StrategyId, WindowHash};
pub use position::{OpenPosition, PositionSide};
pub use signal::{Signal, SignalAction};
pub use window::{DataQualityError, Window};

/// Instrument identifier (e.g. "BTCUSDT").
pub type Instrument = String;
