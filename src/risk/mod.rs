//! Risk management module
//!
//! Position book, entry limits, drawdown stop and the volatility gate

mod limits;
mod position;
mod types;
mod volatility;

pub use limits::{DrawdownMonitor, RiskLimits};
pub use position::{BookStats, ClosedTrade, Leg, PositionBook, ReconcileReport, ShortPosition};
pub use types::RiskError;
pub use volatility::{CandleSource, VolatilityGate};
