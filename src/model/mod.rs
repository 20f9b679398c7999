//! Statistical models
//!
//! Streaming return statistics for anomaly detection and ATR for the
//! volatility gate

mod atr;
mod stats;

pub use atr::atr_percent;
pub use stats::{RunningStats, StatsModel};
