//! Short strategy
//!
//! Shorts anomalous 5-minute spikes on USDT perpetuals, scales in as price
//! keeps rising and exits through a trailing take-profit

mod detector;
mod engine;

pub use detector::{decide, Decision, DecisionParams};
pub use engine::{ShortStrategyEngine, TickSummary};
