//! Market data module
//!
//! Discovers tradable swaps and keeps a rolling window of 1-minute closes
//! for each of them

mod collector;
mod discovery;
mod window;

pub use collector::MarketDataCollector;
pub use discovery::{discover_perps, filter_instruments};
pub use window::CloseWindow;
