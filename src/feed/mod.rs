//! Candle feed module
//!
//! Streams 1-minute candles for the discovered swaps from the OKX WebSocket

mod okx;
mod types;

pub use okx::OkxCandleFeed;
pub use types::Candle;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for candle feed implementations
#[async_trait]
pub trait CandleFeed: Send + Sync {
    /// Subscribe to candle updates
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<Candle>>;
}
