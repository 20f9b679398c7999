//! Market data collector

use super::CloseWindow;
use crate::feed::{Candle, CandleFeed};
use crate::telemetry::{set_gauge, GaugeMetric};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Keeps a rolling close window per subscribed symbol
///
/// Cloning is cheap and all clones share the same windows, so the feed task
/// and the strategy engine each hold one.
#[derive(Clone)]
pub struct MarketDataCollector {
    windows: Arc<RwLock<HashMap<String, CloseWindow>>>,
}

impl MarketDataCollector {
    /// Create a collector with an empty window for each symbol
    pub fn new(symbols: &[String], capacity: usize) -> Self {
        let windows = symbols
            .iter()
            .map(|s| (s.clone(), CloseWindow::new(capacity)))
            .collect::<HashMap<_, _>>();
        set_gauge(GaugeMetric::TrackedSymbols, windows.len() as f64);
        Self {
            windows: Arc::new(RwLock::new(windows)),
        }
    }

    /// Apply one candle; candles for unknown symbols are dropped
    pub async fn ingest(&self, candle: &Candle) -> bool {
        let mut windows = self.windows.write().await;
        match windows.get_mut(&candle.symbol) {
            Some(window) => window.record(candle.ts, candle.close),
            None => {
                tracing::trace!(symbol = %candle.symbol, "Candle for untracked symbol");
                false
            }
        }
    }

    /// Consume candles until the channel closes
    pub async fn run(&self, mut rx: mpsc::Receiver<Candle>) {
        let mut count: u64 = 0;
        while let Some(candle) = rx.recv().await {
            self.ingest(&candle).await;
            count += 1;
            if count % 10_000 == 0 {
                tracing::debug!(candles = count, "Collector progress");
            }
        }
        tracing::warn!(candles = count, "Candle stream ended");
    }

    /// Subscribe to the feed and collect until the stream ends
    pub async fn connect<F: CandleFeed + ?Sized>(&self, feed: &F) -> anyhow::Result<()> {
        let rx = feed.subscribe().await?;
        self.run(rx).await;
        Ok(())
    }

    /// Copy of every window
    pub async fn snapshot(&self) -> HashMap<String, CloseWindow> {
        self.windows.read().await.clone()
    }

    pub async fn window(&self, symbol: &str) -> Option<CloseWindow> {
        self.windows.read().await.get(symbol).cloned()
    }

    /// Most recent close seen for a symbol
    pub async fn latest_close(&self, symbol: &str) -> Option<Decimal> {
        self.windows.read().await.get(symbol).and_then(|w| w.last())
    }

    pub async fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<_> = self.windows.read().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}
