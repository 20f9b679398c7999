//! Integration tests for the candle feed and collector

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use perp_short::feed::{Candle, CandleFeed};
use perp_short::market::MarketDataCollector;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

/// Replays candles the way OKX pushes them: the forming bar repeatedly,
/// then the next minute
struct ReplayFeed {
    candles: Vec<Candle>,
}

#[async_trait]
impl CandleFeed for ReplayFeed {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<Candle>> {
        let (tx, rx) = mpsc::channel(16);
        let candles = self.candles.clone();
        tokio::spawn(async move {
            for candle in candles {
                if tx.send(candle).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

fn candle(symbol: &str, seconds: i64, close: Decimal) -> Candle {
    Candle {
        symbol: symbol.to_string(),
        ts: Utc.timestamp_opt(1_704_067_200, 0).unwrap() + Duration::seconds(seconds),
        open: close,
        high: close,
        low: close,
        close,
        volume: Decimal::ZERO,
        confirmed: false,
    }
}

#[tokio::test]
async fn test_collector_builds_windows_from_feed() {
    let mut candles = vec![];
    for minute in 0..8 {
        // three pushes per minute, last one wins
        for (k, delta) in [0, 1, 2].into_iter().enumerate() {
            candles.push(candle(
                "BTC-USDT-SWAP",
                minute * 60 + k as i64 * 20,
                Decimal::from(100 + minute * 10 + delta),
            ));
        }
        candles.push(candle("ETH-USDT-SWAP", minute * 60, dec!(2000)));
    }

    let collector = MarketDataCollector::new(&["BTC-USDT-SWAP".to_string()], 6);
    collector.connect(&ReplayFeed { candles }).await.unwrap();

    let snapshot = collector.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    let window = &snapshot["BTC-USDT-SWAP"];
    assert!(window.is_full());
    assert_eq!(window.len(), 6);
    // minutes 2..=7, closes 122..=172
    assert_eq!(window.first(), Some(dec!(122)));
    assert_eq!(window.last(), Some(dec!(172)));
    assert_eq!(window.window_return(), Some(dec!(50) / dec!(122)));
}
