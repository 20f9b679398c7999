//! Market-regime volatility gate
//!
//! Blocks new entries while a reference instrument (BTC, ETH) shows an
//! extreme hourly ATR. Shorting alt spikes during a market-wide squeeze is
//! how this strategy loses the most.

use crate::config::RiskConfig;
use crate::feed::Candle;
use crate::model::atr_percent;
use crate::okx::{OkxClient, OkxError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const ATR_BAR: &str = "1H";

/// Anything that can return recent candles, newest first
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn recent_candles(
        &self,
        inst_id: &str,
        bar: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, OkxError>;
}

#[async_trait]
impl CandleSource for OkxClient {
    async fn recent_candles(
        &self,
        inst_id: &str,
        bar: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, OkxError> {
        self.candles(inst_id, bar, limit).await
    }
}

/// Cached ATR check over the reference instruments
pub struct VolatilityGate {
    source: Arc<dyn CandleSource>,
    refs: Vec<String>,
    threshold_pct: f64,
    period: usize,
    ttl: Duration,
    cache: Mutex<Option<(Instant, Option<(String, f64)>)>>,
}

impl VolatilityGate {
    pub fn new(source: Arc<dyn CandleSource>, config: &RiskConfig) -> Self {
        Self {
            source,
            refs: config.volatility_refs.clone(),
            threshold_pct: config.atr_threshold_pct,
            period: config.atr_period.max(1),
            ttl: Duration::from_secs(config.regime_cache_secs),
            cache: Mutex::new(None),
        }
    }

    /// The first reference above the threshold, with its ATR%
    ///
    /// Fails open: a reference whose candles cannot be fetched counts as
    /// calm, and an incomplete reading is not cached.
    pub async fn extreme(&self) -> Option<(String, f64)> {
        let mut cache = self.cache.lock().await;
        if let Some((at, reading)) = cache.as_ref() {
            if at.elapsed() < self.ttl {
                return reading.clone();
            }
        }

        let mut complete = true;
        let mut reading = None;
        for symbol in &self.refs {
            match self
                .source
                .recent_candles(symbol, ATR_BAR, self.period + 1)
                .await
            {
                Ok(candles) => {
                    let atr = atr_percent(&candles, self.period);
                    tracing::debug!(symbol = %symbol, atr_pct = atr, "Reference ATR");
                    if atr > self.threshold_pct {
                        tracing::warn!(
                            symbol = %symbol,
                            atr_pct = atr,
                            threshold = self.threshold_pct,
                            "Extreme volatility, entries paused"
                        );
                        reading = Some((symbol.clone(), atr));
                        break;
                    }
                }
                Err(e) => {
                    complete = false;
                    tracing::error!(symbol = %symbol, error = %e, "ATR fetch failed, gate open");
                }
            }
        }

        if complete || reading.is_some() {
            *cache = Some((Instant::now(), reading.clone()));
        }
        reading
    }

    pub async fn is_extreme(&self) -> bool {
        self.extreme().await.is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Constant-range candles; ATR% = range / close * 100
    pub(crate) struct StaticCandles {
        close: f64,
        range: f64,
        fail: bool,
        pub(crate) calls: AtomicUsize,
    }

    impl StaticCandles {
        pub(crate) fn flat(close: f64, range: f64) -> Self {
            Self {
                close,
                range,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::flat(100.0, 1.0)
            }
        }
    }

    #[async_trait]
    impl CandleSource for StaticCandles {
        async fn recent_candles(
            &self,
            inst_id: &str,
            _bar: &str,
            limit: usize,
        ) -> Result<Vec<Candle>, OkxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(OkxError::EmptyResponse("/api/v5/market/candles".into()));
            }
            let d = |x: f64| Decimal::try_from(x).unwrap();
            let start = Utc.timestamp_opt(1_704_067_200, 0).unwrap();
            Ok((0..limit)
                .map(|i| Candle {
                    symbol: inst_id.to_string(),
                    ts: start - ChronoDuration::hours(i as i64),
                    open: d(self.close),
                    high: d(self.close + self.range / 2.0),
                    low: d(self.close - self.range / 2.0),
                    close: d(self.close),
                    volume: Decimal::ZERO,
                    confirmed: true,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_calm_market() {
        let gate = VolatilityGate::new(Arc::new(StaticCandles::flat(100.0, 1.0)), &RiskConfig::default());
        assert!(gate.extreme().await.is_none());
    }

    #[tokio::test]
    async fn test_extreme_market() {
        let gate = VolatilityGate::new(Arc::new(StaticCandles::flat(100.0, 8.0)), &RiskConfig::default());
        let (symbol, atr) = gate.extreme().await.unwrap();
        assert_eq!(symbol, "BTC-USDT-SWAP");
        assert!((atr - 8.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reading_is_cached() {
        let source = Arc::new(StaticCandles::flat(100.0, 1.0));
        let gate = VolatilityGate::new(source.clone(), &RiskConfig::default());
        gate.extreme().await;
        gate.extreme().await;
        // Two references, fetched once
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_open_and_retries() {
        let source = Arc::new(StaticCandles::failing());
        let gate = VolatilityGate::new(source.clone(), &RiskConfig::default());
        assert!(!gate.is_extreme().await);
        assert!(!gate.is_extreme().await);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }
}
