//! Strategy engine
//!
//! Polls the collector once per interval, updates return statistics and
//! turns decisions into orders.

use super::{decide, Decision, DecisionParams};
use crate::config::StrategyConfig;
use crate::execution::OrderManager;
use crate::market::MarketDataCollector;
use crate::model::StatsModel;
use crate::risk::{DrawdownMonitor, PositionBook, RiskLimits, VolatilityGate};
use crate::telemetry::{
    increment_counter, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    /// Symbols whose return was folded into the statistics
    pub evaluated: usize,
    pub entries: usize,
    pub scale_ins: usize,
    /// Positions found flat on the exchange and closed in the book
    pub closed: usize,
}

/// Runs the short strategy over every collected symbol
pub struct ShortStrategyEngine {
    orders: Arc<dyn OrderManager>,
    collector: MarketDataCollector,
    stats: StatsModel,
    stats_path: Option<PathBuf>,
    book: PositionBook,
    monitor: DrawdownMonitor,
    limits: RiskLimits,
    gate: VolatilityGate,
    config: StrategyConfig,
    params: DecisionParams,
    /// Newest candle minute already evaluated, per symbol
    last_minute: HashMap<String, i64>,
}

impl ShortStrategyEngine {
    pub fn new(
        orders: Arc<dyn OrderManager>,
        collector: MarketDataCollector,
        stats: StatsModel,
        book: PositionBook,
        limits: RiskLimits,
        gate: VolatilityGate,
        config: StrategyConfig,
    ) -> Self {
        let params = DecisionParams::from(&config);
        Self {
            orders,
            collector,
            stats,
            stats_path: None,
            book,
            monitor: DrawdownMonitor::new(Decimal::ZERO),
            limits,
            gate,
            config,
            params,
            last_minute: HashMap::new(),
        }
    }

    /// Persist statistics to `path` after every tick
    pub fn with_stats_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stats_path = Some(path.into());
        self
    }

    pub fn book(&self) -> &PositionBook {
        &self.book
    }

    pub fn stats(&self) -> &StatsModel {
        &self.stats
    }

    pub fn monitor(&self) -> &DrawdownMonitor {
        &self.monitor
    }

    /// Tick every `poll_interval_secs` until `shutdown` resolves
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "Strategy engine started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Strategy engine stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(summary) => tracing::debug!(?summary, "Tick complete"),
                        Err(e) => tracing::error!(error = %e, "Tick failed"),
                    }
                }
            }
        }

        self.persist_stats();
    }

    /// One pass: sync, equity, evaluate, act, persist
    pub async fn tick(&mut self) -> anyhow::Result<TickSummary> {
        let started = Instant::now();
        let mut summary = TickSummary::default();

        summary.closed = self.sync_positions().await?;
        self.update_equity().await;

        let mut windows: Vec<_> = self.collector.snapshot().await.into_iter().collect();
        windows.sort_by(|a, b| a.0.cmp(&b.0));

        for (symbol, window) in windows {
            if !window.is_full() {
                continue;
            }
            let Some(minute) = window.latest_minute() else {
                continue;
            };
            if self.last_minute.get(&symbol) == Some(&minute) {
                continue;
            }
            self.last_minute.insert(symbol.clone(), minute);

            let (Some(r), Some(last_close)) = (window.window_return(), window.last()) else {
                continue;
            };
            let Some(r) = return_as_f64(r) else {
                tracing::warn!(symbol = %symbol, r = %r, "Window return not representable, skipped");
                continue;
            };

            self.stats.update(&symbol, r);
            summary.evaluated += 1;

            let decision = decide(
                &symbol,
                r,
                last_close,
                &self.stats,
                self.book.get(&symbol),
                &self.params,
            );

            match decision {
                Decision::Enter { window_return } => {
                    tracing::info!(
                        symbol = %symbol,
                        r = window_return,
                        mean = self.stats.mean(&symbol),
                        std = self.stats.std(&symbol),
                        "Anomalous return"
                    );
                    if self.enter(&symbol, last_close).await? {
                        summary.entries += 1;
                    }
                }
                Decision::ScaleIn { move_pct } => {
                    tracing::info!(symbol = %symbol, move_pct = %move_pct, "Scale-in triggered");
                    if self.scale_in(&symbol, last_close).await? {
                        summary.scale_ins += 1;
                    }
                }
                Decision::Hold => {}
            }
        }

        self.persist_stats();
        set_gauge(GaugeMetric::OpenPositions, self.book.active_count() as f64);
        record_latency(LatencyMetric::TickDuration, started.elapsed());
        Ok(summary)
    }

    /// Close book entries the exchange no longer holds, re-arm missing stops
    async fn sync_positions(&mut self) -> anyhow::Result<usize> {
        let mut closed = 0;
        for symbol in self.book.symbols() {
            match self.orders.position(&symbol).await {
                Ok(None) => {
                    let Some(pos) = self.book.get(&symbol).cloned() else {
                        continue;
                    };
                    let exit = self
                        .collector
                        .latest_close(&symbol)
                        .await
                        .unwrap_or(pos.avg_price);
                    // Whichever stop did not fire is still resting on the exchange
                    self.cancel_stops(&symbol, pos.algo_id.as_deref(), pos.sl_algo_id.as_deref())
                        .await;
                    let reason = if exit > pos.avg_price {
                        "stop_loss"
                    } else {
                        "trailing_tp"
                    };
                    self.book.close(&symbol, exit, reason)?;
                    closed += 1;
                }
                Ok(Some(_)) => {
                    let (trailing, stop_loss) = match self.book.get(&symbol) {
                        Some(p) => (p.algo_id.is_some(), p.sl_algo_id.is_some()),
                        None => continue,
                    };
                    if !trailing {
                        self.arm_trailing(&symbol).await?;
                    }
                    if !stop_loss {
                        self.arm_stop_loss(&symbol).await?;
                    }
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Position sync failed");
                }
            }
        }
        Ok(closed)
    }

    async fn update_equity(&mut self) {
        match self.orders.account_equity().await {
            Ok(equity) => {
                self.monitor.update(equity);
                set_gauge(GaugeMetric::Equity, f64::try_from(equity).unwrap_or(0.0));
                set_gauge(
                    GaugeMetric::DrawdownPct,
                    f64::try_from(self.monitor.drawdown_pct()).unwrap_or(0.0),
                );
            }
            Err(e) => tracing::warn!(error = %e, "Equity update failed"),
        }
    }

    /// Open and book a short; order failures book nothing
    async fn enter(&mut self, symbol: &str, last_close: Decimal) -> anyhow::Result<bool> {
        if let Err(reason) = self
            .limits
            .check_entry(symbol, &self.book, &self.monitor, &self.gate)
            .await
        {
            tracing::info!(symbol, %reason, "Entry blocked");
            return Ok(false);
        }

        let fill = match self
            .orders
            .open_short(symbol, self.config.notional_usdt, self.config.leverage)
            .await
        {
            Ok(fill) => fill,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Open short failed");
                return Ok(false);
            }
        };

        self.book.open(symbol, &fill, last_close)?;
        increment_counter(CounterMetric::Entries);
        tracing::info!(
            symbol,
            price = %fill.price,
            contracts = %fill.contracts,
            "Short opened"
        );

        self.arm_trailing(symbol).await?;
        self.arm_stop_loss(symbol).await?;
        Ok(true)
    }

    /// Grow the short, reset the anchor and re-arm both stops
    async fn scale_in(&mut self, symbol: &str, last_close: Decimal) -> anyhow::Result<bool> {
        let Some(pos) = self.book.get(symbol) else {
            return Ok(false);
        };
        if let Err(reason) = self
            .limits
            .check_scale_in(
                pos,
                last_close,
                self.config.scale_in_factor,
                self.config.leverage,
                &self.monitor,
                &self.gate,
            )
            .await
        {
            tracing::info!(symbol, %reason, "Scale-in blocked");
            return Ok(false);
        }

        let fill = match self
            .orders
            .add_position(symbol, self.config.scale_in_factor)
            .await
        {
            Ok(fill) => fill,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Scale-in failed");
                return Ok(false);
            }
        };

        let (additions, old_algo, old_sl) = {
            let pos = self.book.add(symbol, &fill, last_close)?;
            (pos.additions, pos.algo_id.clone(), pos.sl_algo_id.clone())
        };
        increment_counter(CounterMetric::ScaleIns);
        tracing::info!(
            symbol,
            additions,
            price = %fill.price,
            contracts = %fill.contracts,
            "Scaled in"
        );

        self.cancel_stops(symbol, old_algo.as_deref(), old_sl.as_deref())
            .await;
        self.book.set_algo(symbol, None)?;
        self.book.set_stop_loss_algo(symbol, None)?;
        self.arm_trailing(symbol).await?;
        self.arm_stop_loss(symbol).await?;
        Ok(true)
    }

    /// Best-effort cancel of a position's resting stops
    async fn cancel_stops(&self, symbol: &str, trailing: Option<&str>, stop_loss: Option<&str>) {
        if let Some(algo_id) = trailing {
            if let Err(e) = self.orders.cancel_trailing_tp(symbol, algo_id).await {
                tracing::warn!(symbol, algo_id, error = %e, "Cancel trailing take-profit failed");
            }
        }
        if let Some(algo_id) = stop_loss {
            if let Err(e) = self.orders.cancel_stop_loss(symbol, algo_id).await {
                tracing::warn!(symbol, algo_id, error = %e, "Cancel stop-loss failed");
            }
        }
    }

    /// Arm the stop-loss when one is configured; failures retry next tick
    async fn arm_stop_loss(&mut self, symbol: &str) -> anyhow::Result<()> {
        if self.config.stop_loss_pct <= Decimal::ZERO {
            return Ok(());
        }
        match self
            .orders
            .set_stop_loss(symbol, self.config.stop_loss_pct)
            .await
        {
            Ok(algo_id) => self.book.set_stop_loss_algo(symbol, Some(algo_id)),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Stop-loss not armed, will retry");
                Ok(())
            }
        }
    }

    /// Arm a trailing stop; a failure leaves it unarmed for the next tick
    async fn arm_trailing(&mut self, symbol: &str) -> anyhow::Result<()> {
        match self
            .orders
            .set_trailing_tp(
                symbol,
                self.config.trailing_activation,
                self.config.trailing_callback,
            )
            .await
        {
            Ok(algo_id) => self.book.set_algo(symbol, Some(algo_id)),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Trailing take-profit not armed, will retry");
                Ok(())
            }
        }
    }

    fn persist_stats(&self) {
        if let Some(path) = &self.stats_path {
            if let Err(e) = self.stats.save(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to save statistics");
            }
        }
    }
}

/// A window return as `f64`, `None` when it cannot be represented
fn return_as_f64(r: Decimal) -> Option<f64> {
    f64::try_from(r).ok().filter(|r| r.is_finite())
}
