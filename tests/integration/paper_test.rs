//! End-to-end paper trading: spike, short, trailing take-profit

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use perp_short::app::resume_paper;
use perp_short::config::{RiskConfig, StatsConfig, StrategyConfig};
use perp_short::execution::{OrderManager, PaperOrderManager};
use perp_short::feed::Candle;
use perp_short::market::MarketDataCollector;
use perp_short::model::StatsModel;
use perp_short::okx::OkxError;
use perp_short::risk::{CandleSource, PositionBook, RiskLimits, VolatilityGate};
use perp_short::strategy::ShortStrategyEngine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::Arc;

const SYM: &str = "WIF-USDT-SWAP";

/// Reference instruments with no history read as calm
struct CalmMarket;

#[async_trait]
impl CandleSource for CalmMarket {
    async fn recent_candles(
        &self,
        _inst_id: &str,
        _bar: &str,
        _limit: usize,
    ) -> Result<Vec<Candle>, OkxError> {
        Ok(vec![])
    }
}

fn strategy_config() -> StrategyConfig {
    StrategyConfig {
        poll_interval_secs: 60,
        notional_usdt: dec!(100),
        leverage: 5,
        td_mode: "isolated".into(),
        trailing_activation: dec!(0.01),
        trailing_callback: dec!(0.002),
        scale_in_trigger: dec!(0.03),
        scale_in_factor: dec!(1.5),
        max_additions: 4,
        stop_loss_pct: dec!(30),
    }
}

fn stats_config() -> StatsConfig {
    StatsConfig {
        sigma_threshold: 3.0,
        min_samples: 2,
    }
}

/// Quiet history: thirty small returns either side of zero
fn train(stats: &mut StatsModel) {
    for i in 0..30 {
        stats.update(SYM, if i % 2 == 0 { 0.001 } else { -0.001 });
    }
}

async fn push(collector: &MarketDataCollector, minute: i64, close: Decimal) {
    collector
        .ingest(&Candle {
            symbol: SYM.into(),
            ts: Utc.timestamp_opt(1_704_067_200, 0).unwrap() + Duration::minutes(minute),
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ZERO,
            confirmed: true,
        })
        .await;
}

async fn spiking_collector() -> MarketDataCollector {
    let collector = MarketDataCollector::new(&[SYM.to_string()], 6);
    for (m, close) in [100, 100, 100, 100, 100, 120].into_iter().enumerate() {
        push(&collector, m as i64, Decimal::from(close)).await;
    }
    collector
}

fn engine(
    orders: Arc<PaperOrderManager>,
    collector: MarketDataCollector,
    stats: StatsModel,
    book: PositionBook,
) -> ShortStrategyEngine {
    ShortStrategyEngine::new(
        orders,
        collector,
        stats,
        book,
        RiskLimits::from(&RiskConfig::default()),
        VolatilityGate::new(Arc::new(CalmMarket), &RiskConfig::default()),
        strategy_config(),
    )
}

#[tokio::test]
async fn test_spike_short_then_trailing_exit() {
    let collector = spiking_collector().await;
    let orders = Arc::new(PaperOrderManager::new(
        collector.clone(),
        Decimal::ZERO,
        dec!(1000),
    ));
    let mut stats = StatsModel::new(&stats_config());
    train(&mut stats);
    let mut engine = engine(
        orders.clone(),
        collector.clone(),
        stats,
        PositionBook::in_memory(),
    );

    // 20% spike: short 100 USDT at 120 with a trailing stop armed
    let summary = engine.tick().await.unwrap();
    assert_eq!(summary.entries, 1);
    let pos = engine.book().get(SYM).unwrap().clone();
    assert_eq!(pos.avg_price, dec!(120));
    assert_eq!(pos.contracts, dec!(0.83333333));
    assert!(pos.algo_id.is_some());

    // Below 118.8 the stop activates, the short stays open
    push(&collector, 6, dec!(118)).await;
    let summary = engine.tick().await.unwrap();
    assert_eq!(summary.closed, 0);
    assert!(orders.position(SYM).await.unwrap().is_some());

    // A bounce beyond 0.2% off the low triggers the take-profit
    push(&collector, 7, dec!(118.5)).await;
    let summary = engine.tick().await.unwrap();
    assert_eq!(summary.closed, 1);

    let trade = &engine.book().trades()[0];
    assert_eq!(trade.reason, "trailing_tp");
    assert_eq!(trade.exit_price, dec!(118.5));
    assert!(trade.pnl > Decimal::ZERO);
    assert_eq!(trade.pnl, orders.realized_pnl().await);
    assert_eq!(engine.book().stats().total_trades, 1);
}

#[tokio::test]
async fn test_no_entry_without_history() {
    let collector = spiking_collector().await;
    let orders = Arc::new(PaperOrderManager::new(
        collector.clone(),
        Decimal::ZERO,
        dec!(1000),
    ));
    // A single sample is below the minimum for an anomaly verdict
    let mut engine = engine(
        orders.clone(),
        collector,
        StatsModel::new(&stats_config()),
        PositionBook::in_memory(),
    );

    let summary = engine.tick().await.unwrap();
    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.entries, 0);
    assert!(orders.fills().await.is_empty());
    assert_eq!(engine.stats().count(SYM), 1);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let stats_path = dir.path().join("stats.json");

    {
        let collector = spiking_collector().await;
        let orders = Arc::new(PaperOrderManager::new(
            collector.clone(),
            Decimal::ZERO,
            dec!(1000),
        ));
        let mut stats = StatsModel::load_or_new(&stats_path, &stats_config()).unwrap();
        train(&mut stats);
        let book = PositionBook::load(dir.path()).unwrap();
        let mut engine =
            engine(orders, collector, stats, book).with_stats_path(stats_path.clone());

        assert_eq!(engine.tick().await.unwrap().entries, 1);
    }

    assert!(Path::new(&stats_path).exists());
    let stats = StatsModel::load_or_new(&stats_path, &stats_config()).unwrap();
    assert_eq!(stats.count(SYM), 31);

    let book = PositionBook::load(dir.path()).unwrap();
    assert_eq!(book.symbols(), vec![SYM.to_string()]);
    let pos = book.get(SYM).unwrap();
    assert_eq!(pos.avg_price, dec!(120));
    assert!(pos.algo_id.is_some());
    assert!(pos.sl_algo_id.is_some());
}

#[tokio::test]
async fn test_paper_restart_keeps_booked_short() {
    let dir = tempfile::tempdir().unwrap();

    {
        let collector = spiking_collector().await;
        let orders = Arc::new(PaperOrderManager::new(
            collector.clone(),
            Decimal::ZERO,
            dec!(1000),
        ));
        let mut stats = StatsModel::new(&stats_config());
        train(&mut stats);
        let book = PositionBook::load(dir.path()).unwrap();
        let mut engine = engine(orders, collector, stats, book);
        assert_eq!(engine.tick().await.unwrap().entries, 1);
    }

    // Fresh process: empty simulated exchange, no candles yet
    let collector = MarketDataCollector::new(&[SYM.to_string()], 6);
    let orders = Arc::new(PaperOrderManager::new(
        collector.clone(),
        Decimal::ZERO,
        dec!(1000),
    ));
    let mut book = PositionBook::load(dir.path()).unwrap();
    assert_eq!(resume_paper(&orders, &mut book).await.unwrap(), 1);
    let mut engine = engine(
        orders.clone(),
        collector.clone(),
        StatsModel::new(&stats_config()),
        book,
    );

    let summary = engine.tick().await.unwrap();
    assert_eq!(summary.closed, 0);
    assert!(engine.book().trades().is_empty());
    let pos = engine.book().get(SYM).unwrap();
    assert_eq!(pos.avg_price, dec!(120));
    assert!(pos.algo_id.is_some());
    assert!(pos.sl_algo_id.is_some());
    assert!(orders.fills().await.is_empty());

    // The re-armed trailing stop still works off the booked entry
    push(&collector, 10, dec!(118)).await;
    assert_eq!(engine.tick().await.unwrap().closed, 0);
    push(&collector, 11, dec!(118.5)).await;
    assert_eq!(engine.tick().await.unwrap().closed, 1);

    let trade = &engine.book().trades()[0];
    assert_eq!(trade.reason, "trailing_tp");
    assert_eq!(trade.exit_price, dec!(118.5));
    assert_eq!(trade.pnl, orders.realized_pnl().await);
}
