//! Application wiring
//!
//! Discovers symbols, builds the collector, order manager and engine, and
//! runs the feed and the engine side by side until Ctrl-C.

use crate::config::{Config, ExecutionMode};
use crate::execution::{ExchangePosition, LiveOrderManager, OrderManager, PaperOrderManager};
use crate::feed::OkxCandleFeed;
use crate::market::{discover_perps, MarketDataCollector};
use crate::model::StatsModel;
use crate::okx::{simulated_from_env, Credentials, OkxClient};
use crate::risk::{PositionBook, RiskLimits, VolatilityGate};
use crate::strategy::ShortStrategyEngine;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;

const STATS_FILE: &str = "stats.json";

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Discovery returned nothing; there was nothing to trade
    NoSymbols,
    /// The shutdown signal fired
    Stopped,
    /// The candle stream ended on its own
    FeedEnded,
}

/// Build an OKX client from config plus environment credentials
pub fn build_client(config: &Config) -> anyhow::Result<OkxClient> {
    let mut exchange = config.exchange.clone();
    if simulated_from_env() {
        exchange.simulated = true;
    }
    let credentials = Credentials::from_env();
    if credentials.is_none() {
        tracing::warn!("OKX credentials not set, private endpoints unavailable");
    }
    Ok(OkxClient::new(&exchange, credentials)?)
}

/// Carry the book's open shorts into a fresh paper session
///
/// The simulated exchange starts empty, so each booked short is re-opened
/// there and its stop ids are cleared for the engine to re-arm on the first
/// tick. Returns how many positions were resumed.
pub async fn resume_paper(paper: &PaperOrderManager, book: &mut PositionBook) -> anyhow::Result<usize> {
    let positions: Vec<ExchangePosition> = book
        .positions()
        .map(|p| ExchangePosition {
            symbol: p.symbol.clone(),
            contracts: p.contracts,
            avg_price: p.avg_price,
            unrealized_pnl: Decimal::ZERO,
        })
        .collect();
    paper.restore(&positions).await;
    for pos in &positions {
        book.set_algo(&pos.symbol, None)?;
        book.set_stop_loss_algo(&pos.symbol, None)?;
    }
    if !positions.is_empty() {
        tracing::info!(positions = positions.len(), "Paper session resumed from book");
    }
    Ok(positions.len())
}

/// Full run: discover, then trade until Ctrl-C
pub async fn run(config: Config, force_paper: bool) -> anyhow::Result<RunOutcome> {
    let client = build_client(&config)?;
    let symbols = discover_perps(&client, &config.discovery).await?;

    let outcome = run_with_symbols(config, client, symbols, force_paper, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    if outcome == RunOutcome::Stopped {
        tracing::info!("Stopped by user… bye!");
    }
    Ok(outcome)
}

/// Trade the given symbols until `shutdown` resolves or the feed ends
pub async fn run_with_symbols<F>(
    config: Config,
    client: OkxClient,
    symbols: Vec<String>,
    force_paper: bool,
    shutdown: F,
) -> anyhow::Result<RunOutcome>
where
    F: Future<Output = ()>,
{
    if symbols.is_empty() {
        tracing::warn!("No symbols discovered — check REST auth / network.");
        return Ok(RunOutcome::NoSymbols);
    }

    let mode = if force_paper {
        ExecutionMode::Paper
    } else {
        config.execution.mode
    };
    if mode == ExecutionMode::Live && !client.has_credentials() {
        anyhow::bail!("live mode requires OKX_API_KEY, OKX_API_SECRET and OKX_PASSPHRASE");
    }

    tracing::info!(
        symbols = symbols.len(),
        mode = ?mode,
        simulated = client.is_simulated(),
        "Starting short strategy"
    );

    let collector = MarketDataCollector::new(&symbols, config.feed.window_minutes);
    let data_dir = &config.data.data_dir;
    let mut book = PositionBook::load(data_dir)?;

    let orders: Arc<dyn OrderManager> = match mode {
        ExecutionMode::Paper => {
            let paper = PaperOrderManager::new(
                collector.clone(),
                config.execution.fee_rate,
                config.execution.initial_bankroll,
            );
            resume_paper(&paper, &mut book).await?;
            Arc::new(paper)
        }
        ExecutionMode::Live => {
            let live = LiveOrderManager::new(client.clone(), config.strategy.td_mode.clone());
            match live.positions().await {
                Ok(positions) => {
                    book.reconcile(&positions)?;
                }
                Err(e) => tracing::warn!(error = %e, "Could not fetch positions for reconciliation"),
            }
            Arc::new(live)
        }
    };

    let stats_path = data_dir.join(STATS_FILE);
    let stats = StatsModel::load_or_new(&stats_path, &config.stats)?;
    let gate = VolatilityGate::new(Arc::new(client.clone()), &config.risk);

    let mut engine = ShortStrategyEngine::new(
        orders,
        collector.clone(),
        stats,
        book,
        RiskLimits::from(&config.risk),
        gate,
        config.strategy.clone(),
    )
    .with_stats_path(stats_path);

    let mut exchange = config.exchange.clone();
    exchange.simulated = client.is_simulated();
    let ws_url = exchange.effective_ws_url().to_string();
    let feed = OkxCandleFeed::new(ws_url, symbols, config.feed.clone());

    tokio::select! {
        result = collector.connect(&feed) => {
            result?;
            tracing::warn!("Candle feed ended, stopping");
            Ok(RunOutcome::FeedEnded)
        }
        _ = engine.run(shutdown) => Ok(RunOutcome::Stopped),
    }
}
