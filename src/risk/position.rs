//! Position book
//!
//! Local record of managed shorts and closed trades, persisted as pretty
//! JSON under the data directory and reconciled against the exchange at
//! startup.

use crate::execution::{AlgoId, ExchangePosition, Fill};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const POSITIONS_FILE: &str = "positions.json";
const TRADES_FILE: &str = "trades.json";

/// Contract difference below which local and exchange sizes agree
const SIZE_TOLERANCE: Decimal = dec!(0.000001);

/// One fill that built up a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub order_id: String,
    pub price: Decimal,
    pub contracts: Decimal,
    pub fees: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl From<&Fill> for Leg {
    fn from(fill: &Fill) -> Self {
        Self {
            order_id: fill.order_id.clone(),
            price: fill.price,
            contracts: fill.contracts,
            fees: fill.fees,
            timestamp: fill.timestamp,
        }
    }
}

/// An open short managed by the strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortPosition {
    pub symbol: String,
    pub contracts: Decimal,
    /// Base currency
    pub quantity: Decimal,
    pub avg_price: Decimal,
    /// Price of the last entry; scale-ins trigger relative to it
    pub anchor_price: Decimal,
    /// Scale-ins performed so far
    pub additions: u32,
    /// Armed trailing take-profit, if any
    pub algo_id: Option<AlgoId>,
    /// Armed stop-loss, if any
    #[serde(default)]
    pub sl_algo_id: Option<AlgoId>,
    pub opened_at: DateTime<Utc>,
    pub legs: Vec<Leg>,
}

impl ShortPosition {
    pub fn fees(&self) -> Decimal {
        self.legs.iter().map(|l| l.fees).sum()
    }

    /// Unrealized P&L at `price`, before fees
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        (self.avg_price - price) * self.quantity
    }
}

/// A closed short
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position: ShortPosition,
    pub exit_price: Decimal,
    pub closed_at: DateTime<Utc>,
    /// e.g. "trailing_tp", "closed_while_offline"
    pub reason: String,
    /// Realized P&L net of entry fees
    pub pnl: Decimal,
}

/// Aggregate book statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookStats {
    pub active: usize,
    pub total_trades: usize,
    pub total_pnl: Decimal,
    /// Fraction of closed trades with positive P&L
    pub win_rate: Decimal,
}

/// Outcome of comparing the book with exchange positions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Closed locally because the exchange is flat
    pub closed: Vec<String>,
    /// Size or price adopted from the exchange
    pub synced: Vec<String>,
    /// Exchange shorts the book does not manage
    pub unmanaged: Vec<String>,
}

/// Active positions and trade history
#[derive(Debug, Default)]
pub struct PositionBook {
    dir: Option<PathBuf>,
    active: HashMap<String, ShortPosition>,
    trades: Vec<ClosedTrade>,
}

impl PositionBook {
    /// A book that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the book from `dir`, starting empty when the files are missing
    pub fn load(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let active: HashMap<String, ShortPosition> = read_json(&dir.join(POSITIONS_FILE))?;
        let trades: Vec<ClosedTrade> = read_json(&dir.join(TRADES_FILE))?;
        tracing::info!(
            dir = %dir.display(),
            active = active.len(),
            trades = trades.len(),
            "Loaded position book"
        );

        Ok(Self {
            dir: Some(dir),
            active,
            trades,
        })
    }

    /// Write both files
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        write_json(&dir.join(POSITIONS_FILE), &self.active)?;
        write_json(&dir.join(TRADES_FILE), &self.trades)?;
        Ok(())
    }

    /// Book a new short
    pub fn open(&mut self, symbol: &str, fill: &Fill, anchor: Decimal) -> anyhow::Result<&ShortPosition> {
        if self.active.contains_key(symbol) {
            anyhow::bail!("position already open on {}", symbol);
        }
        let position = ShortPosition {
            symbol: symbol.to_string(),
            contracts: fill.contracts,
            quantity: fill.quantity,
            avg_price: fill.price,
            anchor_price: anchor,
            additions: 0,
            algo_id: None,
            sl_algo_id: None,
            opened_at: fill.timestamp,
            legs: vec![Leg::from(fill)],
        };
        self.active.insert(symbol.to_string(), position);
        self.save()?;
        self.get(symbol)
            .ok_or_else(|| anyhow::anyhow!("position vanished for {}", symbol))
    }

    /// Add a scale-in fill, re-averaging the entry and resetting the anchor
    pub fn add(&mut self, symbol: &str, fill: &Fill, anchor: Decimal) -> anyhow::Result<&ShortPosition> {
        let Some(pos) = self.active.get_mut(symbol) else {
            anyhow::bail!("no position on {}", symbol);
        };
        let quantity = pos.quantity + fill.quantity;
        if quantity > Decimal::ZERO {
            pos.avg_price = (pos.avg_price * pos.quantity + fill.price * fill.quantity) / quantity;
        }
        pos.quantity = quantity;
        pos.contracts += fill.contracts;
        pos.anchor_price = anchor;
        pos.additions += 1;
        pos.legs.push(Leg::from(fill));
        self.save()?;
        self.get(symbol)
            .ok_or_else(|| anyhow::anyhow!("position vanished for {}", symbol))
    }

    pub fn set_algo(&mut self, symbol: &str, algo_id: Option<AlgoId>) -> anyhow::Result<()> {
        let Some(pos) = self.active.get_mut(symbol) else {
            anyhow::bail!("no position on {}", symbol);
        };
        pos.algo_id = algo_id;
        self.save()
    }

    pub fn set_stop_loss_algo(&mut self, symbol: &str, algo_id: Option<AlgoId>) -> anyhow::Result<()> {
        let Some(pos) = self.active.get_mut(symbol) else {
            anyhow::bail!("no position on {}", symbol);
        };
        pos.sl_algo_id = algo_id;
        self.save()
    }

    /// Move a position to the trade history
    pub fn close(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        reason: &str,
    ) -> anyhow::Result<Option<ClosedTrade>> {
        let Some(position) = self.active.remove(symbol) else {
            return Ok(None);
        };
        let pnl = position.pnl_at(exit_price) - position.fees();
        let trade = ClosedTrade {
            position,
            exit_price,
            closed_at: Utc::now(),
            reason: reason.to_string(),
            pnl,
        };
        tracing::info!(
            symbol,
            exit_price = %exit_price,
            pnl = %pnl,
            reason,
            "Position closed"
        );
        self.trades.push(trade.clone());
        self.save()?;
        Ok(Some(trade))
    }

    /// Drop a position without recording a trade
    pub fn remove(&mut self, symbol: &str) -> anyhow::Result<Option<ShortPosition>> {
        let removed = self.active.remove(symbol);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn get(&self, symbol: &str) -> Option<&ShortPosition> {
        self.active.get(symbol)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Symbols with an open position, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<_> = self.active.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn positions(&self) -> impl Iterator<Item = &ShortPosition> {
        self.active.values()
    }

    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    pub fn stats(&self) -> BookStats {
        let total_trades = self.trades.len();
        let total_pnl = self.trades.iter().map(|t| t.pnl).sum();
        let wins = self.trades.iter().filter(|t| t.pnl > Decimal::ZERO).count();
        let win_rate = if total_trades == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(wins) / Decimal::from(total_trades)
        };
        BookStats {
            active: self.active.len(),
            total_trades,
            total_pnl,
            win_rate,
        }
    }

    /// Bring the book in line with what the exchange holds
    ///
    /// Positions flat on the exchange are closed at their average price with
    /// reason `closed_while_offline`, since the real exit is unknown.
    pub fn reconcile(&mut self, exchange: &[ExchangePosition]) -> anyhow::Result<ReconcileReport> {
        let by_symbol: HashMap<&str, &ExchangePosition> =
            exchange.iter().map(|p| (p.symbol.as_str(), p)).collect();
        let mut report = ReconcileReport::default();

        for symbol in self.symbols() {
            match by_symbol.get(symbol.as_str()) {
                None => {
                    let exit = self.active.get(&symbol).map(|p| p.avg_price).unwrap_or_default();
                    self.close(&symbol, exit, "closed_while_offline")?;
                    report.closed.push(symbol);
                }
                Some(remote) => {
                    let Some(local) = self.active.get_mut(&symbol) else {
                        continue;
                    };
                    if (local.contracts - remote.contracts).abs() > SIZE_TOLERANCE {
                        tracing::warn!(
                            symbol = %symbol,
                            local = %local.contracts,
                            exchange = %remote.contracts,
                            "Position size mismatch, adopting exchange size"
                        );
                        if local.contracts > Decimal::ZERO {
                            local.quantity = local.quantity * remote.contracts / local.contracts;
                        }
                        local.contracts = remote.contracts;
                        if remote.avg_price > Decimal::ZERO {
                            local.avg_price = remote.avg_price;
                        }
                        report.synced.push(symbol);
                    }
                }
            }
        }

        for remote in exchange {
            if !self.active.contains_key(&remote.symbol) {
                tracing::warn!(
                    symbol = %remote.symbol,
                    contracts = %remote.contracts,
                    "Unmanaged short on exchange, leaving it alone"
                );
                report.unmanaged.push(remote.symbol.clone());
            }
        }

        if !report.synced.is_empty() {
            self.save()?;
        }
        tracing::info!(
            closed = report.closed.len(),
            synced = report.synced.len(),
            unmanaged = report.unmanaged.len(),
            "Reconciled position book"
        );
        Ok(report)
    }
}

fn read_json<T: serde::de::DeserializeOwned + Default>(path: &Path) -> anyhow::Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&content)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
