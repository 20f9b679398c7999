//! Paper trading order manager

use super::{
    scale_in_contracts, stop_loss_price, trailing_activation_price, AlgoId, ContractSpec,
    ExchangePosition, Fill, OrderManager, Side,
};
use crate::market::MarketDataCollector;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct PaperPosition {
    contracts: Decimal,
    avg_price: Decimal,
}

/// Simulated `move_order_stop`
#[derive(Debug, Clone)]
struct TrailingStop {
    algo_id: AlgoId,
    active_px: Decimal,
    callback: Decimal,
    /// Lowest price since activation, `None` until activated
    low: Option<Decimal>,
}

impl TrailingStop {
    /// Feed a price; returns true when the stop triggers
    fn observe(&mut self, price: Decimal) -> bool {
        match self.low {
            None => {
                if price <= self.active_px {
                    self.low = Some(price);
                }
                false
            }
            Some(low) => {
                let low = low.min(price);
                self.low = Some(low);
                price >= low * (Decimal::ONE + self.callback)
            }
        }
    }
}

/// Simulated conditional stop-loss
#[derive(Debug, Clone)]
struct StopLoss {
    algo_id: AlgoId,
    trigger: Decimal,
}

#[derive(Debug, Default)]
struct PaperState {
    positions: HashMap<String, PaperPosition>,
    stops: HashMap<String, TrailingStop>,
    stop_losses: HashMap<String, StopLoss>,
    fills: Vec<Fill>,
    realized_pnl: Decimal,
    fees: Decimal,
}

/// Simulated fills at the collector's latest close
///
/// One contract is one unit of base currency. Trailing stops are checked
/// whenever a position is queried, which the strategy engine does every tick.
pub struct PaperOrderManager {
    fee_rate: Decimal,
    bankroll: Decimal,
    collector: MarketDataCollector,
    spec: ContractSpec,
    state: Arc<RwLock<PaperState>>,
}

impl PaperOrderManager {
    pub fn new(collector: MarketDataCollector, fee_rate: Decimal, bankroll: Decimal) -> Self {
        Self {
            fee_rate,
            bankroll,
            collector,
            spec: ContractSpec::unit(),
            state: Arc::new(RwLock::new(PaperState::default())),
        }
    }

    async fn price(&self, symbol: &str) -> anyhow::Result<Decimal> {
        match self.collector.latest_close(symbol).await {
            Some(p) if p > Decimal::ZERO => Ok(p),
            _ => anyhow::bail!("no price for {}", symbol),
        }
    }

    fn fill(&self, state: &mut PaperState, symbol: &str, side: Side, price: Decimal, contracts: Decimal) -> Fill {
        let fees = contracts * price * self.fee_rate;
        state.fees += fees;
        let fill = Fill {
            order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            price,
            contracts,
            quantity: self.spec.quantity(contracts),
            fees,
            timestamp: Utc::now(),
        };
        state.fills.push(fill.clone());
        fill
    }

    /// Add to (or open) a short, re-averaging the entry
    fn sell(&self, state: &mut PaperState, symbol: &str, price: Decimal, contracts: Decimal) -> Fill {
        let pos = state
            .positions
            .entry(symbol.to_string())
            .or_insert(PaperPosition {
                contracts: Decimal::ZERO,
                avg_price: Decimal::ZERO,
            });
        let total = pos.contracts + contracts;
        pos.avg_price = (pos.avg_price * pos.contracts + price * contracts) / total;
        pos.contracts = total;

        let fill = self.fill(state, symbol, Side::Sell, price, contracts);
        tracing::info!(symbol, contracts = %contracts, price = %price, "Paper short filled");
        fill
    }

    /// Run the symbol's trailing stop and stop-loss against `price`,
    /// closing the position when either triggers
    fn check_stop(&self, state: &mut PaperState, symbol: &str, price: Decimal) {
        let trailing = match state.stops.get_mut(symbol) {
            Some(stop) => stop.observe(price),
            None => false,
        };
        let stop_loss = state
            .stop_losses
            .get(symbol)
            .is_some_and(|sl| price >= sl.trigger);
        if !trailing && !stop_loss {
            return;
        }

        let stop = state.stops.remove(symbol);
        let sl = state.stop_losses.remove(symbol);
        let (algo_id, kind) = if stop_loss {
            (sl.map(|s| s.algo_id), "stop-loss")
        } else {
            (stop.map(|s| s.algo_id), "trailing take-profit")
        };
        if let Some(pos) = state.positions.remove(symbol) {
            let pnl = (pos.avg_price - price) * pos.contracts;
            state.realized_pnl += pnl;
            self.fill(state, symbol, Side::Buy, price, pos.contracts);
            tracing::info!(
                symbol,
                algo_id = algo_id.unwrap_or_default(),
                price = %price,
                pnl = %pnl,
                "Paper {} triggered",
                kind
            );
        }
    }

    /// Re-open shorts carried over from a previous session
    ///
    /// Stops are not restored; the caller re-arms them.
    pub async fn restore(&self, positions: &[ExchangePosition]) {
        let mut state = self.state.write().await;
        for pos in positions {
            if pos.contracts <= Decimal::ZERO {
                continue;
            }
            state.positions.insert(
                pos.symbol.clone(),
                PaperPosition {
                    contracts: pos.contracts,
                    avg_price: pos.avg_price,
                },
            );
            tracing::info!(
                symbol = %pos.symbol,
                contracts = %pos.contracts,
                avg_price = %pos.avg_price,
                "Paper short restored"
            );
        }
    }

    /// Every simulated fill so far
    pub async fn fills(&self) -> Vec<Fill> {
        self.state.read().await.fills.clone()
    }

    pub async fn realized_pnl(&self) -> Decimal {
        self.state.read().await.realized_pnl
    }
}

#[async_trait]
impl OrderManager for PaperOrderManager {
    async fn open_short(
        &self,
        symbol: &str,
        usdt_size: Decimal,
        leverage: u32,
    ) -> anyhow::Result<Fill> {
        let price = self.price(symbol).await?;
        let contracts = match self.spec.contracts_for(usdt_size, price) {
            Some(c) => c,
            None => anyhow::bail!("cannot size {} USDT of {} at {}", usdt_size, symbol, price),
        };
        tracing::debug!(symbol, leverage, "Paper leverage set");

        let mut state = self.state.write().await;
        Ok(self.sell(&mut state, symbol, price, contracts))
    }

    async fn add_position(&self, symbol: &str, factor: Decimal) -> anyhow::Result<Fill> {
        let price = self.price(symbol).await?;
        let mut state = self.state.write().await;
        let current = match state.positions.get(symbol) {
            Some(pos) => pos.contracts,
            None => anyhow::bail!("no open short on {}", symbol),
        };
        let contracts = match scale_in_contracts(current, factor, &self.spec) {
            Some(c) => c,
            None => anyhow::bail!("invalid scale-in factor {} for {}", factor, symbol),
        };
        Ok(self.sell(&mut state, symbol, price, contracts))
    }

    async fn set_trailing_tp(
        &self,
        symbol: &str,
        activation: Decimal,
        callback: Decimal,
    ) -> anyhow::Result<AlgoId> {
        let mut state = self.state.write().await;
        let avg_price = match state.positions.get(symbol) {
            Some(pos) => pos.avg_price,
            None => anyhow::bail!("no open short on {}", symbol),
        };
        let algo_id = Uuid::new_v4().simple().to_string();
        let active_px = trailing_activation_price(avg_price, activation);
        state.stops.insert(
            symbol.to_string(),
            TrailingStop {
                algo_id: algo_id.clone(),
                active_px,
                callback,
                low: None,
            },
        );
        tracing::info!(symbol, algo_id = %algo_id, active_px = %active_px, "Paper trailing take-profit armed");
        Ok(algo_id)
    }

    async fn cancel_trailing_tp(&self, symbol: &str, algo_id: &str) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if state.stops.get(symbol).is_some_and(|s| s.algo_id == algo_id) {
            state.stops.remove(symbol);
        }
        Ok(())
    }

    async fn set_stop_loss(&self, symbol: &str, stop_loss_pct: Decimal) -> anyhow::Result<AlgoId> {
        let mut state = self.state.write().await;
        let avg_price = match state.positions.get(symbol) {
            Some(pos) => pos.avg_price,
            None => anyhow::bail!("no open short on {}", symbol),
        };
        let algo_id = Uuid::new_v4().simple().to_string();
        let trigger = stop_loss_price(avg_price, stop_loss_pct);
        state.stop_losses.insert(
            symbol.to_string(),
            StopLoss {
                algo_id: algo_id.clone(),
                trigger,
            },
        );
        tracing::info!(symbol, algo_id = %algo_id, trigger = %trigger, "Paper stop-loss armed");
        Ok(algo_id)
    }

    async fn cancel_stop_loss(&self, symbol: &str, algo_id: &str) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if state.stop_losses.get(symbol).is_some_and(|s| s.algo_id == algo_id) {
            state.stop_losses.remove(symbol);
        }
        Ok(())
    }

    async fn position(&self, symbol: &str) -> anyhow::Result<Option<ExchangePosition>> {
        let price = self.collector.latest_close(symbol).await;
        let mut state = self.state.write().await;
        if let Some(price) = price {
            self.check_stop(&mut state, symbol, price);
        }
        Ok(state.positions.get(symbol).map(|pos| ExchangePosition {
            symbol: symbol.to_string(),
            contracts: pos.contracts,
            avg_price: pos.avg_price,
            unrealized_pnl: price
                .map(|p| (pos.avg_price - p) * pos.contracts)
                .unwrap_or_default(),
        }))
    }

    async fn positions(&self) -> anyhow::Result<Vec<ExchangePosition>> {
        let symbols: Vec<String> = self.state.read().await.positions.keys().cloned().collect();
        let mut out = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(pos) = self.position(&symbol).await? {
                out.push(pos);
            }
        }
        Ok(out)
    }

    async fn account_equity(&self) -> anyhow::Result<Decimal> {
        let state = self.state.read().await;
        let mut unrealized = Decimal::ZERO;
        for (symbol, pos) in &state.positions {
            if let Some(price) = self.collector.latest_close(symbol).await {
                unrealized += (pos.avg_price - price) * pos.contracts;
            }
        }
        Ok(self.bankroll + state.realized_pnl - state.fees + unrealized)
    }
}
