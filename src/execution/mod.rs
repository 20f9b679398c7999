//! Order execution module
//!
//! Places shorts, scale-ins, trailing take-profits and stop-losses on OKX, or simulates
//! them against the collector's latest closes in paper mode

mod live;
mod paper;
mod types;

pub use live::LiveOrderManager;
pub use paper::PaperOrderManager;
pub use types::{AlgoId, ContractSpec, ExchangePosition, Fill, Side};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Order management for short positions on linear swaps
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderManager: Send + Sync {
    /// Set leverage and open a short worth `usdt_size` of notional
    async fn open_short(&self, symbol: &str, usdt_size: Decimal, leverage: u32)
        -> anyhow::Result<Fill>;
    /// Grow the short so the total becomes `factor` times the current size
    async fn add_position(&self, symbol: &str, factor: Decimal) -> anyhow::Result<Fill>;
    /// Arm a trailing take-profit on the whole position
    async fn set_trailing_tp(
        &self,
        symbol: &str,
        activation: Decimal,
        callback: Decimal,
    ) -> anyhow::Result<AlgoId>;
    async fn cancel_trailing_tp(&self, symbol: &str, algo_id: &str) -> anyhow::Result<()>;
    /// Arm a market stop-loss `stop_loss_pct` percent above the average entry
    async fn set_stop_loss(&self, symbol: &str, stop_loss_pct: Decimal) -> anyhow::Result<AlgoId>;
    async fn cancel_stop_loss(&self, symbol: &str, algo_id: &str) -> anyhow::Result<()>;
    /// Current short position, `None` when flat
    async fn position(&self, symbol: &str) -> anyhow::Result<Option<ExchangePosition>>;
    /// Every open short position
    async fn positions(&self) -> anyhow::Result<Vec<ExchangePosition>>;
    /// Total account equity in USDT
    async fn account_equity(&self) -> anyhow::Result<Decimal>;
}

/// Activation price of a short's trailing stop
pub fn trailing_activation_price(avg_price: Decimal, activation: Decimal) -> Decimal {
    avg_price * (Decimal::ONE - activation)
}

/// Trigger price of a short's stop-loss, `stop_loss_pct` in percent
pub fn stop_loss_price(avg_price: Decimal, stop_loss_pct: Decimal) -> Decimal {
    avg_price * (Decimal::ONE + stop_loss_pct / Decimal::ONE_HUNDRED)
}

/// Contracts to add so the total becomes `factor * current`
pub fn scale_in_contracts(current: Decimal, factor: Decimal, spec: &ContractSpec) -> Option<Decimal> {
    if current <= Decimal::ZERO || factor <= Decimal::ONE {
        return None;
    }
    Some(spec.round_contracts(current * (factor - Decimal::ONE)))
}
