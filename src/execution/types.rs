//! Execution types

use crate::okx::{Instrument, RawPosition};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Exchange id of an algo (trailing stop) order
pub type AlgoId = String;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// A fill (executed trade)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Exchange or simulated order id
    pub order_id: String,
    /// Instrument id
    pub symbol: String,
    pub side: Side,
    /// Fill price (estimate for live market orders)
    pub price: Decimal,
    /// Size in contracts
    pub contracts: Decimal,
    /// Size in base currency, `contracts * ctVal`
    pub quantity: Decimal,
    /// Fees paid
    pub fees: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A short position as the exchange reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    /// Always positive
    pub contracts: Decimal,
    pub avg_price: Decimal,
    pub unrealized_pnl: Decimal,
}

impl From<&RawPosition> for ExchangePosition {
    fn from(raw: &RawPosition) -> Self {
        Self {
            symbol: raw.inst_id.clone(),
            contracts: raw.pos.abs(),
            avg_price: raw.avg_px,
            unrealized_pnl: raw.upl,
        }
    }
}

/// Contract parameters needed to size orders
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractSpec {
    /// Base currency per contract
    pub ct_val: Decimal,
    pub lot_sz: Decimal,
    pub min_sz: Decimal,
    pub tick_sz: Decimal,
}

impl ContractSpec {
    /// One contract per unit of base currency, for simulated fills
    pub fn unit() -> Self {
        let step = Decimal::new(1, 8);
        Self {
            ct_val: Decimal::ONE,
            lot_sz: step,
            min_sz: step,
            tick_sz: step,
        }
    }

    /// Round a contract count down to the lot size, at least `min_sz`
    pub fn round_contracts(&self, raw: Decimal) -> Decimal {
        let floored = if self.lot_sz > Decimal::ZERO {
            (raw / self.lot_sz).floor() * self.lot_sz
        } else {
            raw
        };
        floored.max(self.min_sz).normalize()
    }

    /// Round a price to the nearest tick
    pub fn round_price(&self, price: Decimal) -> Decimal {
        if self.tick_sz > Decimal::ZERO {
            ((price / self.tick_sz).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                * self.tick_sz)
                .normalize()
        } else {
            price
        }
    }

    /// Contracts for a USDT notional at `price`
    ///
    /// `notional / (price * ctVal)` floored to `lotSz` and raised to `minSz`.
    /// Returns `None` for a non-positive price or contract value.
    pub fn contracts_for(&self, notional: Decimal, price: Decimal) -> Option<Decimal> {
        let unit = price * self.ct_val;
        if unit <= Decimal::ZERO || notional <= Decimal::ZERO {
            return None;
        }
        Some(self.round_contracts(notional / unit))
    }

    pub fn quantity(&self, contracts: Decimal) -> Decimal {
        contracts * self.ct_val
    }
}

impl From<&Instrument> for ContractSpec {
    fn from(inst: &Instrument) -> Self {
        Self {
            ct_val: inst.ct_val,
            lot_sz: inst.lot_sz,
            min_sz: inst.min_sz,
            tick_sz: inst.tick_sz,
        }
    }
}
