//! Candle feed types

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A single OHLCV bar for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Instrument id (e.g., "BTC-USDT-SWAP")
    pub symbol: String,
    /// Bar open time
    pub ts: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Volume in contracts
    pub volume: Decimal,
    /// False while the bar is still forming
    pub confirmed: bool,
}

impl Candle {
    /// Build a candle from an OKX row `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]`
    ///
    /// REST and WebSocket share this layout. Rows shorter than five fields or
    /// with unparseable numbers are rejected. A missing `confirm` field is
    /// treated as a closed bar.
    pub fn from_row<S: AsRef<str>>(symbol: &str, row: &[S]) -> Option<Candle> {
        if row.len() < 5 {
            return None;
        }
        let millis: i64 = row[0].as_ref().parse().ok()?;
        let ts = Utc.timestamp_millis_opt(millis).single()?;
        let num = |i: usize| Decimal::from_str(row.get(i)?.as_ref()).ok();

        Some(Candle {
            symbol: symbol.to_string(),
            ts,
            open: num(1)?,
            high: num(2)?,
            low: num(3)?,
            close: num(4)?,
            volume: num(5).unwrap_or_default(),
            confirmed: row.get(8).map(|c| c.as_ref() == "1").unwrap_or(true),
        })
    }
}
