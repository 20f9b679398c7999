//! OKX v5 REST payloads

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// OKX REST errors
#[derive(Debug, Error)]
pub enum OkxError {
    /// Exchange rejected the request
    #[error("OKX API error [{code}]: {msg}")]
    Api { code: String, msg: String },
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success status without a parseable envelope
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    /// Response body did not match the expected shape
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    /// Private endpoint called without credentials
    #[error("missing OKX API credentials")]
    MissingCredentials,
    /// Secret key cannot be used as an HMAC key
    #[error("invalid signing key")]
    InvalidKey,
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("instrument not found: {0}")]
    InstrumentNotFound(String),
    /// Endpoint answered with an empty data array
    #[error("empty response from {0}")]
    EmptyResponse(String),
}

/// Response envelope shared by every v5 endpoint
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

/// OKX encodes numbers as strings and uses "" for absent values
fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if raw.trim().is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(raw.trim())
        .or_else(|_| Decimal::from_scientific(raw.trim()))
        .map_err(serde::de::Error::custom)
}

/// A tradable instrument from `/api/v5/public/instruments`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub inst_id: String,
    pub inst_type: String,
    #[serde(default)]
    pub settle_ccy: String,
    /// "linear" or "inverse"
    #[serde(default)]
    pub ct_type: String,
    /// "live", "suspend", "preopen", ...
    pub state: String,
    /// Contract value in base currency
    #[serde(deserialize_with = "lenient_decimal")]
    pub ct_val: Decimal,
    /// Order size increment in contracts
    #[serde(deserialize_with = "lenient_decimal")]
    pub lot_sz: Decimal,
    /// Minimum order size in contracts
    #[serde(deserialize_with = "lenient_decimal")]
    pub min_sz: Decimal,
    /// Price increment
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub tick_sz: Decimal,
}

/// `/api/v5/market/ticker`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub inst_id: String,
    #[serde(deserialize_with = "lenient_decimal")]
    pub last: Decimal,
}

/// `/api/v5/account/balance`, first element
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    #[serde(deserialize_with = "lenient_decimal")]
    pub total_eq: Decimal,
}

/// `/api/v5/account/positions`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    pub inst_id: String,
    /// "long", "short" or "net"
    #[serde(default)]
    pub pos_side: String,
    /// Contracts; negative for a net-mode short
    #[serde(deserialize_with = "lenient_decimal")]
    pub pos: Decimal,
    #[serde(deserialize_with = "lenient_decimal")]
    pub avg_px: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub upl: Decimal,
}

impl RawPosition {
    /// Whether this entry is a short holding
    pub fn is_short(&self) -> bool {
        match self.pos_side.as_str() {
            "short" => !self.pos.is_zero(),
            "net" | "" => self.pos < Decimal::ZERO,
            _ => false,
        }
    }
}

/// Body of `/api/v5/account/set-leverage`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLeverageRequest {
    pub inst_id: String,
    pub lever: String,
    pub mgn_mode: String,
    pub pos_side: String,
}

/// Body of `/api/v5/trade/order`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub inst_id: String,
    pub td_mode: String,
    pub side: String,
    pub pos_side: String,
    pub ord_type: String,
    pub sz: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
}

/// Body of `/api/v5/trade/order-algo` for a trailing stop
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailingStopRequest {
    pub inst_id: String,
    pub td_mode: String,
    pub side: String,
    pub pos_side: String,
    /// Always "move_order_stop"
    pub ord_type: String,
    pub sz: String,
    pub callback_ratio: String,
    pub active_px: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algo_cl_ord_id: Option<String>,
}

/// Body of `/api/v5/trade/order-algo` for a conditional stop-loss
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopLossRequest {
    pub inst_id: String,
    pub td_mode: String,
    pub side: String,
    pub pos_side: String,
    /// Always "conditional"
    pub ord_type: String,
    pub sz: String,
    pub sl_trigger_px: String,
    /// "-1" closes at market
    pub sl_ord_px: String,
    pub sl_trigger_px_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algo_cl_ord_id: Option<String>,
}

/// One entry of the `/api/v5/trade/cancel-algos` body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAlgoRequest {
    pub inst_id: String,
    pub algo_id: String,
}

/// Per-order acknowledgement
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    #[serde(default)]
    pub ord_id: String,
    #[serde(default)]
    pub cl_ord_id: String,
    #[serde(default)]
    pub s_code: String,
    #[serde(default)]
    pub s_msg: String,
}

/// Per-algo-order acknowledgement
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgoAck {
    #[serde(default)]
    pub algo_id: String,
    #[serde(default)]
    pub s_code: String,
    #[serde(default)]
    pub s_msg: String,
}

/// Turn a rejected per-item status into an error
pub fn check_item(s_code: &str, s_msg: &str) -> Result<(), OkxError> {
    if s_code.is_empty() || s_code == "0" {
        Ok(())
    } else {
        Err(OkxError::Api {
            code: s_code.to_string(),
            msg: s_msg.to_string(),
        })
    }
}
