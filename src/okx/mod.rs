//! OKX v5 REST API
//!
//! Signed and public requests, response envelopes and the payload types
//! used by discovery, execution and the volatility gate.

mod auth;
mod client;
mod types;

pub use auth::{simulated_from_env, timestamp, Credentials};
pub use client::OkxClient;
pub use types::{
    AccountBalance, AlgoAck, CancelAlgoRequest, Instrument, OkxError, OrderAck, OrderRequest,
    RawPosition, SetLeverageRequest, StopLossRequest, Ticker, TrailingStopRequest,
};
