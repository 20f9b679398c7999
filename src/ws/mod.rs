//! WebSocket client library
//!
//! Provides a reusable WebSocket client with automatic reconnection,
//! resubscription on reconnect, keepalive handling and configurable backoff.

mod client;
mod types;

pub use client::WsClient;
pub use types::{Keepalive, WsConfig, WsError, WsMessage};
