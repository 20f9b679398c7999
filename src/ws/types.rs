//! WebSocket types and configuration

use std::time::Duration;
use thiserror::Error;

/// How the connection is kept alive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keepalive {
    /// Protocol-level ping frames, answered by pong frames
    Frame,
    /// Application-level text ping; the server answers with `pong` text
    Text { ping: String, pong: String },
}

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL to connect to
    pub url: String,
    /// Maximum reconnection attempts before giving up (0 = infinite)
    pub max_reconnect_attempts: u32,
    /// Initial delay before first reconnection attempt
    pub initial_reconnect_delay: Duration,
    /// Maximum delay between reconnection attempts
    pub max_reconnect_delay: Duration,
    /// Interval between keepalive pings
    pub ping_interval: Duration,
    pub keepalive: Keepalive,
    /// Frames sent after every successful (re)connect, e.g. subscriptions
    pub on_connect: Vec<String>,
    /// Message channel capacity
    pub buffer_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 10,
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
            keepalive: Keepalive::Frame,
            on_connect: vec![],
            buffer_size: 1024,
        }
    }
}

impl WsConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set maximum reconnection attempts
    pub fn max_reconnects(mut self, n: u32) -> Self {
        self.max_reconnect_attempts = n;
        self
    }

    /// Set initial reconnection delay
    pub fn initial_delay(mut self, d: Duration) -> Self {
        self.initial_reconnect_delay = d;
        self
    }

    /// Set maximum reconnection delay
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_reconnect_delay = d;
        self
    }

    /// Set ping interval
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }

    /// Use a text ping such as OKX's `"ping"`/`"pong"`
    pub fn text_keepalive(mut self, ping: impl Into<String>, pong: impl Into<String>) -> Self {
        self.keepalive = Keepalive::Text {
            ping: ping.into(),
            pong: pong.into(),
        };
        self
    }

    /// Frames to (re)send right after connecting
    pub fn on_connect(mut self, frames: Vec<String>) -> Self {
        self.on_connect = frames;
        self
    }

    pub fn buffer_size(mut self, n: usize) -> Self {
        self.buffer_size = n.max(1);
        self
    }
}

/// WebSocket message types
#[derive(Debug, Clone)]
pub enum WsMessage {
    /// Text message
    Text(String),
    /// Binary message
    Binary(Vec<u8>),
    /// Connection established and on-connect frames sent
    Connected,
    /// Connection closed
    Disconnected,
    /// Reconnecting after failure
    Reconnecting { attempt: u32 },
}

/// WebSocket errors
#[derive(Debug, Clone, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Maximum reconnection attempts exceeded")]
    MaxReconnectsExceeded,
    #[error("Channel closed")]
    ChannelClosed,
    #[error("Send failed: {0}")]
    SendFailed(String),
    /// No pong arrived before the next keepalive tick
    #[error("Keepalive timed out")]
    KeepaliveTimeout,
}
