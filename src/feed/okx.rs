//! OKX WebSocket candle feed implementation

use super::{Candle, CandleFeed};
use crate::config::FeedConfig;
use crate::telemetry::{increment_counter, CounterMetric};
use crate::ws::{WsClient, WsConfig, WsMessage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

/// Push or event frame from the business WebSocket
#[derive(Debug, Deserialize)]
struct OkxFrame {
    /// "subscribe", "error", ... on control frames
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    arg: Option<OkxArg>,
    #[serde(default)]
    data: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxArg {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    inst_id: String,
}

/// OKX WebSocket feed for the `candle1m` channel of many swaps
pub struct OkxCandleFeed {
    url: String,
    symbols: Vec<String>,
    config: FeedConfig,
}

impl OkxCandleFeed {
    /// Create a new feed for the given instruments
    pub fn new(url: impl Into<String>, symbols: Vec<String>, config: FeedConfig) -> Self {
        Self {
            url: url.into(),
            symbols,
            config,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Subscription frames, `subscribe_batch_size` args per frame
    fn subscription_frames(&self) -> Vec<String> {
        let batch = self.config.subscribe_batch_size.max(1);
        self.symbols
            .chunks(batch)
            .map(|chunk| {
                let args: Vec<_> = chunk
                    .iter()
                    .map(|sym| json!({ "channel": self.config.channel, "instId": sym }))
                    .collect();
                json!({ "op": "subscribe", "args": args }).to_string()
            })
            .collect()
    }

    /// Parse a text frame into zero or more candles
    fn parse_message(msg: &str) -> Vec<Candle> {
        if msg == "pong" {
            return vec![];
        }

        let frame: OkxFrame = match serde_json::from_str(msg) {
            Ok(f) => f,
            Err(_) => return vec![],
        };

        if let Some(event) = frame.event.as_deref() {
            match event {
                "error" => tracing::error!(
                    code = frame.code.as_deref().unwrap_or_default(),
                    msg = frame.msg.as_deref().unwrap_or_default(),
                    "OKX WebSocket error event"
                ),
                "subscribe" => {
                    if let Some(arg) = &frame.arg {
                        tracing::debug!(channel = %arg.channel, inst_id = %arg.inst_id, "Subscribed");
                    }
                }
                other => tracing::debug!(event = other, "OKX WebSocket event"),
            }
            return vec![];
        }

        let (Some(arg), Some(rows)) = (frame.arg, frame.data) else {
            return vec![];
        };
        if !arg.channel.starts_with("candle") || arg.inst_id.is_empty() {
            return vec![];
        }

        rows.iter()
            .filter_map(|row| Candle::from_row(&arg.inst_id, row.as_slice()))
            .collect()
    }

    /// Run the message processing loop
    async fn run_message_loop(
        mut ws_rx: mpsc::Receiver<WsMessage>,
        candle_tx: mpsc::Sender<Candle>,
    ) {
        while let Some(msg) = ws_rx.recv().await {
            match msg {
                WsMessage::Text(text) => {
                    for candle in Self::parse_message(&text) {
                        increment_counter(CounterMetric::FeedMessages);
                        if candle_tx.send(candle).await.is_err() {
                            tracing::debug!("Candle receiver dropped, stopping feed");
                            return;
                        }
                    }
                }
                WsMessage::Connected => {
                    tracing::info!("OKX candle feed connected");
                }
                WsMessage::Disconnected => {
                    tracing::warn!("OKX candle feed disconnected");
                    break;
                }
                WsMessage::Reconnecting { attempt } => {
                    tracing::warn!(attempt, "OKX candle feed reconnecting...");
                }
                WsMessage::Binary(_) => {}
            }
        }
    }
}

#[async_trait]
impl CandleFeed for OkxCandleFeed {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<Candle>> {
        let (candle_tx, candle_rx) = mpsc::channel(self.config.buffer_size.max(1));
        let frames = self.subscription_frames();

        tracing::info!(
            url = %self.url,
            symbols = self.symbols.len(),
            frames = frames.len(),
            channel = %self.config.channel,
            "Subscribing to OKX candle feed"
        );

        let config = WsConfig::new(self.url.clone())
            .max_reconnects(self.config.max_reconnects)
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(60))
            .ping_interval(Duration::from_secs(self.config.ping_interval_secs.max(1)))
            .text_keepalive("ping", "pong")
            .on_connect(frames)
            .buffer_size(self.config.buffer_size);

        let client = WsClient::new(config);
        let ws_rx = client.connect();

        tokio::spawn(async move {
            Self::run_message_loop(ws_rx, candle_tx).await;
        });

        Ok(candle_rx)
    }
}
