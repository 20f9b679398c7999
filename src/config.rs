//! Configuration types for perp-short

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// Config file is not valid TOML for [`Config`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of its allowed range
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub data: DataConfig,
    pub telemetry: TelemetryConfig,
}

/// OKX endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    /// REST base URL
    #[serde(default = "default_rest_base")]
    pub rest_base: String,
    /// Live WebSocket URL carrying the candle channels
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Demo-trading WebSocket URL
    #[serde(default = "default_demo_ws_url")]
    pub demo_ws_url: String,
    /// Route everything through demo trading
    #[serde(default)]
    pub simulated: bool,
    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_rest_base() -> String {
    "https://www.okx.com".to_string()
}
fn default_ws_url() -> String {
    "wss://ws.okx.com:8443/ws/v5/business".to_string()
}
fn default_demo_ws_url() -> String {
    "wss://wspap.okx.com:8443/ws/v5/business".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_base: default_rest_base(),
            ws_url: default_ws_url(),
            demo_ws_url: default_demo_ws_url(),
            simulated: false,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ExchangeConfig {
    /// WebSocket URL matching the trading environment
    pub fn effective_ws_url(&self) -> &str {
        if self.simulated {
            &self.demo_ws_url
        } else {
            &self.ws_url
        }
    }
}

/// Instrument discovery filters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Settlement currency to keep
    #[serde(default = "default_settle_ccy")]
    pub settle_ccy: String,
    /// If non-empty, only these instruments are traded
    #[serde(default)]
    pub include: Vec<String>,
    /// Instruments never traded
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Cap on the number of symbols (0 = unlimited)
    #[serde(default)]
    pub max_symbols: usize,
}

fn default_settle_ccy() -> String {
    "USDT".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            settle_ccy: default_settle_ccy(),
            include: vec![],
            exclude: vec![],
            max_symbols: 0,
        }
    }
}

/// Candle feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// Number of 1-minute closes kept per symbol (6 = a 5-minute return)
    #[serde(default = "default_window_minutes")]
    pub window_minutes: usize,
    /// Candle channel name
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Subscription args per frame
    #[serde(default = "default_subscribe_batch_size")]
    pub subscribe_batch_size: usize,
    /// Maximum reconnection attempts (0 = infinite)
    #[serde(default)]
    pub max_reconnects: u32,
    /// Text keepalive interval, must stay under the 30s server idle limit
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Candle channel buffer size
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_window_minutes() -> usize {
    6
}
fn default_channel() -> String {
    "candle1m".to_string()
}
fn default_subscribe_batch_size() -> usize {
    100
}
fn default_ping_interval_secs() -> u64 {
    25
}
fn default_buffer_size() -> usize {
    4096
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            channel: default_channel(),
            subscribe_batch_size: default_subscribe_batch_size(),
            max_reconnects: 0,
            ping_interval_secs: default_ping_interval_secs(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Streaming statistics configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsConfig {
    /// Standard deviations above the mean that count as anomalous
    #[serde(default = "default_sigma_threshold")]
    pub sigma_threshold: f64,
    /// Samples required before a return can be flagged
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,
}

fn default_sigma_threshold() -> f64 {
    3.0
}
fn default_min_samples() -> u64 {
    30
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            sigma_threshold: default_sigma_threshold(),
            min_samples: default_min_samples(),
        }
    }
}

/// Entry, scale-in and take-profit parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Seconds between engine ticks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Notional of the initial short in USDT
    pub notional_usdt: Decimal,
    /// Isolated leverage for new positions
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Trade mode: "isolated" or "cross"
    #[serde(default = "default_td_mode")]
    pub td_mode: String,
    /// Favourable move that activates the trailing take-profit
    #[serde(default = "default_trailing_activation")]
    pub trailing_activation: Decimal,
    /// Callback ratio of the trailing take-profit
    #[serde(default = "default_trailing_callback")]
    pub trailing_callback: Decimal,
    /// Adverse move from the anchor that triggers a scale-in
    #[serde(default = "default_scale_in_trigger")]
    pub scale_in_trigger: Decimal,
    /// Position multiplier applied on each scale-in
    #[serde(default = "default_scale_in_factor")]
    pub scale_in_factor: Decimal,
    /// Maximum scale-ins per position
    #[serde(default = "default_max_additions")]
    pub max_additions: u32,
    /// Adverse move above the average entry, in percent, that closes the
    /// short at market (0 = no stop-loss)
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
}

fn default_poll_interval_secs() -> u64 {
    60
}
fn default_leverage() -> u32 {
    5
}
fn default_td_mode() -> String {
    "isolated".to_string()
}
fn default_trailing_activation() -> Decimal {
    Decimal::new(1, 2) // 1%
}
fn default_trailing_callback() -> Decimal {
    Decimal::new(2, 3) // 0.2%
}
fn default_scale_in_trigger() -> Decimal {
    Decimal::new(3, 2) // 3%
}
fn default_scale_in_factor() -> Decimal {
    Decimal::new(15, 1) // x1.5
}
fn default_max_additions() -> u32 {
    4
}
fn default_stop_loss_pct() -> Decimal {
    Decimal::new(30, 0)
}

/// Risk management configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: usize,
    /// Account drawdown from the high-water mark that halts entries (percent)
    #[serde(default = "default_drawdown_stop_pct")]
    pub account_drawdown_stop_pct: Decimal,
    /// 1H ATR in percent above which entries are blocked
    #[serde(default = "default_atr_threshold_pct")]
    pub atr_threshold_pct: f64,
    /// ATR lookback in hourly bars
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    /// Instruments whose volatility gates new entries
    #[serde(default = "default_volatility_refs")]
    pub volatility_refs: Vec<String>,
    /// How long a volatility reading is reused
    #[serde(default = "default_regime_cache_secs")]
    pub regime_cache_secs: u64,
    /// Margin of one symbol after a scale-in, as percent of equity, above
    /// which the scale-in is refused (0 = no cap)
    #[serde(default = "default_single_symbol_max_margin_pct")]
    pub single_symbol_max_margin_pct: Decimal,
}

fn default_max_concurrent_positions() -> usize {
    3
}
fn default_drawdown_stop_pct() -> Decimal {
    Decimal::new(20, 0)
}
fn default_atr_threshold_pct() -> f64 {
    6.0
}
fn default_atr_period() -> usize {
    24
}
fn default_volatility_refs() -> Vec<String> {
    vec!["BTC-USDT-SWAP".to_string(), "ETH-USDT-SWAP".to_string()]
}
fn default_regime_cache_secs() -> u64 {
    300
}
fn default_single_symbol_max_margin_pct() -> Decimal {
    Decimal::new(20, 0)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_concurrent_positions: default_max_concurrent_positions(),
            account_drawdown_stop_pct: default_drawdown_stop_pct(),
            atr_threshold_pct: default_atr_threshold_pct(),
            atr_period: default_atr_period(),
            volatility_refs: default_volatility_refs(),
            regime_cache_secs: default_regime_cache_secs(),
            single_symbol_max_margin_pct: default_single_symbol_max_margin_pct(),
        }
    }
}

/// Execution engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Taker fee charged by the paper engine
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Starting equity of the paper engine
    #[serde(default = "default_initial_bankroll")]
    pub initial_bankroll: Decimal,
}

fn default_fee_rate() -> Decimal {
    Decimal::new(5, 4) // 0.05%
}
fn default_initial_bankroll() -> Decimal {
    Decimal::new(1000, 0)
}

/// Execution mode: paper trading or live
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Paper,
    Live,
}

/// Local storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormatSetting,
    /// Prometheus exporter port (0 = disabled)
    #[serde(default)]
    pub metrics_port: u16,
}

/// Log output format as written in the config file
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    #[default]
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to the built-in configuration only when
    /// the file does not exist
    pub fn load_or_builtin(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::builtin(),
            other => other,
        }
    }

    /// Built-in configuration shipped with the binary
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml(include_str!("../config.toml.example"))
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.window_minutes < 2 {
            return Err(ConfigError::Invalid {
                field: "feed.window_minutes",
                reason: "a return needs at least two closes".into(),
            });
        }
        if self.feed.subscribe_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "feed.subscribe_batch_size",
                reason: "must be positive".into(),
            });
        }
        if self.strategy.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "strategy.poll_interval_secs",
                reason: "must be positive".into(),
            });
        }
        if self.strategy.leverage == 0 {
            return Err(ConfigError::Invalid {
                field: "strategy.leverage",
                reason: "must be at least 1".into(),
            });
        }
        if self.strategy.notional_usdt <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "strategy.notional_usdt",
                reason: "must be positive".into(),
            });
        }
        if self.strategy.scale_in_factor <= Decimal::ONE {
            return Err(ConfigError::Invalid {
                field: "strategy.scale_in_factor",
                reason: "must be greater than 1".into(),
            });
        }
        if self.strategy.stop_loss_pct < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "strategy.stop_loss_pct",
                reason: "must not be negative".into(),
            });
        }
        if self.stats.sigma_threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "stats.sigma_threshold",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}
