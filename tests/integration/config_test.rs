//! Configuration loading

use perp_short::config::{Config, ExecutionMode};
use rust_decimal_macros::dec;

#[test]
fn test_shipped_config_loads() {
    let config = Config::from_toml(include_str!("../../config.toml.example")).unwrap();
    assert_eq!(config.feed.window_minutes, 6);
    assert_eq!(config.feed.channel, "candle1m");
    assert_eq!(config.stats.sigma_threshold, 3.0);
    assert_eq!(config.strategy.trailing_activation, dec!(0.01));
    assert_eq!(config.strategy.trailing_callback, dec!(0.002));
    assert_eq!(config.strategy.scale_in_trigger, dec!(0.03));
    assert_eq!(config.strategy.scale_in_factor, dec!(1.5));
    assert_eq!(config.strategy.max_additions, 4);
    assert_eq!(config.execution.mode, ExecutionMode::Paper);
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml = r#"
        [strategy]
        notional_usdt = 50

        [execution]
        mode = "live"

        [telemetry]
        log_level = "debug"
    "#;

    let config = Config::from_toml(toml).unwrap();
    assert_eq!(config.strategy.notional_usdt, dec!(50));
    assert_eq!(config.strategy.poll_interval_secs, 60);
    assert_eq!(config.discovery.settle_ccy, "USDT");
    assert_eq!(config.risk.volatility_refs.len(), 2);
    assert_eq!(config.execution.mode, ExecutionMode::Live);
}

#[test]
fn test_config_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, include_str!("../../config.toml.example")).unwrap();
    assert!(Config::load(&path).is_ok());
    assert!(Config::load(dir.path().join("missing.toml")).is_err());
}
