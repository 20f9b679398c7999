//! Perpetual swap discovery

use crate::config::DiscoveryConfig;
use crate::okx::{Instrument, OkxClient, OkxError};

/// Keep live linear swaps settled in the configured currency
///
/// The allow-list applies first (when non-empty), then the deny-list, then
/// the `max_symbols` cap on the sorted, de-duplicated result.
pub fn filter_instruments(instruments: &[Instrument], config: &DiscoveryConfig) -> Vec<String> {
    let suffix = format!("-{}-SWAP", config.settle_ccy);

    let mut symbols: Vec<String> = instruments
        .iter()
        .filter(|i| i.state == "live")
        .filter(|i| i.settle_ccy == config.settle_ccy)
        .filter(|i| i.inst_id.ends_with(&suffix))
        .filter(|i| i.ct_type == "linear")
        .filter(|i| config.include.is_empty() || config.include.contains(&i.inst_id))
        .filter(|i| !config.exclude.contains(&i.inst_id))
        .map(|i| i.inst_id.clone())
        .collect();

    symbols.sort();
    symbols.dedup();
    if config.max_symbols > 0 {
        symbols.truncate(config.max_symbols);
    }
    symbols
}

/// Fetch every SWAP instrument and return the tradable ones
pub async fn discover_perps(
    client: &OkxClient,
    config: &DiscoveryConfig,
) -> Result<Vec<String>, OkxError> {
    let instruments = client.instruments("SWAP", None).await?;
    let symbols = filter_instruments(&instruments, config);
    tracing::info!(
        instruments = instruments.len(),
        tradable = symbols.len(),
        settle_ccy = %config.settle_ccy,
        "Discovered perpetual swaps"
    );
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn inst(id: &str, settle: &str, ct_type: &str, state: &str) -> Instrument {
        Instrument {
            inst_id: id.to_string(),
            inst_type: "SWAP".to_string(),
            settle_ccy: settle.to_string(),
            ct_type: ct_type.to_string(),
            state: state.to_string(),
            ct_val: dec!(1),
            lot_sz: dec!(1),
            min_sz: dec!(1),
            tick_sz: dec!(0.01),
        }
    }

    fn universe() -> Vec<Instrument> {
        vec![
            inst("ETH-USDT-SWAP", "USDT", "linear", "live"),
            inst("BTC-USDT-SWAP", "USDT", "linear", "live"),
            inst("BTC-USD-SWAP", "BTC", "inverse", "live"),
            inst("LUNA-USDT-SWAP", "USDT", "linear", "suspend"),
            inst("BTC-USDC-SWAP", "USDC", "linear", "live"),
            inst("ETH-USDT-SWAP", "USDT", "linear", "live"),
            inst("DOGE-USDT-SWAP", "USDT", "linear", "live"),
        ]
    }

    #[test]
    fn test_filter_keeps_live_linear_usdt() {
        let symbols = filter_instruments(&universe(), &DiscoveryConfig::default());
        assert_eq!(symbols, vec!["BTC-USDT-SWAP", "DOGE-USDT-SWAP", "ETH-USDT-SWAP"]);
    }

    #[test]
    fn test_filter_include_and_exclude() {
        let config = DiscoveryConfig {
            include: vec!["BTC-USDT-SWAP".into(), "ETH-USDT-SWAP".into(), "LUNA-USDT-SWAP".into()],
            exclude: vec!["ETH-USDT-SWAP".into()],
            ..DiscoveryConfig::default()
        };
        assert_eq!(filter_instruments(&universe(), &config), vec!["BTC-USDT-SWAP"]);
    }

    #[test]
    fn test_filter_max_symbols() {
        let config = DiscoveryConfig {
            max_symbols: 2,
            ..DiscoveryConfig::default()
        };
        assert_eq!(
            filter_instruments(&universe(), &config),
            vec!["BTC-USDT-SWAP", "DOGE-USDT-SWAP"]
        );
    }

    #[test]
    fn test_filter_empty() {
        assert!(filter_instruments(&[], &DiscoveryConfig::default()).is_empty());
    }
}
