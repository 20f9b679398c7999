//! Risk management types

use rust_decimal::Decimal;
use thiserror::Error;

/// Reasons an entry or scale-in is refused
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// Maximum concurrent positions reached
    #[error("Maximum positions reached ({open}/{max})")]
    MaxPositionsReached { open: usize, max: usize },
    /// A position on this symbol is already open
    #[error("Position already open on {0}")]
    AlreadyOpen(String),
    /// Account drawdown at or above the stop level
    #[error("Trading halted: drawdown {0}% at or above stop")]
    DrawdownHalt(Decimal),
    /// A scale-in would push one symbol's margin over its share of equity
    #[error("{symbol} margin would reach {margin_pct}% of equity, cap {max}%")]
    MarginCapExceeded {
        symbol: String,
        margin_pct: Decimal,
        max: Decimal,
    },
    /// A reference instrument is too volatile
    #[error("Trading halted: {symbol} ATR {atr_pct:.2}% above threshold")]
    VolatilityHalt { symbol: String, atr_pct: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_risk_error_display() {
        let err = RiskError::MaxPositionsReached { open: 3, max: 3 };
        assert_eq!(err.to_string(), "Maximum positions reached (3/3)");

        let err = RiskError::VolatilityHalt {
            symbol: "BTC-USDT-SWAP".into(),
            atr_pct: 6.5,
        };
        assert_eq!(
            err.to_string(),
            "Trading halted: BTC-USDT-SWAP ATR 6.50% above threshold"
        );

        let err = RiskError::MarginCapExceeded {
            symbol: "PEPE-USDT-SWAP".into(),
            margin_pct: dec!(24.5),
            max: dec!(20),
        };
        assert_eq!(
            err.to_string(),
            "PEPE-USDT-SWAP margin would reach 24.5% of equity, cap 20%"
        );

        let err = RiskError::DrawdownHalt(dec!(21.5));
        assert_eq!(err.to_string(), "Trading halted: drawdown 21.5% at or above stop");
    }
}
