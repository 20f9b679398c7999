//! Entry limits and drawdown controls

use super::{PositionBook, RiskError, ShortPosition, VolatilityGate};
use crate::config::RiskConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Entry limits
#[derive(Debug, Clone)]
pub struct RiskLimits {
    /// Maximum concurrent positions
    pub max_concurrent_positions: usize,
    /// Drawdown from peak, in percent, that stops new entries and scale-ins
    pub drawdown_stop_pct: Decimal,
    /// Per-symbol margin cap after a scale-in, in percent of equity
    pub single_symbol_max_margin_pct: Decimal,
}

impl From<&RiskConfig> for RiskLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            max_concurrent_positions: config.max_concurrent_positions,
            drawdown_stop_pct: config.account_drawdown_stop_pct,
            single_symbol_max_margin_pct: config.single_symbol_max_margin_pct,
        }
    }
}

impl RiskLimits {
    /// Check whether a new short on `symbol` may be opened
    ///
    /// The volatility gate is consulted last since it may hit the network.
    pub async fn check_entry(
        &self,
        symbol: &str,
        book: &PositionBook,
        monitor: &DrawdownMonitor,
        gate: &VolatilityGate,
    ) -> Result<(), RiskError> {
        if book.get(symbol).is_some() {
            return Err(RiskError::AlreadyOpen(symbol.to_string()));
        }

        let open = book.active_count();
        if self.max_concurrent_positions > 0 && open >= self.max_concurrent_positions {
            return Err(RiskError::MaxPositionsReached {
                open,
                max: self.max_concurrent_positions,
            });
        }

        if monitor.should_halt(self.drawdown_stop_pct) {
            return Err(RiskError::DrawdownHalt(monitor.drawdown_pct().round_dp(2)));
        }

        if let Some((symbol, atr_pct)) = gate.extreme().await {
            return Err(RiskError::VolatilityHalt { symbol, atr_pct });
        }

        Ok(())
    }

    /// Check whether `position` may grow to `factor` times its size at `price`
    ///
    /// Margin is the enlarged notional divided by `leverage`, measured
    /// against the monitor's current equity.
    pub async fn check_scale_in(
        &self,
        position: &ShortPosition,
        price: Decimal,
        factor: Decimal,
        leverage: u32,
        monitor: &DrawdownMonitor,
        gate: &VolatilityGate,
    ) -> Result<(), RiskError> {
        if monitor.should_halt(self.drawdown_stop_pct) {
            return Err(RiskError::DrawdownHalt(monitor.drawdown_pct().round_dp(2)));
        }

        let cap = self.single_symbol_max_margin_pct;
        if cap > dec!(0) {
            let margin = position.quantity * factor * price / Decimal::from(leverage.max(1));
            let equity = monitor.current_equity;
            let margin_pct = if equity > dec!(0) {
                margin / equity * dec!(100)
            } else {
                Decimal::MAX
            };
            if margin_pct > cap {
                return Err(RiskError::MarginCapExceeded {
                    symbol: position.symbol.clone(),
                    margin_pct: margin_pct.round_dp(2),
                    max: cap,
                });
            }
        }

        if let Some((symbol, atr_pct)) = gate.extreme().await {
            return Err(RiskError::VolatilityHalt { symbol, atr_pct });
        }

        Ok(())
    }
}

/// Tracks the equity high-water mark
#[derive(Debug, Clone)]
pub struct DrawdownMonitor {
    /// Peak equity value
    pub peak_equity: Decimal,
    /// Current equity value
    pub current_equity: Decimal,
}

impl DrawdownMonitor {
    pub fn new(initial_equity: Decimal) -> Self {
        Self {
            peak_equity: initial_equity,
            current_equity: initial_equity,
        }
    }

    /// Update with new equity value
    pub fn update(&mut self, new_equity: Decimal) {
        self.current_equity = new_equity;
        if new_equity > self.peak_equity {
            self.peak_equity = new_equity;
        }
    }

    /// Drawdown from peak as a fraction
    pub fn current_drawdown(&self) -> Decimal {
        if self.peak_equity <= dec!(0) {
            return dec!(0);
        }
        ((self.peak_equity - self.current_equity) / self.peak_equity).max(dec!(0))
    }

    /// Drawdown from peak in percent
    pub fn drawdown_pct(&self) -> Decimal {
        self.current_drawdown() * dec!(100)
    }

    /// True once drawdown reaches `stop_pct` percent; 0 disables the stop
    pub fn should_halt(&self, stop_pct: Decimal) -> bool {
        stop_pct > dec!(0) && self.drawdown_pct() >= stop_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Fill, Side};
    use crate::risk::volatility::tests::StaticCandles;
    use chrono::Utc;
    use std::sync::Arc;

    fn limits() -> RiskLimits {
        RiskLimits {
            max_concurrent_positions: 2,
            drawdown_stop_pct: dec!(20),
            single_symbol_max_margin_pct: dec!(20),
        }
    }

    fn calm_gate() -> VolatilityGate {
        VolatilityGate::new(Arc::new(StaticCandles::flat(100.0, 1.0)), &RiskConfig::default())
    }

    fn fill(symbol: &str) -> Fill {
        Fill {
            order_id: "1".into(),
            symbol: symbol.into(),
            side: Side::Sell,
            price: dec!(10),
            contracts: dec!(1),
            quantity: dec!(1),
            fees: dec!(0),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_drawdown_monitor() {
        let mut monitor = DrawdownMonitor::new(dec!(1000));

        monitor.update(dec!(1100)); // New peak
        assert_eq!(monitor.peak_equity, dec!(1100));
        assert_eq!(monitor.current_drawdown(), dec!(0));

        monitor.update(dec!(990));
        assert_eq!(monitor.current_drawdown(), dec!(0.10));
        assert_eq!(monitor.drawdown_pct(), dec!(10));
    }

    #[test]
    fn test_halt_at_stop_level() {
        let mut monitor = DrawdownMonitor::new(dec!(1000));
        monitor.update(dec!(810));
        assert!(!monitor.should_halt(dec!(20)));
        monitor.update(dec!(800));
        assert!(monitor.should_halt(dec!(20)));
        assert!(!monitor.should_halt(dec!(0)));
    }

    #[tokio::test]
    async fn test_check_entry_passes() {
        let book = PositionBook::in_memory();
        let monitor = DrawdownMonitor::new(dec!(1000));
        assert!(limits()
            .check_entry("A-USDT-SWAP", &book, &monitor, &calm_gate())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_check_entry_already_open() {
        let mut book = PositionBook::in_memory();
        book.open("A-USDT-SWAP", &fill("A-USDT-SWAP"), dec!(10)).unwrap();
        let monitor = DrawdownMonitor::new(dec!(1000));
        let err = limits()
            .check_entry("A-USDT-SWAP", &book, &monitor, &calm_gate())
            .await
            .unwrap_err();
        assert_eq!(err, RiskError::AlreadyOpen("A-USDT-SWAP".into()));
    }

    #[tokio::test]
    async fn test_check_entry_max_positions() {
        let mut book = PositionBook::in_memory();
        book.open("A-USDT-SWAP", &fill("A-USDT-SWAP"), dec!(10)).unwrap();
        book.open("B-USDT-SWAP", &fill("B-USDT-SWAP"), dec!(10)).unwrap();
        let monitor = DrawdownMonitor::new(dec!(1000));
        let err = limits()
            .check_entry("C-USDT-SWAP", &book, &monitor, &calm_gate())
            .await
            .unwrap_err();
        assert_eq!(err, RiskError::MaxPositionsReached { open: 2, max: 2 });
    }

    #[tokio::test]
    async fn test_check_entry_drawdown_halt() {
        let book = PositionBook::in_memory();
        let mut monitor = DrawdownMonitor::new(dec!(1000));
        monitor.update(dec!(750));
        let err = limits()
            .check_entry("A-USDT-SWAP", &book, &monitor, &calm_gate())
            .await
            .unwrap_err();
        assert_eq!(err, RiskError::DrawdownHalt(dec!(25)));
    }

    #[tokio::test]
    async fn test_check_entry_volatility_halt() {
        let book = PositionBook::in_memory();
        let monitor = DrawdownMonitor::new(dec!(1000));
        let gate = VolatilityGate::new(
            Arc::new(StaticCandles::flat(100.0, 10.0)),
            &RiskConfig::default(),
        );
        let err = limits()
            .check_entry("A-USDT-SWAP", &book, &monitor, &gate)
            .await
            .unwrap_err();
        assert!(matches!(err, RiskError::VolatilityHalt { .. }));
    }

    /// 10 units short at 10, i.e. 100 notional
    fn short_position() -> ShortPosition {
        let mut book = PositionBook::in_memory();
        let mut f = fill("A-USDT-SWAP");
        f.contracts = dec!(10);
        f.quantity = dec!(10);
        let pos = book.open("A-USDT-SWAP", &f, dec!(10)).unwrap().clone();
        pos
    }

    #[tokio::test]
    async fn test_check_scale_in_passes() {
        let monitor = DrawdownMonitor::new(dec!(1000));
        // 10 * 1.5 * 12 / 5 = 36 margin, 3.6% of equity
        assert!(limits()
            .check_scale_in(&short_position(), dec!(12), dec!(1.5), 5, &monitor, &calm_gate())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_check_scale_in_drawdown_halt() {
        let mut monitor = DrawdownMonitor::new(dec!(1000));
        monitor.update(dec!(790));
        let err = limits()
            .check_scale_in(&short_position(), dec!(12), dec!(1.5), 5, &monitor, &calm_gate())
            .await
            .unwrap_err();
        assert_eq!(err, RiskError::DrawdownHalt(dec!(21)));
    }

    #[tokio::test]
    async fn test_check_scale_in_margin_cap() {
        let monitor = DrawdownMonitor::new(dec!(1000));
        // 10 * 1.5 * 80 / 5 = 240 margin, 24% of equity
        let err = limits()
            .check_scale_in(&short_position(), dec!(80), dec!(1.5), 5, &monitor, &calm_gate())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RiskError::MarginCapExceeded {
                symbol: "A-USDT-SWAP".into(),
                margin_pct: dec!(24),
                max: dec!(20),
            }
        );

        let uncapped = RiskLimits {
            single_symbol_max_margin_pct: dec!(0),
            ..limits()
        };
        assert!(uncapped
            .check_scale_in(&short_position(), dec!(80), dec!(1.5), 5, &monitor, &calm_gate())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_check_scale_in_volatility_halt() {
        let monitor = DrawdownMonitor::new(dec!(1000));
        let gate = VolatilityGate::new(
            Arc::new(StaticCandles::flat(100.0, 10.0)),
            &RiskConfig::default(),
        );
        let err = limits()
            .check_scale_in(&short_position(), dec!(12), dec!(1.5), 5, &monitor, &gate)
            .await
            .unwrap_err();
        assert!(matches!(err, RiskError::VolatilityHalt { .. }));
    }
}
