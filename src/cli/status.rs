//! Status command implementation

use crate::config::Config;
use crate::risk::PositionBook;
use clap::Args;
use rust_decimal_macros::dec;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also list closed trades
    #[arg(long)]
    pub trades: bool,
}

impl StatusArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let book = PositionBook::load(&config.data.data_dir)?;
        let stats = book.stats();

        println!("perp-short status");
        println!("  Mode: {:?}", config.execution.mode);
        println!("  Data dir: {}", config.data.data_dir.display());
        println!("  Active positions: {}", stats.active);
        println!("  Closed trades: {}", stats.total_trades);
        println!("  Total P&L: {} USDT", stats.total_pnl.round_dp(4));
        println!("  Win rate: {}%", (stats.win_rate * dec!(100)).round_dp(1));

        let mut positions: Vec<_> = book.positions().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        for pos in positions {
            println!(
                "  {} short {} @ {} (anchor {}, additions {}, tp {}, sl {})",
                pos.symbol,
                pos.contracts,
                pos.avg_price.round_dp(8),
                pos.anchor_price,
                pos.additions,
                pos.algo_id.as_deref().unwrap_or("none"),
                pos.sl_algo_id.as_deref().unwrap_or("none"),
            );
        }

        if self.trades {
            for trade in book.trades() {
                println!(
                    "  {} {} exit {} pnl {} ({})",
                    trade.closed_at.format("%Y-%m-%d %H:%M"),
                    trade.position.symbol,
                    trade.exit_price,
                    trade.pnl.round_dp(4),
                    trade.reason,
                );
            }
        }
        Ok(())
    }
}
