//! Discover command implementation

use crate::app::build_client;
use crate::config::Config;
use crate::market::discover_perps;
use clap::Args;

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Print the symbols as a JSON array
    #[arg(long)]
    pub json: bool,
}

impl DiscoverArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let client = build_client(config)?;
        let symbols = discover_perps(&client, &config.discovery).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&symbols)?);
        } else {
            for symbol in &symbols {
                println!("{}", symbol);
            }
            println!("{} tradable swaps", symbols.len());
        }
        Ok(())
    }
}
