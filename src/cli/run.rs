//! Run command implementation

use crate::app::{self, RunOutcome};
use crate::config::Config;
use clap::Args;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Force paper trading regardless of the configured mode
    #[arg(long)]
    pub paper: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        match app::run(config.clone(), self.paper).await? {
            RunOutcome::NoSymbols => tracing::info!("Nothing to trade"),
            RunOutcome::Stopped => {}
            RunOutcome::FeedEnded => anyhow::bail!("candle feed ended unexpectedly"),
        }
        Ok(())
    }
}
