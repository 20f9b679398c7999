//! CLI interface for perp-short
//!
//! Provides subcommands for:
//! - `run`: Start the trading loop
//! - `discover`: List tradable swaps
//! - `status`: Show the local position book
//! - `config`: Show the effective configuration

mod discover;
mod run;
mod status;

pub use discover::DiscoverArgs;
pub use run::RunArgs;
pub use status::StatusArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "perp-short")]
#[command(about = "Shorts anomalous spikes on OKX USDT perpetual swaps")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start trading (paper or live per config)
    Run(RunArgs),
    /// List tradable USDT perpetual swaps
    Discover(DiscoverArgs),
    /// Show positions and trade statistics
    Status(StatusArgs),
    /// Show the effective configuration
    Config,
}
