use anyhow::Context;
use clap::Parser;
use perp_short::cli::{Cli, Commands};
use perp_short::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials may live in a local .env file
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if !std::path::Path::new(&cli.config).exists() {
        eprintln!("Warning: {} not found, using built-in configuration", cli.config);
    }
    let config = Config::load_or_builtin(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config))?;

    let _telemetry = perp_short::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(paper = args.paper, "Starting trading loop");
            args.execute(&config).await?;
        }
        Commands::Discover(args) => args.execute(&config).await?,
        Commands::Status(args) => args.execute(&config).await?,
        Commands::Config => {
            println!("# Effective configuration");
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
