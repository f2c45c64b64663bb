use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tour_service::config::Config;
use tour_service::observability::init_tracing;
use tour_service::seed;
use tour_service::server::Server;
use tour_service::state::AppState;

const REDACTED: &str = "********";

/// tour-service - tour booking API and website
#[derive(Parser)]
#[command(name = "tour-service")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Read configuration from this file instead of the standard locations
    #[arg(long, global = true, env = "TOURS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Import tours.json, users.json and reviews.json from this directory first
        #[arg(long, value_name = "DIR")]
        seed: Option<PathBuf>,
    },
    /// Print the resolved configuration with secrets masked
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::load().context("loading configuration")?,
    };
    Ok(config)
}

async fn serve(config: Config, seed_dir: Option<PathBuf>) -> anyhow::Result<()> {
    init_tracing(&config)?;

    let state = AppState::builder()
        .config(config)
        .build()
        .await
        .context("building application state")?;

    if let Some(dir) = seed_dir {
        seed::import_dir(&state, &dir)
            .await
            .with_context(|| format!("importing development data from {}", dir.display()))?;
    }

    Server::new(state).serve().await?;
    Ok(())
}

fn check_config(mut config: Config) -> anyhow::Result<()> {
    config.jwt.secret = REDACTED.to_string();
    if !config.payment.stripe_secret_key.is_empty() {
        config.payment.stripe_secret_key = REDACTED.to_string();
    }
    if config.email.webhook_token.is_some() {
        config.email.webhook_token = Some(REDACTED.to_string());
    }

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Serve { seed } => serve(config, seed).await,
        Commands::CheckConfig => check_config(config),
    }
}
