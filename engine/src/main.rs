// Waypoint travel assistant
// Main entry point for the waypoint binary

use anyhow::Context;
use clap::Parser;
use waypoint_engine::cli::{Cli, Command};
use waypoint_engine::config::Config;
use waypoint_engine::handlers::{
    handle_ask, handle_card, handle_chat, handle_discover, handle_serve, handle_specialist,
    OutputFormat,
};
use waypoint_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let loaded = match &cli.config {
        Some(config_path) => Config::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display())),
        None => Config::load_or_create().context("Failed to load config"),
    };

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            init_telemetry();
            tracing::error!("{:#}", e);
            return Err(e);
        }
    };

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");
    tracing::info!("Waypoint v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Ask { text, conversation } => {
            tracing::debug!("Asking: {}", text);
            handle_ask(text, conversation, &config, format).await
        }

        Command::Chat { conversation } => handle_chat(conversation, &config, format).await,

        Command::Serve => {
            tracing::info!("Starting host on {}", config.host.bind);
            handle_serve(&config).await
        }

        Command::Specialist { domain } => {
            tracing::info!("Starting {} specialist", domain);
            handle_specialist(domain, &config).await
        }

        Command::Discover { url } => {
            tracing::info!("Discovering specialist at {}", url);
            handle_discover(url, &config, format).await
        }

        Command::Card => handle_card(&config, format),
    }
}
