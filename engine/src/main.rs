// Roster query engine
// Main entry point for the roster binary

use clap::Parser;
use roster_engine::cli::{Cli, Command};
use roster_engine::config::Config;
use roster_engine::handlers::{
    handle_ask, handle_chat, handle_history, handle_import, handle_status, OutputFormat,
};
use roster_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log beats the config file; RUST_LOG beats both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Roster v{} ({} - {})", version, commit, timestamp);

    match cli.command {
        Command::Ask { text, session } => {
            tracing::info!("Answering: {}", text);
            handle_ask(text, session, &config, format).await
        }

        Command::Chat { session } => handle_chat(session, &config, format).await,

        Command::Import { file } => {
            tracing::info!("Importing roster from {}", file.display());
            handle_import(file, &config, format).await
        }

        Command::Status => {
            tracing::info!("Checking provider health...");
            handle_status(&config, format).await
        }

        Command::History { limit } => {
            tracing::info!("Showing last {} queries", limit);
            handle_history(limit, &config, format).await
        }
    }
}
