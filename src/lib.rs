pub mod cli;
pub mod commands;
pub mod error;
pub mod models;
pub mod services;

use clap::Parser;
use cli::Cli;
use models::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber; `RUST_LOG` overrides the configured level
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second call (tests, embedding) keeps the first subscriber
    let _ = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

pub async fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let mut config = cli::resolve_config(&cli)?;
    if cli.json_logs {
        config.logging.json = true;
    }
    init_tracing(&config.logging);

    tracing::debug!(server = %config.server.base_url, uuid = %config.kiosk.uuid, "configuration loaded");
    cli::dispatch(cli, config).await
}
