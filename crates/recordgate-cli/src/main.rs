//! recordgate command-line tool.
//!
//! Counts, prints, deletes and indexes documents in any collection reachable
//! through a configured connection.

mod commands;
mod config;

use clap::Parser;
use recordgate::Gateway;
use tracing::debug;

use crate::config::CliConfig;

/// Initializes the tracing subscriber. Logs go to stderr; stdout carries
/// command output.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("recordgate={},recordgate_cli={}", level, level))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let registry = config.registry()?;
    debug!(connections = ?registry.names(), "Loaded connection registry");
    let gateway = Gateway::new(registry);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    commands::run(&config.command, &gateway, &mut out).await
}
