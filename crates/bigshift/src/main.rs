//! BigShift CLI - Main entry point

use anyhow::Context;
use bigshift::{Cli, Pipeline};
use bigshift_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use clap::Parser;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("bigshift")
        .build();

    // LOG_* variables take precedence over flags
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    if let Err(e) = init_logging(&log_config) {
        eprintln!("Warning: logging disabled: {e:#}");
    }

    if let Err(e) = run(cli).await {
        error!(error = %e, "Migration failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = cli.resolve()?;
    let components = settings
        .connect()
        .await
        .context("Failed to connect to the source and destination services")?;

    Pipeline::new(settings.pipeline, components)
        .run()
        .await
        .context("Migration aborted")?;
    Ok(())
}
