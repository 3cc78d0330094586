use std::io;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use copurchase_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so stdout carries only the command's JSON payload.
fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.logging.level)
        .map_err(|error| anyhow!("invalid logging.level `{}`: {error}", config.logging.level))?;
    let builder =
        tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow!(error))
}

fn main() -> ExitCode {
    // Configuration errors are reported by the command itself as JSON.
    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        if let Err(error) = init_logging(&config) {
            eprintln!("logging disabled: {error:#}");
        }
    }

    copurchase_cli::run()
}
