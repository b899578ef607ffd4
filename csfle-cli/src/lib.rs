//! Shared plumbing for the CSFLE demo binaries.

#![warn(clippy::pedantic, clippy::nursery)]

use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

/// Loads an optional `.env` file and installs the log subscriber.
///
/// Logs go to stderr, so stdout carries only command output. The filter
/// comes from `RUST_LOG` and defaults to `info`.
pub fn init() {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }
}

/// Logs a failed command once, with its cause chain, and maps the outcome
/// to the process exit status.
#[must_use]
pub fn exit_status(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
