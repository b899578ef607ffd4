//! Reads patients back through a plain and an encryption-aware client.

#![warn(clippy::pedantic, clippy::nursery)]

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use csfle::config::{DemoConfig, EncryptedSettings, ProcessEnv};
use csfle_kms_aws::AwsKmsCredentials;
use tracing::warn;

/// Contrasts what a plain and an encryption-aware client see, then shows
/// the query plan of an equality search on an encrypted field.
///
/// Reads MONGODB_URI, MONGODB_DEK_ID, MONGODB_ACCESS_KEY_ID and
/// MONGODB_SECRET_ACCESS_KEY.
#[derive(Parser)]
#[command(name = "retrieve-encrypted-doc", version)]
struct Cli {}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = Cli::parse();
    csfle_cli::init();
    csfle_cli::exit_status(run().await)
}

async fn run() -> anyhow::Result<()> {
    let env = ProcessEnv;
    let settings = EncryptedSettings::from_source(&env)?;
    let config = DemoConfig::from_source(&env);
    let kms = AwsKmsCredentials::new(env);

    let mut stdout = std::io::stdout().lock();
    let report = csfle::retrieve::run(&settings, &config, &kms, &mut stdout)
        .await
        .context("retrieval failed")?;

    if !report.plan.uses_index_scan() {
        warn!(plan = %report.plan, "encrypted equality query did not use an index");
    }
    Ok(())
}
