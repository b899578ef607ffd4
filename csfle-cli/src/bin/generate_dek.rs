//! Provisions the demo key vault and mints one data encryption key.

#![warn(clippy::pedantic, clippy::nursery)]

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use csfle::config::{DemoConfig, ProcessEnv, ProvisionSettings};
use csfle_kms_aws::AwsKmsCredentials;

/// Drops the demo collections, recreates their indexes and creates a DEK.
///
/// Reads MONGODB_URI, MONGODB_CMK_ARN, MONGODB_ACCESS_KEY_ID and
/// MONGODB_SECRET_ACCESS_KEY. Prints the DEK as an `export` line.
#[derive(Parser)]
#[command(name = "generate-dek", version)]
struct Cli {}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = Cli::parse();
    csfle_cli::init();
    csfle_cli::exit_status(run().await)
}

async fn run() -> anyhow::Result<()> {
    let env = ProcessEnv;
    let settings = ProvisionSettings::from_source(&env)?;
    let config = DemoConfig::from_source(&env);
    let kms = AwsKmsCredentials::new(env);

    let mut stdout = std::io::stdout().lock();
    csfle::provision::run(&settings, &config, &kms, &mut stdout)
        .await
        .context("provisioning failed")?;
    Ok(())
}
