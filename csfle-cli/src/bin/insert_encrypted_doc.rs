//! Inserts synthetic patients through an encryption-aware client.

#![warn(clippy::pedantic, clippy::nursery)]

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use csfle::config::{DemoConfig, EncryptedSettings, ProcessEnv};
use csfle_kms_aws::AwsKmsCredentials;

/// Writes a batch of patients whose sensitive fields are encrypted
/// client-side.
///
/// Reads MONGODB_URI, MONGODB_DEK_ID, MONGODB_ACCESS_KEY_ID and
/// MONGODB_SECRET_ACCESS_KEY.
#[derive(Parser)]
#[command(name = "insert-encrypted-doc", version)]
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
    csfle::insert::run(&settings, &config, &kms, rand::thread_rng(), &mut stdout)
        .await
        .context("insert error")?;
    Ok(())
}
