//! # `csfle`
//!
//! Orchestration for a MongoDB Client-Side Field Level Encryption demo.
//! The driver's encryption subsystem does the cryptography; this crate
//! configures it and runs three short-lived command flows against it.
//!
//! ## Commands
//!
//! - [`provision`]: reset the demo collections, recreate their indexes and
//!   mint one Data Encryption Key (DEK) under a customer master key
//! - [`insert`]: write a batch of synthetic patients through an
//!   encryption-aware client
//! - [`retrieve`]: read the same data through a plain and an
//!   encryption-aware client, then explain the encrypted equality query
//!
//! ## Example
//!
//! ```rust,ignore
//! use csfle::prelude::*;
//! use csfle_kms_aws::AwsKmsCredentials;
//!
//! let env = ProcessEnv;
//! let config = DemoConfig::from_source(&env);
//! let settings = EncryptedSettings::from_source(&env)?;
//! let kms = AwsKmsCredentials::new(ProcessEnv);
//!
//! let report = csfle::retrieve::run(&settings, &config, &kms, &mut std::io::stdout()).await?;
//! assert!(report.plan.uses_index_scan());
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connection;
pub mod error;
pub mod explain;
pub mod insert;
pub mod kms;
pub mod patient;
pub mod provision;
pub mod retrieve;
pub mod schema;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::config::{DemoConfig, EncryptedSettings, EnvSource, ProcessEnv, ProvisionSettings};
    pub use crate::connection::{AutoEncryption, ClientRole, ConnectionFactory};
    pub use crate::error::{Error, KmsCredentialError};
    pub use crate::explain::QueryPlan;
    pub use crate::kms::{KmsCredentialProvider, KmsProviders};
    pub use crate::patient::{Patient, PatientGenerator};
    pub use crate::schema::Algorithm;
}
