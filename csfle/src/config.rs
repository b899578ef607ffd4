//! Configuration for the demo commands.
//!
//! Names that were fixed constants in earlier versions of the demo live in
//! [`DemoConfig`], which every command receives explicitly. Per-command
//! settings are read through an [`EnvSource`] so tests can supply their own
//! environment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use mongodb::Namespace;

use crate::error::Error;

/// Connection string, read by every command.
pub const MONGODB_URI: &str = "MONGODB_URI";
/// Customer master key ARN, read by provisioning.
pub const MONGODB_CMK_ARN: &str = "MONGODB_CMK_ARN";
/// Base64 DEK identifier printed by provisioning.
pub const MONGODB_DEK_ID: &str = "MONGODB_DEK_ID";
/// Optional override for the master key region.
pub const MONGODB_CMK_REGION: &str = "MONGODB_CMK_REGION";
/// Optional path to the `mongo_crypt_v1` shared library.
pub const MONGODB_CRYPT_SHARED_LIB_PATH: &str = "MONGODB_CRYPT_SHARED_LIB_PATH";

/// A source of environment values.
///
/// Implementations report empty values as absent.
pub trait EnvSource: Send + Sync {
    /// Returns the value of `name`, or `None` if unset or empty.
    fn var(&self, name: &str) -> Option<String>;

    /// Returns the value of `name`, failing with [`Error::MissingVariable`].
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingVariable` naming `name` if it is unset or empty.
    fn require(&self, name: &'static str) -> Result<String, Error> {
        self.var(name).ok_or(Error::MissingVariable(name))
    }
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }
}

/// An in-memory environment.
///
/// This is the supported way to run commands and providers against a fixed
/// environment, e.g. in tests, without touching the process environment.
impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).filter(|value| !value.is_empty()).cloned()
    }
}

impl<E: EnvSource + ?Sized> EnvSource for &E {
    fn var(&self, name: &str) -> Option<String> {
        (**self).var(name)
    }
}

/// The patient every generated batch contains and every retrieval looks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePatient {
    /// Unencrypted name used by the plain-client lookup
    pub name: String,
    /// Deterministically encrypted identifier used by the secure lookup
    pub ssn: i32,
}

/// Names and limits shared by the three commands.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Collection holding wrapped data keys
    pub key_vault: Namespace,
    /// Collection holding patient documents
    pub patients: Namespace,
    /// Region of the customer master key
    pub cmk_region: String,
    /// Bound on client construction and handshake
    pub connect_timeout: Duration,
    /// Number of patients written per insertion run
    pub batch_size: usize,
    /// Known patient searched for by the retrieval command
    pub reference_patient: ReferencePatient,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            key_vault: Namespace { db: "encryption".to_string(), coll: "__keyVault".to_string() },
            patients: Namespace {
                db: "medicalRecords".to_string(),
                coll: "patients".to_string(),
            },
            cmk_region: "us-east-1".to_string(),
            connect_timeout: Duration::from_secs(10),
            batch_size: 20,
            reference_patient: ReferencePatient {
                name: "Jon Doe".to_string(),
                ssn: 241_014_209,
            },
        }
    }
}

impl DemoConfig {
    /// Builds the default configuration, taking the master key region from
    /// `MONGODB_CMK_REGION` when set.
    #[must_use]
    pub fn from_source(env: &impl EnvSource) -> Self {
        let mut config = Self::default();
        if let Some(region) = env.var(MONGODB_CMK_REGION) {
            config.cmk_region = region;
        }
        config
    }

    /// Returns the key vault namespace as `db.coll`.
    #[must_use]
    pub fn key_vault_namespace(&self) -> String {
        self.key_vault.to_string()
    }
}

/// Settings for the provisioning command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    /// Connection string
    pub uri: String,
    /// Customer master key ARN
    pub cmk_arn: String,
}

impl ProvisionSettings {
    /// Reads `MONGODB_URI` and `MONGODB_CMK_ARN`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingVariable` naming the first absent variable.
    pub fn from_source(env: &impl EnvSource) -> Result<Self, Error> {
        Ok(Self { uri: env.require(MONGODB_URI)?, cmk_arn: env.require(MONGODB_CMK_ARN)? })
    }
}

/// Settings for the commands that run an encryption-aware client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSettings {
    /// Connection string
    pub uri: String,
    /// Base64 DEK identifier
    pub dek_id: String,
    /// Optional `mongo_crypt_v1` shared library, used instead of `mongocryptd`
    pub crypt_shared_lib_path: Option<PathBuf>,
}

impl EncryptedSettings {
    /// Reads `MONGODB_URI`, `MONGODB_DEK_ID` and the optional shared library path.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingVariable` naming the first absent variable.
    pub fn from_source(env: &impl EnvSource) -> Result<Self, Error> {
        Ok(Self {
            uri: env.require(MONGODB_URI)?,
            dek_id: env.require(MONGODB_DEK_ID)?,
            crypt_shared_lib_path: env.var(MONGODB_CRYPT_SHARED_LIB_PATH).map(PathBuf::from),
        })
    }
}
