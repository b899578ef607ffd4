//! AWS KMS credential provider for the CSFLE demo.
//!
//! The encryption engine talks to AWS KMS itself; this crate only hands it
//! credentials and describes which customer master key wraps new data keys.
//!
//! # Example
//!
//! ```rust,no_run
//! use csfle::config::ProcessEnv;
//! use csfle::kms::KmsCredentialProvider;
//! use csfle_kms_aws::AwsKmsCredentials;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kms = AwsKmsCredentials::new(ProcessEnv);
//!
//! // Reads MONGODB_ACCESS_KEY_ID and MONGODB_SECRET_ACCESS_KEY on every call
//! let providers = kms.kms_providers()?;
//!
//! let master_key = kms.master_key(
//!     "arn:aws:kms:us-east-1:123456789012:key/12345678-1234-1234-1234-123456789012",
//!     "us-east-1",
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! # Environment
//!
//! - `MONGODB_ACCESS_KEY_ID` (required)
//! - `MONGODB_SECRET_ACCESS_KEY` (required)
//! - `MONGODB_SESSION_TOKEN` (optional, for temporary credentials)

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use csfle::config::EnvSource;
use csfle::error::KmsCredentialError;
use csfle::kms::KmsCredentialProvider;
use mongodb::bson::{doc, Document};
use mongodb::client_encryption::{AwsMasterKey, MasterKey};
use mongodb::mongocrypt::ctx::KmsProvider;
use secrecy::{ExposeSecret, SecretString};

/// Access key id variable.
pub const MONGODB_ACCESS_KEY_ID: &str = "MONGODB_ACCESS_KEY_ID";
/// Secret access key variable.
pub const MONGODB_SECRET_ACCESS_KEY: &str = "MONGODB_SECRET_ACCESS_KEY";
/// Optional session token variable.
pub const MONGODB_SESSION_TOKEN: &str = "MONGODB_SESSION_TOKEN";

/// One read of the AWS credentials.
///
/// Secrets stay wrapped so `Debug` output never shows them.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: SecretString,
    session_token: Option<SecretString>,
}

impl AwsCredentials {
    /// Reads the credentials from `env`.
    ///
    /// # Errors
    ///
    /// Returns `KmsCredentialError::MissingVariable` naming the first
    /// absent required variable.
    pub fn from_source(env: &impl EnvSource) -> Result<Self, KmsCredentialError> {
        let access_key_id = env
            .var(MONGODB_ACCESS_KEY_ID)
            .ok_or(KmsCredentialError::MissingVariable(MONGODB_ACCESS_KEY_ID))?;
        let secret_access_key = env
            .var(MONGODB_SECRET_ACCESS_KEY)
            .ok_or(KmsCredentialError::MissingVariable(MONGODB_SECRET_ACCESS_KEY))?;

        Ok(Self {
            access_key_id,
            secret_access_key: SecretString::new(secret_access_key),
            session_token: env.var(MONGODB_SESSION_TOKEN).map(SecretString::new),
        })
    }

    /// Returns the access key id.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Builds the provider document the encryption engine expects.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut credentials = doc! {
            "accessKeyId": self.access_key_id.as_str(),
            "secretAccessKey": self.secret_access_key.expose_secret().as_str(),
        };
        if let Some(token) = &self.session_token {
            credentials.insert("sessionToken", token.expose_secret().as_str());
        }
        credentials
    }
}

/// AWS KMS credential provider backed by an [`EnvSource`].
///
/// Nothing is cached: every call re-reads the environment.
#[derive(Debug, Clone, Default)]
pub struct AwsKmsCredentials<E: EnvSource> {
    env: E,
}

impl<E: EnvSource> AwsKmsCredentials<E> {
    /// Creates a provider reading from `env`.
    pub const fn new(env: E) -> Self {
        Self { env }
    }

    /// Reads the current credentials.
    ///
    /// # Errors
    ///
    /// See [`AwsCredentials::from_source`].
    pub fn read(&self) -> Result<AwsCredentials, KmsCredentialError> {
        AwsCredentials::from_source(&self.env)
    }
}

impl<E: EnvSource> KmsCredentialProvider for AwsKmsCredentials<E> {
    fn provider(&self) -> KmsProvider {
        KmsProvider::aws()
    }

    fn credentials(&self) -> Result<Document, KmsCredentialError> {
        Ok(self.read()?.to_document())
    }

    fn master_key(&self, key: &str, region: &str) -> Result<MasterKey, KmsCredentialError> {
        if key.trim().is_empty() {
            return Err(KmsCredentialError::InvalidMasterKey("key ARN is empty".to_string()));
        }
        if region.trim().is_empty() {
            return Err(KmsCredentialError::InvalidMasterKey("region is empty".to_string()));
        }
        Ok(AwsMasterKey::builder().region(region.to_string()).key(key.to_string()).build().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const ARN: &str = "arn:aws:kms:us-east-1:123456789012:key/test";

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    fn full_env() -> HashMap<String, String> {
        env(&[(MONGODB_ACCESS_KEY_ID, "AKIAEXAMPLE"), (MONGODB_SECRET_ACCESS_KEY, "s3cr3t")])
    }

    #[test]
    fn test_credentials_document() {
        let kms = AwsKmsCredentials::new(full_env());
        let credentials = kms.credentials().unwrap();

        assert_eq!(credentials, doc! { "accessKeyId": "AKIAEXAMPLE", "secretAccessKey": "s3cr3t" });
    }

    #[test]
    fn test_session_token_is_optional() {
        let mut values = full_env();
        values.insert(MONGODB_SESSION_TOKEN.to_string(), "token".to_string());
        let credentials = AwsKmsCredentials::new(values).credentials().unwrap();

        assert_eq!(credentials.get_str("sessionToken").unwrap(), "token");
    }

    #[test]
    fn test_missing_access_key_id() {
        let kms = AwsKmsCredentials::new(env(&[(MONGODB_SECRET_ACCESS_KEY, "s3cr3t")]));
        let err = kms.credentials().unwrap_err();

        assert_eq!(err, KmsCredentialError::MissingVariable(MONGODB_ACCESS_KEY_ID));
        assert_eq!(err.to_string(), "MONGODB_ACCESS_KEY_ID must be set");
    }

    #[test]
    fn test_missing_secret_access_key() {
        let kms = AwsKmsCredentials::new(env(&[(MONGODB_ACCESS_KEY_ID, "AKIAEXAMPLE")]));
        let err = kms.kms_providers().unwrap_err();

        assert_eq!(err, KmsCredentialError::MissingVariable(MONGODB_SECRET_ACCESS_KEY));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let kms = AwsKmsCredentials::new(env(&[
            (MONGODB_ACCESS_KEY_ID, ""),
            (MONGODB_SECRET_ACCESS_KEY, "s3cr3t"),
        ]));
        assert_eq!(
            kms.credentials().unwrap_err(),
            KmsCredentialError::MissingVariable(MONGODB_ACCESS_KEY_ID)
        );
    }

    struct SharedEnv(Mutex<HashMap<String, String>>);

    impl EnvSource for SharedEnv {
        fn var(&self, name: &str) -> Option<String> {
            self.0.lock().unwrap().var(name)
        }
    }

    #[test]
    fn test_credentials_are_not_cached() {
        let shared = SharedEnv(Mutex::new(full_env()));
        let kms = AwsKmsCredentials::new(&shared);
        assert!(kms.credentials().is_ok());

        shared.0.lock().unwrap().remove(MONGODB_SECRET_ACCESS_KEY);
        assert_eq!(
            kms.credentials().unwrap_err(),
            KmsCredentialError::MissingVariable(MONGODB_SECRET_ACCESS_KEY)
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let credentials = AwsKmsCredentials::new(full_env()).read().unwrap();
        let debug = format!("{credentials:?}");

        assert!(debug.contains("AKIAEXAMPLE"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_provider_list_has_one_aws_entry() {
        let providers = AwsKmsCredentials::new(full_env()).kms_providers().unwrap();
        assert_eq!(providers.len(), 1);
        assert!(providers[0].2.is_none());
    }

    #[test]
    fn test_master_key() {
        let kms = AwsKmsCredentials::new(full_env());
        let MasterKey::Aws(master_key) = kms.master_key(ARN, "us-east-1").unwrap() else {
            panic!("expected an AWS master key");
        };
        assert_eq!(master_key.key, ARN);
        assert_eq!(master_key.region, "us-east-1");
        assert_eq!(master_key.endpoint, None);
    }

    #[test]
    fn test_master_key_rejects_empty_arn() {
        let kms = AwsKmsCredentials::new(full_env());
        assert!(matches!(
            kms.master_key(" ", "us-east-1"),
            Err(KmsCredentialError::InvalidMasterKey(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_same_environment_same_credentials(
            id in "[A-Z0-9]{1,20}",
            secret in "[a-zA-Z0-9/+]{1,40}",
        ) {
            let values = env(&[(MONGODB_ACCESS_KEY_ID, id.as_str()), (MONGODB_SECRET_ACCESS_KEY, secret.as_str())]);
            let kms = AwsKmsCredentials::new(values);
            prop_assert_eq!(kms.credentials().unwrap(), kms.credentials().unwrap());
        }
    }
}
