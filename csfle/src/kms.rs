//! KMS credential provider abstraction.

use mongodb::bson::Document;
use mongodb::client_encryption::MasterKey;
use mongodb::mongocrypt::ctx::KmsProvider;
use mongodb::options::TlsOptions;

use crate::error::KmsCredentialError;

/// Provider configuration in the shape the encryption engine expects.
pub type KmsProviders = Vec<(KmsProvider, Document, Option<TlsOptions>)>;

/// Supplies KMS credentials and master-key descriptors to the encryption engine.
///
/// Implementations read their credentials on every call; nothing is cached,
/// so a credential that disappears between calls fails the next call.
///
/// # Example
///
/// ```rust,ignore
/// use csfle::kms::KmsCredentialProvider;
///
/// struct LocalKms(Vec<u8>);
///
/// impl KmsCredentialProvider for LocalKms {
///     fn provider(&self) -> KmsProvider {
///         KmsProvider::local()
///     }
///     // ... other methods
/// }
/// ```
pub trait KmsCredentialProvider: Send + Sync {
    /// Returns the provider these credentials belong to.
    fn provider(&self) -> KmsProvider;

    /// Reads the provider credentials.
    ///
    /// # Errors
    ///
    /// Returns `KmsCredentialError::MissingVariable` naming the absent secret.
    fn credentials(&self) -> Result<Document, KmsCredentialError>;

    /// Builds the descriptor of the master key that wraps new data keys.
    ///
    /// # Arguments
    ///
    /// * `key` - Master key identifier (an ARN for AWS)
    /// * `region` - Region the master key lives in
    ///
    /// # Errors
    ///
    /// Returns `KmsCredentialError::InvalidMasterKey` if `key` is unusable.
    fn master_key(&self, key: &str, region: &str) -> Result<MasterKey, KmsCredentialError>;

    /// Packages the credentials as the engine's provider list.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`KmsCredentialProvider::credentials`].
    fn kms_providers(&self) -> Result<KmsProviders, KmsCredentialError> {
        Ok(vec![(self.provider(), self.credentials()?, None)])
    }
}
