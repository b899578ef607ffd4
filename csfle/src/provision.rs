//! Data key provisioning.
//!
//! Provisioning runs strictly in order and stops at the first failure:
//!
//! 1. [`prepare_key_request`]: read KMS credentials and the master key
//! 2. connect a regular client
//! 3. [`reset`]: drop the key vault and the patients collection
//! 4. [`prepare_collections`]: recreate both with their indexes
//! 5. [`create_data_key`]: mint one DEK under the customer master key
//! 6. print the DEK in base64
//!
//! A failure midway leaves the collections in whatever state the last
//! completed step produced; re-running provisioning starts over.

use std::fmt;
use std::io::Write;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use mongodb::bson::{doc, Binary, Document};
use mongodb::client_encryption::{ClientEncryption, MasterKey};
use mongodb::options::IndexOptions;
use mongodb::{Client, IndexModel};
use tracing::info;

use crate::config::{DemoConfig, ProvisionSettings, MONGODB_DEK_ID};
use crate::connection::ConnectionFactory;
use crate::error::Error;
use crate::kms::{KmsCredentialProvider, KmsProviders};

/// Name of the partial unique index on `keyAltNames`.
pub const KEY_ALT_NAMES_INDEX: &str = "keyAltNames_1";
/// Name of the index on the encrypted `ssn` field.
pub const SSN_INDEX: &str = "ssn_1";

/// A freshly minted data key identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct DataKey(Binary);

impl DataKey {
    /// Wraps a key identifier returned by the encryption engine.
    #[must_use]
    pub const fn new(id: Binary) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn id(&self) -> &Binary {
        &self.0
    }

    /// Returns the identifier in standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0.bytes)
    }

    /// Writes the labeled line and the `export` line later commands source.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if writing fails.
    pub fn write_to(&self, out: &mut impl Write) -> Result<(), Error> {
        writeln!(out, "{self}")?;
        writeln!(out, "export {MONGODB_DEK_ID}={}", self.to_base64())?;
        Ok(())
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataKeyId [base64]: {}", self.to_base64())
    }
}

/// Drops the key vault and the patients collection.
///
/// Dropping a collection that does not exist succeeds.
///
/// # Errors
///
/// Returns `Error::Database` if either drop is rejected.
pub async fn reset(client: &Client, config: &DemoConfig) -> Result<(), Error> {
    info!(namespace = %config.key_vault, "dropping previous key vault");
    key_vault(client, config).drop().await.map_err(Error::database("drop key vault"))?;

    info!(namespace = %config.patients, "dropping previous patients collection");
    patients(client, config).drop().await.map_err(Error::database("drop patients"))?;
    Ok(())
}

/// Creates the key vault and patients collections with their indexes.
///
/// The key vault gets a unique index on `keyAltNames` that only covers
/// documents where the field exists, so keys without alternate names
/// never collide. The patients collection gets a plain index on `ssn`.
///
/// # Errors
///
/// Returns `Error::Database` if an index cannot be created.
pub async fn prepare_collections(client: &Client, config: &DemoConfig) -> Result<(), Error> {
    info!(namespace = %config.key_vault, "creating key vault");
    key_vault(client, config)
        .create_index(key_alt_names_index())
        .await
        .map_err(Error::database("create key vault index"))?;

    info!(namespace = %config.patients, "creating patients collection");
    patients(client, config)
        .create_index(ssn_index())
        .await
        .map_err(Error::database("create patients index"))?;
    Ok(())
}

/// Everything the encryption engine needs to mint a data key.
pub struct KeyRequest {
    master_key: MasterKey,
    kms_providers: KmsProviders,
}

impl KeyRequest {
    /// Returns the master key descriptor.
    #[must_use]
    pub const fn master_key(&self) -> &MasterKey {
        &self.master_key
    }
}

/// Reads KMS credentials and describes the customer master key `cmk_arn`.
///
/// Touches no server, so a missing credential fails provisioning before
/// anything is dropped.
///
/// # Errors
///
/// Returns `Error::KmsCredentials` if credentials or the master key
/// descriptor are unavailable.
pub fn prepare_key_request(
    config: &DemoConfig,
    kms: &impl KmsCredentialProvider,
    cmk_arn: &str,
) -> Result<KeyRequest, Error> {
    Ok(KeyRequest {
        master_key: kms.master_key(cmk_arn, &config.cmk_region)?,
        kms_providers: kms.kms_providers()?,
    })
}

/// Mints one data key as described by `request`.
///
/// # Errors
///
/// Returns `Error::KeyCreation` if the encryption engine cannot be set up
/// or key creation fails, e.g. for an unknown master key.
pub async fn create_data_key(
    client: &Client,
    config: &DemoConfig,
    request: KeyRequest,
) -> Result<DataKey, Error> {
    info!(region = %config.cmk_region, "creating DEK");
    let client_encryption =
        ClientEncryption::new(client.clone(), config.key_vault.clone(), request.kms_providers)
            .map_err(Error::KeyCreation)?;

    let id = client_encryption
        .create_data_key(request.master_key)
        .await
        .map_err(Error::KeyCreation)?;
    Ok(DataKey::new(id))
}

/// Runs the full provisioning sequence and prints the new DEK to `out`.
///
/// Credentials are read before connecting. The client is shut down before
/// returning, on success and on failure.
///
/// # Errors
///
/// Returns the first error of any step.
pub async fn run(
    settings: &ProvisionSettings,
    config: &DemoConfig,
    kms: &impl KmsCredentialProvider,
    out: &mut impl Write,
) -> Result<DataKey, Error> {
    let request = prepare_key_request(config, kms, &settings.cmk_arn)?;
    let client = ConnectionFactory::new(config.connect_timeout).connect(&settings.uri, None).await?;

    let outcome = async {
        reset(&client, config).await?;
        prepare_collections(&client, config).await?;
        let data_key = create_data_key(&client, config, request).await?;
        data_key.write_to(out)?;
        Ok::<_, Error>(data_key)
    }
    .await;

    client.shutdown().await;
    outcome
}

fn key_vault(client: &Client, config: &DemoConfig) -> mongodb::Collection<Document> {
    client.database(&config.key_vault.db).collection(&config.key_vault.coll)
}

fn patients(client: &Client, config: &DemoConfig) -> mongodb::Collection<Document> {
    client.database(&config.patients.db).collection(&config.patients.coll)
}

fn key_alt_names_index() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "keyAltNames": 1 })
        .options(
            IndexOptions::builder()
                .name(KEY_ALT_NAMES_INDEX.to_string())
                .unique(true)
                .partial_filter_expression(doc! { "keyAltNames": { "$exists": true } })
                .build(),
        )
        .build()
}

fn ssn_index() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "ssn": 1 })
        .options(IndexOptions::builder().name(SSN_INDEX.to_string()).build())
        .build()
}
