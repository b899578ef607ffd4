//! Connection factory for plain and encryption-aware clients.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, ServerApi, ServerApiVersion};
use mongodb::{Client, Namespace};
use tracing::{debug, info};

use crate::config::{DemoConfig, EncryptedSettings};
use crate::error::Error;
use crate::kms::{KmsCredentialProvider, KmsProviders};
use crate::schema;

/// Which of a command's clients is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    /// No automatic encryption
    Regular,
    /// Automatic encryption per the schema map
    Secure,
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => f.write_str("regular"),
            Self::Secure => f.write_str("secure"),
        }
    }
}

/// Automatic field-encryption settings attached to a client.
pub struct AutoEncryption {
    /// Where wrapped data keys live
    pub key_vault_namespace: Namespace,
    /// Provider credentials
    pub kms_providers: KmsProviders,
    /// Per-collection `$jsonSchema` documents keyed by `db.coll`
    pub schema_map: Vec<(String, Document)>,
    /// Optional `mongo_crypt_v1` shared library
    pub crypt_shared_lib_path: Option<PathBuf>,
}

impl AutoEncryption {
    /// Composes the settings for an encryption-aware patients client.
    ///
    /// Renders the schema from the DEK identifier and reads the KMS
    /// credentials afresh.
    ///
    /// # Errors
    ///
    /// Returns `Error::Schema` for an unusable DEK identifier and
    /// `Error::KmsCredentials` for missing credentials.
    pub fn for_patients(
        settings: &EncryptedSettings,
        config: &DemoConfig,
        kms: &impl KmsCredentialProvider,
    ) -> Result<Self, Error> {
        Ok(Self {
            key_vault_namespace: config.key_vault.clone(),
            kms_providers: kms.kms_providers()?,
            schema_map: schema::schema_map(&config.patients, &settings.dek_id)?,
            crypt_shared_lib_path: settings.crypt_shared_lib_path.clone(),
        })
    }

    fn extra_options(&self) -> Option<Document> {
        self.crypt_shared_lib_path.as_ref().map(|path| {
            doc! {
                "cryptSharedLibPath": path.to_string_lossy().into_owned(),
                "cryptSharedLibRequired": true,
            }
        })
    }
}

/// Builds connected clients pinned to Stable API version 1.
///
/// URI resolution, construction and the initial `ping` share one timeout;
/// a client that cannot answer within it is shut down and reported as a
/// connection error.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionFactory {
    timeout: Duration,
}

impl ConnectionFactory {
    /// Creates a factory with the given connection timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Returns the connection timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connects a client, optionally with automatic encryption.
    ///
    /// # Arguments
    ///
    /// * `uri` - MongoDB connection string
    /// * `encryption` - Settings for an encryption-aware client, or `None`
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `uri` is empty
    /// - the URI cannot be parsed or the client cannot be built
    /// - the handshake fails or exceeds the timeout
    pub async fn connect(
        &self,
        uri: &str,
        encryption: Option<AutoEncryption>,
    ) -> Result<Client, Error> {
        if uri.trim().is_empty() {
            return Err(Error::EmptyUri);
        }
        let role = if encryption.is_some() { ClientRole::Secure } else { ClientRole::Regular };

        // One bound covers URI resolution, client construction and the ping.
        let mut built = None;
        let attempt =
            tokio::time::timeout(self.timeout, self.establish(uri, role, encryption, &mut built))
                .await;
        let failure = match attempt {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(_) => Some(Error::ConnectTimeout { role, timeout: self.timeout }),
        };

        match (failure, built) {
            (None, Some((client, hosts))) => {
                info!(%role, %hosts, "connected to mongo");
                Ok(client)
            }
            (Some(err), Some((client, _))) => {
                client.shutdown().await;
                Err(err)
            }
            (failure, None) => {
                Err(failure.unwrap_or(Error::ConnectTimeout { role, timeout: self.timeout }))
            }
        }
    }

    /// Parses `uri`, builds the client into `built` and pings it.
    ///
    /// The client is stored before the ping so the caller can shut it down
    /// when the ping fails or the attempt times out.
    async fn establish(
        &self,
        uri: &str,
        role: ClientRole,
        encryption: Option<AutoEncryption>,
        built: &mut Option<(Client, String)>,
    ) -> Result<(), Error> {
        let connect_err = |source| Error::Connection { role, source };

        let mut options = ClientOptions::parse(uri).await.map_err(connect_err)?;
        options.server_api = Some(ServerApi::builder().version(ServerApiVersion::V1).build());
        options.connect_timeout = Some(self.timeout);
        options.server_selection_timeout = Some(self.timeout);
        let hosts =
            options.hosts.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");

        let client = match encryption {
            None => Client::with_options(options).map_err(connect_err)?,
            Some(encryption) => {
                let extra_options = encryption.extra_options();
                let mut builder = Client::encrypted_builder(
                    options,
                    encryption.key_vault_namespace,
                    encryption.kms_providers,
                )
                .map_err(connect_err)?
                .schema_map(encryption.schema_map);
                if let Some(extra_options) = extra_options {
                    builder = builder.extra_options(extra_options);
                }
                builder.build().await.map_err(connect_err)?
            }
        };

        debug!(%role, %hosts, "waiting for handshake");
        let admin = client.database("admin");
        *built = Some((client, hosts));
        admin.run_command(doc! { "ping": 1 }).await.map_err(connect_err)?;
        Ok(())
    }
}
