//! Error types for the demo commands.

use std::fmt;
use std::time::Duration;

use crate::connection::ClientRole;

/// Main error type for demo operations.
///
/// Every variant is fatal at the command level; nothing in this crate
/// retries or recovers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required environment variable is absent or empty
    #[error("{0} must be set")]
    MissingVariable(&'static str),

    /// An environment variable is present but unusable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The connection URI was empty
    #[error("connection URI must not be empty")]
    EmptyUri,

    /// Building the client or the initial handshake failed
    #[error("connect error for {role} client")]
    Connection {
        /// Which client was being built
        role: ClientRole,
        /// Driver error
        #[source]
        source: mongodb::error::Error,
    },

    /// The initial handshake did not finish within the timeout
    #[error("connect error for {role} client: no reply within {timeout:?}")]
    ConnectTimeout {
        /// Which client was being built
        role: ClientRole,
        /// The bound that was exceeded
        timeout: Duration,
    },

    /// The encryption schema could not be rendered
    #[error("invalid encryption schema: {0}")]
    Schema(String),

    /// A database operation was rejected or failed in transit
    #[error("{operation} failed")]
    Database {
        /// Short name of the failed operation
        operation: &'static str,
        /// Driver error
        #[source]
        source: mongodb::error::Error,
    },

    /// The encryption engine refused to mint a data key
    #[error("create data key error")]
    KeyCreation(#[source] mongodb::error::Error),

    /// KMS credentials could not be assembled
    #[error("KMS provider error")]
    KmsCredentials(#[from] KmsCredentialError),

    /// A lookup that must match a document matched none
    #[error("no document matched {0}")]
    NotFound(String),

    /// The explain reply lacked the expected planner output
    #[error("unexpected explain reply: {0}")]
    Explain(String),

    /// A document did not match the typed record
    #[error("decode error")]
    Decode(#[from] mongodb::bson::de::Error),

    /// Rendering a document for display failed
    #[error("render error")]
    Render(#[from] serde_json::Error),

    /// Writing command output failed
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns a mapper that wraps a driver error with the name of the
    /// operation that produced it.
    pub fn database(operation: &'static str) -> impl FnOnce(mongodb::error::Error) -> Self {
        move |source| Self::Database { operation, source }
    }
}

/// Errors specific to KMS credential providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KmsCredentialError {
    /// A required credential variable is absent or empty
    MissingVariable(&'static str),

    /// The master key reference is unusable
    InvalidMasterKey(String),
}

impl fmt::Display for KmsCredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVariable(name) => write!(f, "{name} must be set"),
            Self::InvalidMasterKey(msg) => write!(f, "invalid master key: {msg}"),
        }
    }
}

impl std::error::Error for KmsCredentialError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_variable_names_the_variable() {
        let err = Error::MissingVariable("MONGODB_URI");
        assert_eq!(err.to_string(), "MONGODB_URI must be set");
    }

    #[test]
    fn test_kms_error_converts_and_keeps_message() {
        let err: Error = KmsCredentialError::MissingVariable("MONGODB_SECRET_ACCESS_KEY").into();
        assert_eq!(err.to_string(), "KMS provider error");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("MONGODB_SECRET_ACCESS_KEY must be set"));
    }

    #[test]
    fn test_driver_error_is_a_source_not_part_of_the_message() {
        let driver = || {
            mongodb::error::Error::from(std::io::Error::new(
                std::io::ErrorKind::Other,
                "socket closed",
            ))
        };

        let err = Error::database("drop key vault")(driver());
        assert_eq!(err.to_string(), "drop key vault failed");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert!(source.is_some_and(|s| s.contains("socket closed")));

        let err = Error::Connection { role: ClientRole::Regular, source: driver() };
        assert_eq!(err.to_string(), "connect error for regular client");

        let err = Error::KeyCreation(driver());
        assert_eq!(err.to_string(), "create data key error");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_connect_timeout_message() {
        let err =
            Error::ConnectTimeout { role: ClientRole::Secure, timeout: Duration::from_secs(10) };
        assert_eq!(err.to_string(), "connect error for secure client: no reply within 10s");
    }
}
