//! Encrypted insertion of synthetic patients.

use std::io::Write;

use mongodb::bson::Bson;
use mongodb::{Client, Collection};
use rand::Rng;
use tracing::info;

use crate::config::{DemoConfig, EncryptedSettings};
use crate::connection::{AutoEncryption, ConnectionFactory};
use crate::error::Error;
use crate::kms::KmsCredentialProvider;
use crate::patient::{Patient, PatientGenerator};

/// Result of one bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertReport {
    /// Generated `_id` values in insertion order
    pub inserted_ids: Vec<Bson>,
}

impl InsertReport {
    /// Writes the inserted identifiers as one line.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if writing fails.
    pub fn write_to(&self, out: &mut impl Write) -> Result<(), Error> {
        let ids: Vec<String> = self.inserted_ids.iter().map(display_id).collect();
        writeln!(out, "inserted patients with IDs [{}]", ids.join(" "))?;
        Ok(())
    }
}

fn display_id(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

/// Returns the patients collection of `client`.
#[must_use]
pub fn patients_collection(client: &Client, config: &DemoConfig) -> Collection<Patient> {
    client.database(&config.patients.db).collection(&config.patients.coll)
}

/// Inserts `patients` in one bulk write.
///
/// Sensitive fields are encrypted by the client's auto-encryption; this
/// function only sees plaintext.
///
/// # Errors
///
/// Returns `Error::Database` if the insert fails. There is no partial
/// recovery.
pub async fn insert_patients(
    collection: &Collection<Patient>,
    patients: &[Patient],
) -> Result<InsertReport, Error> {
    let result =
        collection.insert_many(patients).await.map_err(Error::database("insert patients"))?;

    let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
    ids.sort_unstable_by_key(|(index, _)| *index);
    let report = InsertReport { inserted_ids: ids.into_iter().map(|(_, id)| id).collect() };
    info!(count = report.inserted_ids.len(), "inserted patients");
    Ok(report)
}

/// Connects an encryption-aware client, inserts one generated batch and
/// prints the new identifiers to `out`.
///
/// The client is shut down before returning, on success and on failure.
///
/// # Errors
///
/// Returns error if:
/// - the schema or KMS credentials cannot be assembled
/// - the connection fails
/// - the insert fails
pub async fn run(
    settings: &EncryptedSettings,
    config: &DemoConfig,
    kms: &impl KmsCredentialProvider,
    rng: impl Rng,
    out: &mut impl Write,
) -> Result<InsertReport, Error> {
    let encryption = AutoEncryption::for_patients(settings, config, kms)?;
    let client = ConnectionFactory::new(config.connect_timeout)
        .connect(&settings.uri, Some(encryption))
        .await?;

    let patients =
        PatientGenerator::new(rng).batch(config.batch_size, Some(&config.reference_patient));
    let outcome = async {
        let report = insert_patients(&patients_collection(&client, config), &patients).await?;
        report.write_to(out)?;
        Ok::<_, Error>(report)
    }
    .await;

    client.shutdown().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    #[test]
    fn test_report_line() {
        let oid = ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap();
        let report = InsertReport { inserted_ids: vec![Bson::ObjectId(oid), Bson::Int32(7)] };

        let mut out = Vec::new();
        report.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "inserted patients with IDs [65a1b2c3d4e5f60718293a4b 7]\n"
        );
    }
}
