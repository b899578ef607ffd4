//! Side-by-side reads through a plain and an encryption-aware client.
//!
//! The plain client sees encrypted fields as binary subtype 6 values; the
//! secure client decrypts them and can match deterministically encrypted
//! fields by equality.

use std::io::Write;

use mongodb::bson::{doc, spec::BinarySubtype, Bson, Document};
use mongodb::{Client, Collection, Database};
use tracing::info;

use crate::config::{DemoConfig, EncryptedSettings};
use crate::connection::{AutoEncryption, ConnectionFactory};
use crate::error::Error;
use crate::explain::QueryPlan;
use crate::insert::patients_collection;
use crate::kms::KmsCredentialProvider;
use crate::patient::Patient;

/// What the three reads returned.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalReport {
    /// Reference patient as the plain client sees it
    pub regular: Document,
    /// Dotted paths of fields the plain client saw as ciphertext
    pub ciphertext_fields: Vec<String>,
    /// Reference patient as the secure client sees it, `_id` included
    pub secure_document: Document,
    /// Typed view of `secure_document`
    pub secure: Patient,
    /// Winning plan of the secure equality query on `ssn`
    pub plan: QueryPlan,
}

/// Finds a patient by its unencrypted name.
///
/// # Errors
///
/// Returns `Error::Database` if the query fails and `Error::NotFound` if
/// nothing matches.
pub async fn find_by_name(collection: &Collection<Document>, name: &str) -> Result<Document, Error> {
    collection
        .find_one(doc! { "name": name })
        .await
        .map_err(Error::database("find by name"))?
        .ok_or_else(|| Error::NotFound(format!("name {name:?}")))
}

/// Finds a patient by its deterministically encrypted `ssn`.
///
/// Through an encryption-aware client the literal is encrypted before it
/// is sent and the reply is decrypted on arrival.
///
/// # Errors
///
/// Returns `Error::Database` if the query fails and `Error::NotFound` if
/// nothing matches.
pub async fn find_by_ssn(collection: &Collection<Document>, ssn: i32) -> Result<Document, Error> {
    collection
        .find_one(doc! { "ssn": ssn })
        .await
        .map_err(Error::database("find by ssn"))?
        .ok_or_else(|| Error::NotFound(format!("ssn {ssn}")))
}

/// Asks the server how it would run `find({ ssn })` on `collection`.
///
/// # Errors
///
/// Returns `Error::Database` if the command fails and `Error::Explain` if
/// the reply carries no winning plan.
pub async fn explain_find_by_ssn(
    database: &Database,
    collection: &str,
    ssn: i32,
) -> Result<QueryPlan, Error> {
    let command = doc! {
        "explain": { "find": collection, "filter": { "ssn": ssn } },
    };
    let reply =
        database.run_command(command).await.map_err(Error::database("explain find by ssn"))?;
    QueryPlan::from_explain(&reply)
}

/// Decodes a decrypted patient document into the typed record.
///
/// Fields the record does not model, such as `_id`, are ignored.
///
/// # Errors
///
/// Returns `Error::Decode` if a field is missing or has the wrong type.
pub fn decode_patient(document: &Document) -> Result<Patient, Error> {
    Ok(mongodb::bson::from_document(document.clone())?)
}

/// Returns the dotted paths of all values stored as encrypted binaries.
#[must_use]
pub fn ciphertext_fields(document: &Document) -> Vec<String> {
    let mut paths = Vec::new();
    collect_ciphertext(document, "", &mut paths);
    paths
}

fn collect_ciphertext(document: &Document, prefix: &str, paths: &mut Vec<String>) {
    for (key, value) in document {
        let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
        match value {
            Bson::Binary(binary) if binary.subtype == BinarySubtype::Encrypted => paths.push(path),
            Bson::Document(nested) => collect_ciphertext(nested, &path, paths),
            _ => {}
        }
    }
}

/// Renders a document as indented relaxed Extended JSON.
///
/// # Errors
///
/// Returns `Error::Render` if serialization fails.
pub fn render(document: &Document) -> Result<String, Error> {
    let json = Bson::Document(document.clone()).into_relaxed_extjson();
    Ok(serde_json::to_string_pretty(&json)?)
}

/// Connects both clients, runs the three reads and prints each result to
/// `out` as soon as it arrives.
///
/// Both clients are shut down before returning, on success and on failure.
///
/// # Errors
///
/// Returns error if:
/// - the schema or KMS credentials cannot be assembled
/// - either connection fails
/// - any read, decode or explain fails
pub async fn run(
    settings: &EncryptedSettings,
    config: &DemoConfig,
    kms: &impl KmsCredentialProvider,
    out: &mut impl Write,
) -> Result<RetrievalReport, Error> {
    let encryption = AutoEncryption::for_patients(settings, config, kms)?;
    let factory = ConnectionFactory::new(config.connect_timeout);
    let regular_client = factory.connect(&settings.uri, None).await?;
    let secure_client = match factory.connect(&settings.uri, Some(encryption)).await {
        Ok(client) => client,
        Err(err) => {
            regular_client.shutdown().await;
            return Err(err);
        }
    };

    let outcome = read_all(&regular_client, &secure_client, config, out).await;

    regular_client.shutdown().await;
    secure_client.shutdown().await;
    outcome
}

async fn read_all(
    regular_client: &Client,
    secure_client: &Client,
    config: &DemoConfig,
    out: &mut impl Write,
) -> Result<RetrievalReport, Error> {
    let reference = &config.reference_patient;

    writeln!(out, "Finding a document with regular (non-encrypted) client.")?;
    let regular = find_by_name(
        &regular_client.database(&config.patients.db).collection(&config.patients.coll),
        &reference.name,
    )
    .await?;
    let ciphertext_fields = ciphertext_fields(&regular);
    info!(fields = ?ciphertext_fields, "regular client read ciphertext");
    writeln!(out, "{}", render(&regular)?)?;
    writeln!(out, "Encrypted fields: {}", ciphertext_fields.join(", "))?;

    writeln!(out, "Finding a document with encrypted client, searching on an encrypted field")?;
    let secure_document = find_by_ssn(
        &patients_collection(secure_client, config).clone_with_type(),
        reference.ssn,
    )
    .await?;
    let secure = decode_patient(&secure_document)?;
    writeln!(out, "{}", render(&secure_document)?)?;

    writeln!(out, "Show query plan for find on indexed encrypted field")?;
    let plan = explain_find_by_ssn(
        &secure_client.database(&config.patients.db),
        &config.patients.coll,
        reference.ssn,
    )
    .await?;
    info!(index_scan = plan.uses_index_scan(), "explained encrypted equality query");
    writeln!(out, "Query plan: {plan}")?;

    Ok(RetrievalReport { regular, ciphertext_fields, secure_document, secure, plan })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::Binary;

    fn ciphertext() -> Bson {
        Bson::Binary(Binary { subtype: BinarySubtype::Encrypted, bytes: vec![1, 2, 3] })
    }

    #[test]
    fn test_ciphertext_fields_walks_nested_documents() {
        let document = doc! {
            "name": "Jon Doe",
            "ssn": ciphertext(),
            "bloodType": ciphertext(),
            "medicalRecords": ciphertext(),
            "insurance": { "provider": "MaestCare", "policyNumber": ciphertext() },
        };
        assert_eq!(
            ciphertext_fields(&document),
            ["ssn", "bloodType", "medicalRecords", "insurance.policyNumber"]
        );
    }

    #[test]
    fn test_plaintext_document_has_no_ciphertext() {
        let document = mongodb::bson::to_document(&Patient::new("Jon Doe", 241_014_209)).unwrap();
        assert!(ciphertext_fields(&document).is_empty());
    }

    #[test]
    fn test_other_binaries_are_not_ciphertext() {
        let document = doc! {
            "blob": Binary { subtype: BinarySubtype::Generic, bytes: vec![0] },
        };
        assert!(ciphertext_fields(&document).is_empty());
    }

    #[test]
    fn test_secure_document_keeps_id_and_decodes_to_patient() {
        let patient = Patient::new("Jon Doe", 241_014_209);
        let mut document = mongodb::bson::to_document(&patient).unwrap();
        document.insert("_id", mongodb::bson::oid::ObjectId::new());

        assert_eq!(decode_patient(&document).unwrap(), patient);
        let rendered = render(&document).unwrap();
        assert!(rendered.contains("\"_id\""));
        assert!(rendered.contains("\"$oid\""));
    }

    #[test]
    fn test_decode_patient_rejects_incomplete_document() {
        let err = decode_patient(&doc! { "name": "Jon Doe" }).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_render_is_indented_json() {
        let rendered = render(&doc! { "name": "Jon Doe", "ssn": 241_014_209 }).unwrap();
        assert_eq!(rendered, "{\n  \"name\": \"Jon Doe\",\n  \"ssn\": 241014209\n}");
    }
}
