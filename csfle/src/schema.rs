//! Field-encryption schema for the patients collection.
//!
//! The schema is a `$jsonSchema` document the driver attaches to every
//! operation on the collection. Field assignments are fixed:
//!
//! | Field                    | BSON type | Algorithm     |
//! |--------------------------|-----------|---------------|
//! | `insurance.policyNumber` | `int`     | deterministic |
//! | `medicalRecords`         | `array`   | random        |
//! | `bloodType`              | `string`  | random        |
//! | `ssn`                    | `int`     | deterministic |
//!
//! Deterministic fields can be matched by equality; random fields cannot.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use mongodb::bson::{doc, spec::BinarySubtype, Binary, Document};
use mongodb::Namespace;

use crate::error::Error;

/// Length of a data key identifier (a UUID).
pub const KEY_ID_LEN: usize = 16;

/// Field-level encryption algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Same plaintext, same ciphertext. Supports equality queries.
    Deterministic,
    /// Fresh ciphertext per encryption. No queries.
    Random,
}

impl Algorithm {
    /// Returns the algorithm name the engine understands.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deterministic => "AEAD_AES_256_CBC_HMAC_SHA_512-Deterministic",
            Self::Random => "AEAD_AES_256_CBC_HMAC_SHA_512-Random",
        }
    }

    /// Whether an encrypted literal can be matched with `$eq`.
    #[must_use]
    pub const fn supports_equality(self) -> bool {
        matches!(self, Self::Deterministic)
    }
}

/// One encrypted field of the patient document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptedField {
    /// Path from the document root
    pub path: &'static [&'static str],
    /// Declared BSON type of the plaintext
    pub bson_type: &'static str,
    /// Algorithm applied by the driver
    pub algorithm: Algorithm,
}

impl EncryptedField {
    /// Returns the dotted path, e.g. `insurance.policyNumber`.
    #[must_use]
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

/// Encrypted fields of a patient document, in schema order.
pub const PATIENT_FIELDS: &[EncryptedField] = &[
    EncryptedField {
        path: &["insurance", "policyNumber"],
        bson_type: "int",
        algorithm: Algorithm::Deterministic,
    },
    EncryptedField { path: &["medicalRecords"], bson_type: "array", algorithm: Algorithm::Random },
    EncryptedField { path: &["bloodType"], bson_type: "string", algorithm: Algorithm::Random },
    EncryptedField { path: &["ssn"], bson_type: "int", algorithm: Algorithm::Deterministic },
];

/// Decodes a base64 DEK identifier into a UUID binary.
///
/// # Errors
///
/// Returns `Error::Schema` if `dek_id` is not base64 or does not decode to
/// [`KEY_ID_LEN`] bytes.
pub fn parse_key_id(dek_id: &str) -> Result<Binary, Error> {
    let bytes = STANDARD
        .decode(dek_id.trim())
        .map_err(|e| Error::Schema(format!("DEK id is not valid base64: {e}")))?;
    if bytes.len() != KEY_ID_LEN {
        return Err(Error::Schema(format!(
            "DEK id must decode to {KEY_ID_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Binary { subtype: BinarySubtype::Uuid, bytes })
}

/// Renders the `$jsonSchema` for patient documents encrypted under `key_id`.
///
/// # Errors
///
/// Returns `Error::Schema` if two field paths conflict.
pub fn patient_schema(key_id: &Binary) -> Result<Document, Error> {
    let mut properties = Document::new();
    for field in PATIENT_FIELDS {
        let encrypt = doc! {
            "bsonType": field.bson_type,
            "algorithm": field.algorithm.as_str(),
        };
        insert_field(&mut properties, field.path, encrypt)?;
    }

    Ok(doc! {
        "bsonType": "object",
        "encryptMetadata": { "keyId": [key_id.clone()] },
        "properties": properties,
    })
}

/// Renders the schema map entry for `namespace` from a base64 DEK identifier.
///
/// Identical input always yields an identical document.
///
/// # Errors
///
/// Returns `Error::Schema` if the identifier cannot be embedded.
pub fn schema_map(namespace: &Namespace, dek_id: &str) -> Result<Vec<(String, Document)>, Error> {
    let key_id = parse_key_id(dek_id)?;
    Ok(vec![(namespace.to_string(), patient_schema(&key_id)?)])
}

fn insert_field(properties: &mut Document, path: &[&str], encrypt: Document) -> Result<(), Error> {
    match path {
        [] => Ok(()),
        [leaf] => {
            properties.insert(*leaf, doc! { "encrypt": encrypt });
            Ok(())
        }
        [parent, rest @ ..] => {
            if !properties.contains_key(*parent) {
                properties.insert(*parent, doc! { "bsonType": "object", "properties": {} });
            }
            let nested = properties
                .get_document_mut(*parent)
                .and_then(|object| object.get_document_mut("properties"))
                .map_err(|e| Error::Schema(format!("field {parent} is not an object: {e}")))?;
            insert_field(nested, rest, encrypt)
        }
    }
}
