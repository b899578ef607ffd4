//! Synthetic patient records.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ReferencePatient;

/// Smallest generated identifier.
pub const SSN_MIN: i32 = 100_000_000;
/// Upper bound (exclusive) of generated identifiers.
pub const SSN_MAX: i32 = 999_999_999;

const ADJECTIVES: &[&str] = &[
    "admiring", "brave", "clever", "dazzling", "eager", "focused", "gallant", "happy",
    "jolly", "keen", "loving", "modest", "nifty", "optimistic", "peaceful", "quirky",
    "relaxed", "serene", "tender", "vibrant", "wonderful", "zealous",
];

const SURNAMES: &[&str] = &[
    "archimedes", "babbage", "curie", "darwin", "euclid", "faraday", "galileo", "hopper",
    "joliot", "kepler", "lovelace", "meitner", "noether", "pasteur", "ritchie", "shannon",
    "tesla", "turing", "volta", "wozniak", "yalow",
];

/// A patient document.
///
/// `ssn`, `blood_type`, `medical_records` and `insurance.policy_number` are
/// encrypted by the driver before they leave the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub name: String,
    pub ssn: i32,
    pub blood_type: String,
    pub medical_records: Vec<MedicalRecord>,
    pub insurance: Insurance,
}

/// One entry of a patient's medical history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    pub weight: i32,
    pub blood_pressure: String,
}

/// Insurance details; only the policy number is encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insurance {
    pub provider: String,
    pub policy_number: i32,
}

impl Patient {
    /// Creates a patient with the demo's fixed clinical values.
    #[must_use]
    pub fn new(name: impl Into<String>, ssn: i32) -> Self {
        Self {
            name: name.into(),
            ssn,
            blood_type: "AB+".to_string(),
            medical_records: vec![MedicalRecord {
                weight: 180,
                blood_pressure: "120/80".to_string(),
            }],
            insurance: Insurance { provider: "MaestCare".to_string(), policy_number: 123_142 },
        }
    }
}

/// Generates batches of synthetic patients.
///
/// Identifiers are unique within a batch, which keeps equality lookups on
/// the deterministically encrypted `ssn` unambiguous.
pub struct PatientGenerator<R: Rng> {
    rng: R,
}

impl<R: Rng> PatientGenerator<R> {
    /// Creates a generator drawing from `rng`.
    pub const fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Returns a random `adjective_surname` name.
    pub fn name(&mut self) -> String {
        let adjective = ADJECTIVES.choose(&mut self.rng).copied().unwrap_or("nameless");
        let surname = SURNAMES.choose(&mut self.rng).copied().unwrap_or("patient");
        format!("{adjective}_{surname}")
    }

    /// Generates `size` patients.
    ///
    /// When `reference` is given it is the first patient of the batch and
    /// no other patient shares its identifier.
    pub fn batch(&mut self, size: usize, reference: Option<&ReferencePatient>) -> Vec<Patient> {
        let mut patients = Vec::with_capacity(size);
        let mut taken = HashSet::with_capacity(size);

        if let Some(reference) = reference.filter(|_| size > 0) {
            taken.insert(reference.ssn);
            patients.push(Patient::new(reference.name.clone(), reference.ssn));
        }

        while patients.len() < size {
            let ssn = self.rng.gen_range(SSN_MIN..SSN_MAX);
            if taken.insert(ssn) {
                let name = self.name();
                patients.push(Patient::new(name, ssn));
            }
        }
        patients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn reference() -> ReferencePatient {
        ReferencePatient { name: "Jon Doe".to_string(), ssn: 241_014_209 }
    }

    #[test]
    fn test_batch_size_and_unique_ids() {
        let mut generator = PatientGenerator::new(StdRng::seed_from_u64(7));
        let patients = generator.batch(20, Some(&reference()));

        assert_eq!(patients.len(), 20);
        let ids: HashSet<i32> = patients.iter().map(|p| p.ssn).collect();
        assert_eq!(ids.len(), 20);
        assert!(patients.iter().all(|p| (SSN_MIN..SSN_MAX).contains(&p.ssn)));
    }

    #[test]
    fn test_reference_patient_comes_first() {
        let mut generator = PatientGenerator::new(StdRng::seed_from_u64(7));
        let patients = generator.batch(3, Some(&reference()));

        assert_eq!(patients[0].name, "Jon Doe");
        assert_eq!(patients[0].ssn, 241_014_209);
        assert!(patients[1..].iter().all(|p| p.ssn != 241_014_209));
    }

    #[test]
    fn test_empty_batch() {
        let mut generator = PatientGenerator::new(StdRng::seed_from_u64(7));
        assert!(generator.batch(0, Some(&reference())).is_empty());
    }

    #[test]
    fn test_same_seed_same_batch() {
        let first = PatientGenerator::new(StdRng::seed_from_u64(42)).batch(5, None);
        let second = PatientGenerator::new(StdRng::seed_from_u64(42)).batch(5, None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_generated_names() {
        let mut generator = PatientGenerator::new(StdRng::seed_from_u64(1));
        let name = generator.name();
        let (adjective, surname) = name.split_once('_').unwrap();
        assert!(ADJECTIVES.contains(&adjective));
        assert!(SURNAMES.contains(&surname));
    }

    #[test]
    fn test_serialized_field_names() {
        let doc = mongodb::bson::to_document(&Patient::new("Jon Doe", 241_014_209)).unwrap();
        assert_eq!(doc.get_i32("ssn").unwrap(), 241_014_209);
        assert_eq!(doc.get_str("bloodType").unwrap(), "AB+");
        assert_eq!(doc.get_array("medicalRecords").unwrap().len(), 1);
        assert_eq!(
            doc.get_document("insurance").unwrap().get_i32("policyNumber").unwrap(),
            123_142
        );
    }
}
