//! Patient models.

use serde::{Deserialize, Serialize};

/// A registered patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Internal UUID
    pub patient_id: String,
    /// Medical record number - human facing, unique, assigned on registration
    pub mrn: String,
    pub first_name: String,
    pub last_name: String,
    /// Date of birth (YYYY-MM-DD)
    pub date_of_birth: Option<String>,
    pub sex: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    /// Inactive patients keep their history but take no new charges
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Patient {
    /// Create a new patient with required fields. The MRN is assigned at registration.
    pub fn new(first_name: String, last_name: String) -> Self {
        let now = super::now_timestamp();
        Self {
            patient_id: super::new_id(),
            mrn: String::new(),
            first_name,
            last_name,
            date_of_birth: None,
            sex: None,
            phone: None,
            email: None,
            address: None,
            notes: None,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// "First Last".
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    /// Lowercased full name used for duplicate matching.
    pub fn canonical_name(&self) -> String {
        self.full_name().to_lowercase()
    }
}

/// A registered patient that may be the same person as a new registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicateCandidate {
    pub patient_id: String,
    pub mrn: String,
    pub full_name: String,
    /// Jaro-Winkler similarity of the full names (0.0 - 1.0)
    pub similarity: f64,
    pub same_date_of_birth: bool,
}
