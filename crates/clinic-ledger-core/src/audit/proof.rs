//! Inclusion proofs for audit trail leaves.

use serde::{Deserialize, Serialize};

use super::trail::hash_pair;

pub const PROOF_FORMAT_VERSION: &str = "1.0";
pub const HASH_ALGORITHM: &str = "SHA-256";

/// Which side of the running hash a sibling is concatenated on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One level of the path from leaf to root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofStep {
    /// Sibling hash
    pub hash: String,
    pub position: Side,
}

/// Proof that a leaf is included under a given root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditProof {
    pub leaf_hash: String,
    /// Root at the time the proof was generated
    pub root_hash: String,
    /// Insertion position of the leaf
    pub leaf_index: usize,
    /// Siblings, leaf level first
    pub path: Vec<ProofStep>,
}

impl AuditProof {
    /// Fold the path over the leaf hash.
    pub fn computed_root(&self) -> String {
        self.path.iter().fold(self.leaf_hash.clone(), |acc, step| match step.position {
            Side::Right => hash_pair(&acc, &step.hash),
            Side::Left => hash_pair(&step.hash, &acc),
        })
    }

    pub fn to_export_format(&self) -> ExportedProof {
        ExportedProof {
            version: PROOF_FORMAT_VERSION.to_string(),
            algorithm: HASH_ALGORITHM.to_string(),
            leaf_hash: self.leaf_hash.clone(),
            root_hash: self.root_hash.clone(),
            leaf_index: self.leaf_index,
            audit_path: self.path.clone(),
        }
    }
}

/// Self-describing proof handed to external auditors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportedProof {
    pub version: String,
    pub algorithm: String,
    pub leaf_hash: String,
    pub root_hash: String,
    pub leaf_index: usize,
    pub audit_path: Vec<ProofStep>,
}

impl ExportedProof {
    /// Whether this build can check the proof.
    pub fn is_supported(&self) -> bool {
        self.algorithm == HASH_ALGORITHM && self.version == PROOF_FORMAT_VERSION
    }

    pub fn to_proof(&self) -> AuditProof {
        AuditProof {
            leaf_hash: self.leaf_hash.clone(),
            root_hash: self.root_hash.clone(),
            leaf_index: self.leaf_index,
            path: self.audit_path.clone(),
        }
    }
}
