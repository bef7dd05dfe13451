//! Compliance export of the activity log with inclusion proofs.

use serde::{Deserialize, Serialize};

use crate::audit::{
    hash_data, verify_proof, AuditResult, AuditTrail, ExportedProof, HASH_ALGORITHM,
    PROOF_FORMAT_VERSION,
};
use crate::db::{ActivityQuery, Database};
use crate::models::{now_timestamp, ActivityEntry};

/// One activity entry with its proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditedEntry {
    pub entry: ActivityEntry,
    pub proof: ExportedProof,
}

/// Audit export metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExportMetadata {
    /// Export format version
    pub format_version: String,
    pub exported_at: String,
    pub hash_algorithm: String,
    /// Root hash at export time
    pub root_hash: String,
    pub tree_height: u32,
    pub leaf_count: u32,
    /// Exporting system identifier
    pub system_id: Option<String>,
}

/// Batch of audited activity for external review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    pub metadata: AuditExportMetadata,
    pub entries: Vec<AuditedEntry>,
}

/// Result of proof verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProofVerification {
    pub entry_id: String,
    pub leaf_hash: String,
    /// Entry content hashes to the proven leaf
    pub content_matches: bool,
    /// Leaf is included under the exported root
    pub is_valid: bool,
}

impl AuditExport {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Verify every entry against its proof, without database access.
    pub fn verify_all_proofs(&self) -> Vec<ProofVerification> {
        self.entries
            .iter()
            .map(|audited| {
                let content_matches = audited
                    .entry
                    .to_canonical_json()
                    .map(|json| hash_data(json.as_bytes()) == audited.proof.leaf_hash)
                    .unwrap_or(false);
                let proof = audited.proof.to_proof();

                ProofVerification {
                    entry_id: audited.entry.entry_id.clone(),
                    leaf_hash: audited.proof.leaf_hash.clone(),
                    content_matches,
                    is_valid: audited.proof.is_supported()
                        && proof.root_hash == self.metadata.root_hash
                        && verify_proof(&proof),
                }
            })
            .collect()
    }
}

/// Audit exporter.
pub struct AuditExporter<'a> {
    db: &'a Database,
    trail: AuditTrail<'a>,
    system_id: Option<String>,
}

impl<'a> AuditExporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            trail: AuditTrail::new(db),
            system_id: None,
        }
    }

    /// Set the system identifier for exports.
    pub fn with_system_id(mut self, system_id: String) -> Self {
        self.system_id = Some(system_id);
        self
    }

    /// Export the entire activity log.
    pub fn export_all(&self) -> AuditResult<AuditExport> {
        self.export_query(&ActivityQuery::default())
    }

    /// Export the entries matching a filter, e.g. a date range or one record's history.
    pub fn export_query(&self, query: &ActivityQuery) -> AuditResult<AuditExport> {
        let stats = self.trail.stats()?;
        let activity = self.db.query_activity(query)?;
        let entries = if activity.is_empty() {
            Vec::new()
        } else {
            // One pass over the leaves serves every proof
            let snapshot = self.trail.snapshot()?;
            activity
                .into_iter()
                .map(|entry| {
                    let proof = snapshot.proof(&entry.leaf_hash)?;
                    Ok(AuditedEntry {
                        entry,
                        proof: proof.to_export_format(),
                    })
                })
                .collect::<AuditResult<Vec<_>>>()?
        };

        Ok(AuditExport {
            metadata: AuditExportMetadata {
                format_version: PROOF_FORMAT_VERSION.to_string(),
                exported_at: now_timestamp(),
                hash_algorithm: HASH_ALGORITHM.to_string(),
                root_hash: stats.root_hash.unwrap_or_default(),
                tree_height: stats.height,
                leaf_count: stats.leaf_count,
                system_id: self.system_id.clone(),
            },
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityAction;

    fn record(db: &Database, entity: &str) -> ActivityEntry {
        let mut entry = ActivityEntry::new(
            "user-1",
            ActivityAction::Update,
            "patient",
            entity,
            serde_json::json!({"field": "phone"}),
        );
        AuditTrail::new(db).record(&mut entry).unwrap();
        entry
    }

    #[test]
    fn test_export_all_with_valid_proofs() {
        let db = Database::open_in_memory().unwrap();
        for i in 1..=3 {
            record(&db, &format!("p{}", i));
        }

        let export = AuditExporter::new(&db)
            .with_system_id("test-system".into())
            .export_all()
            .unwrap();

        assert_eq!(export.entries.len(), 3);
        assert_eq!(export.metadata.leaf_count, 3);
        assert_eq!(export.metadata.system_id, Some("test-system".into()));

        let verifications = export.verify_all_proofs();
        assert!(verifications.iter().all(|v| v.is_valid && v.content_matches));
    }

    #[test]
    fn test_export_query_filters_entity() {
        let db = Database::open_in_memory().unwrap();
        record(&db, "p1");
        record(&db, "p2");

        let export = AuditExporter::new(&db)
            .export_query(&ActivityQuery {
                entity_id: Some("p2".into()),
                ..ActivityQuery::default()
            })
            .unwrap();

        assert_eq!(export.entries.len(), 1);
        assert_eq!(export.entries[0].entry.entity_id, "p2");
        assert_eq!(export.metadata.leaf_count, 2);
    }

    #[test]
    fn test_edited_export_fails_verification() {
        let db = Database::open_in_memory().unwrap();
        record(&db, "p1");
        record(&db, "p2");

        let mut export = AuditExporter::new(&db).export_all().unwrap();
        export.entries[0].entry.actor_id = "someone-else".into();

        let verifications = export.verify_all_proofs();
        assert!(!verifications[0].content_matches);
        assert!(verifications[0].is_valid);
        assert!(verifications[1].content_matches);
    }

    #[test]
    fn test_export_json() {
        let db = Database::open_in_memory().unwrap();
        record(&db, "p1");

        let json = AuditExporter::new(&db).export_all().unwrap().to_json().unwrap();
        assert!(json.contains("audit_path"));
        assert!(json.contains("SHA-256"));
        assert!(json.contains("leaf_hash"));
    }
}
