//! Audit trail: activity entries committed to an append-only Merkle tree.

use std::collections::{BTreeMap, HashMap};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::db::{AuditNode, Database};
use crate::models::ActivityEntry;

use super::proof::{AuditProof, ProofStep, Side};

/// Audit trail errors.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DbError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid tree state: {0}")]
    InvalidState(String),
}

pub type AuditResult<T> = Result<T, AuditError>;

/// Result of committing an activity entry.
#[derive(Debug, Clone)]
pub struct LeafCommit {
    /// Hash of the committed leaf
    pub leaf_hash: String,
    /// New root hash after commit
    pub root_hash: String,
    /// New tree height
    pub tree_height: u32,
    /// Total leaf count
    pub leaf_count: u32,
    /// Nodes newly stored by this commit, the leaf included
    pub nodes_written: u32,
}

/// Tree statistics.
#[derive(Debug, Clone)]
pub struct TreeStats {
    pub root_hash: Option<String>,
    pub height: u32,
    pub leaf_count: u32,
}

/// Outcome of re-checking a stored activity entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryVerification {
    pub entry_id: String,
    pub leaf_hash: String,
    /// Stored row still hashes to its leaf
    pub content_matches: bool,
    /// Leaf is included under the current root
    pub proof_valid: bool,
}

impl EntryVerification {
    pub fn is_intact(&self) -> bool {
        self.content_matches && self.proof_valid
    }
}

/// Audit trail manager.
pub struct AuditTrail<'a> {
    db: &'a Database,
}

impl<'a> AuditTrail<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Commit an activity entry and store its row.
    ///
    /// Sets `entry.leaf_hash`. Only the right edge of the tree is touched,
    /// so the work per entry grows with the tree height. Callers wanting
    /// atomicity with the change being logged run this inside
    /// [`Database::atomically`].
    pub fn record(&self, entry: &mut ActivityEntry) -> AuditResult<LeafCommit> {
        let payload = entry.to_canonical_json()?;
        let leaf_hash = hash_data(payload.as_bytes());

        let fresh = self.db.insert_audit_node(&AuditNode::Leaf {
            hash: leaf_hash.clone(),
            payload,
        })?;
        if !fresh {
            return Err(AuditError::InvalidState(format!(
                "activity entry {} already committed",
                entry.entry_id
            )));
        }
        let mut nodes_written = 1u32;

        let state = self.db.get_audit_root()?;
        let leaf_count = state
            .leaf_count
            .checked_add(1)
            .ok_or_else(|| AuditError::InvalidState("audit tree is full".into()))?;
        let mut frontier = self.db.get_audit_frontier()?;
        if frontier.len() != state.leaf_count.count_ones() as usize {
            return Err(AuditError::InvalidState(format!(
                "frontier has {} levels for {} leaves",
                frontier.len(),
                state.leaf_count
            )));
        }

        // Merge completed subtrees of equal size, like a binary increment
        let mut level = 0u32;
        let mut carry = leaf_hash.clone();
        while let Some(left) = frontier.remove(&level) {
            let parent = hash_pair(&left, &carry);
            let node = AuditNode::Internal {
                hash: parent.clone(),
                left,
                right: Some(carry),
            };
            nodes_written += u32::from(self.db.insert_audit_node(&node)?);
            carry = parent;
            level += 1;
        }
        self.db.advance_audit_frontier(level, &carry)?;
        frontier.insert(level, carry);

        let (root_hash, tree_height, right_edge) = fold_frontier(&frontier, leaf_count)?;
        for node in &right_edge {
            nodes_written += u32::from(self.db.insert_audit_node(node)?);
        }
        self.db.update_audit_root(&root_hash, tree_height, leaf_count)?;

        entry.leaf_hash = leaf_hash.clone();
        self.db.insert_activity(entry)?;

        tracing::debug!(
            entry_id = %entry.entry_id,
            action = entry.action.as_str(),
            leaf = %leaf_hash,
            nodes_written,
            "Activity committed to audit trail"
        );

        Ok(LeafCommit {
            leaf_hash,
            root_hash,
            tree_height,
            leaf_count,
            nodes_written,
        })
    }

    /// Every level of the current tree, for proving many leaves at once.
    ///
    /// Fails if the stored leaves no longer fold to the stored root.
    pub fn snapshot(&self) -> AuditResult<TreeSnapshot> {
        let root_hash = self
            .db
            .get_audit_root()?
            .root_hash
            .ok_or_else(|| AuditError::InvalidState("Tree has no root".into()))?;

        let leaves = self.db.get_all_audit_leaf_hashes()?;
        let positions: HashMap<String, usize> = leaves
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();

        let mut levels = vec![leaves];
        while let Some(current) = levels.last().filter(|l| l.len() > 1) {
            let next: Vec<String> = current
                .chunks(2)
                .map(|chunk| hash_pair(&chunk[0], chunk.get(1).unwrap_or(&chunk[0])))
                .collect();
            levels.push(next);
        }

        let computed = levels.last().and_then(|top| top.first());
        if computed != Some(&root_hash) {
            return Err(AuditError::InvalidState(
                "stored leaves do not fold to the stored root".into(),
            ));
        }

        Ok(TreeSnapshot {
            root_hash,
            levels,
            positions,
        })
    }

    /// Generate an inclusion proof for a leaf against the current root.
    pub fn generate_proof(&self, leaf_hash: &str) -> AuditResult<AuditProof> {
        self.snapshot()?.proof(leaf_hash)
    }

    /// Re-hash a stored activity row and check its leaf is still under the root.
    pub fn verify_entry(&self, entry_id: &str) -> AuditResult<EntryVerification> {
        let entry = self
            .db
            .get_activity(entry_id)?
            .ok_or_else(|| AuditError::NodeNotFound(format!("activity entry {}", entry_id)))?;

        let recomputed = hash_data(entry.to_canonical_json()?.as_bytes());
        let content_matches = recomputed == entry.leaf_hash;
        let proof_valid = match self.generate_proof(&entry.leaf_hash) {
            Ok(proof) => verify_proof(&proof),
            Err(AuditError::NodeNotFound(_)) => false,
            Err(e) => return Err(e),
        };

        if !content_matches || !proof_valid {
            tracing::warn!(
                entry_id = %entry_id,
                content_matches,
                proof_valid,
                "Activity entry failed audit verification"
            );
        }

        Ok(EntryVerification {
            entry_id: entry.entry_id,
            leaf_hash: entry.leaf_hash,
            content_matches,
            proof_valid,
        })
    }

    /// Get the current root hash.
    pub fn root_hash(&self) -> AuditResult<Option<String>> {
        Ok(self.db.get_audit_root()?.root_hash)
    }

    /// Get the current tree statistics.
    pub fn stats(&self) -> AuditResult<TreeStats> {
        let state = self.db.get_audit_root()?;
        Ok(TreeStats {
            root_hash: state.root_hash,
            height: state.tree_height,
            leaf_count: state.leaf_count,
        })
    }

    /// Get a leaf's payload by hash.
    pub fn leaf_payload(&self, hash: &str) -> AuditResult<Option<String>> {
        Ok(match self.db.get_audit_node(hash)? {
            Some(AuditNode::Leaf { payload, .. }) => Some(payload),
            _ => None,
        })
    }
}

/// Compute SHA-256 hash of data as lowercase hex.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub(crate) fn hash_pair(left: &str, right: &str) -> String {
    hash_data(format!("{}{}", left, right).as_bytes())
}

/// Root, height and partial right-edge parents for `leaf_count` leaves.
///
/// Level k holds ceil(n / 2^k) nodes. Its last node is partial unless 2^k
/// divides n, and a node left without a sibling is paired with itself.
fn fold_frontier(
    frontier: &BTreeMap<u32, String>,
    leaf_count: u32,
) -> AuditResult<(String, u32, Vec<AuditNode>)> {
    let n = u64::from(leaf_count);
    if n == 0 {
        return Err(AuditError::InvalidState(
            "Cannot build tree with no leaves".into(),
        ));
    }

    let mut edge = Vec::new();
    let mut partial: Option<String> = None;
    let mut level = 0u32;
    loop {
        let complete = if (n >> level) & 1 == 1 {
            let hash = frontier.get(&level).ok_or_else(|| {
                AuditError::InvalidState(format!("frontier is missing level {}", level))
            })?;
            Some(hash)
        } else {
            None
        };

        if n.div_ceil(1u64 << level) == 1 {
            let root = partial
                .or_else(|| complete.cloned())
                .ok_or_else(|| AuditError::InvalidState("tree has no top node".into()))?;
            return Ok((root, level + 1, edge));
        }

        let (left, right) = match (complete, partial.take()) {
            (Some(full), Some(part)) => (full.clone(), Some(part)),
            (Some(full), None) => (full.clone(), None),
            (None, Some(part)) => (part, None),
            (None, None) => {
                level += 1;
                continue;
            }
        };
        let hash = hash_pair(&left, right.as_deref().unwrap_or(&left));
        edge.push(AuditNode::Internal {
            hash: hash.clone(),
            left,
            right,
        });
        partial = Some(hash);
        level += 1;
    }
}

/// All levels of the tree under one root.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    root_hash: String,
    levels: Vec<Vec<String>>,
    positions: HashMap<String, usize>,
}

impl TreeSnapshot {
    pub fn root_hash(&self) -> &str {
        &self.root_hash
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Inclusion proof for a leaf under this snapshot's root.
    pub fn proof(&self, leaf_hash: &str) -> AuditResult<AuditProof> {
        let leaf_index = *self
            .positions
            .get(leaf_hash)
            .ok_or_else(|| AuditError::NodeNotFound(leaf_hash.to_string()))?;

        let mut path = Vec::with_capacity(self.levels.len());
        let mut index = leaf_index;
        for level in self.levels.iter().take_while(|l| l.len() > 1) {
            let sibling = level.get(index ^ 1).unwrap_or(&level[index]).clone();
            // Even index means we are the left child
            let position = if index % 2 == 0 { Side::Right } else { Side::Left };
            path.push(ProofStep {
                hash: sibling,
                position,
            });
            index /= 2;
        }

        Ok(AuditProof {
            leaf_hash: leaf_hash.to_string(),
            root_hash: self.root_hash.clone(),
            leaf_index,
            path,
        })
    }
}

/// Verify a proof without database access.
pub fn verify_proof(proof: &AuditProof) -> bool {
    proof.computed_root() == proof.root_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityAction;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn entry(entity: &str) -> ActivityEntry {
        ActivityEntry::new(
            "user-1",
            ActivityAction::Create,
            "patient",
            entity,
            serde_json::json!({"mrn": entity}),
        )
    }

    #[test]
    fn test_record_single_entry() {
        let db = setup_db();
        let trail = AuditTrail::new(&db);

        let mut e = entry("p1");
        let commit = trail.record(&mut e).unwrap();

        assert_eq!(commit.leaf_count, 1);
        assert_eq!(commit.tree_height, 1);
        // Single leaf tree: root = leaf
        assert_eq!(commit.leaf_hash, commit.root_hash);
        assert_eq!(e.leaf_hash, commit.leaf_hash);
        assert!(db.get_activity(&e.entry_id).unwrap().is_some());
    }

    #[test]
    fn test_record_multiple_entries() {
        let db = setup_db();
        let trail = AuditTrail::new(&db);

        let c1 = trail.record(&mut entry("p1")).unwrap();
        let c2 = trail.record(&mut entry("p2")).unwrap();
        let c3 = trail.record(&mut entry("p3")).unwrap();

        assert_eq!(c3.leaf_count, 3);
        assert_ne!(c1.root_hash, c2.root_hash);
        assert_ne!(c2.root_hash, c3.root_hash);
        assert_eq!(c2.tree_height, 2);
        assert_eq!(c3.tree_height, 3);
    }

    /// Root and height from scratch, odd nodes paired with themselves.
    fn rebuild(leaves: &[String]) -> (String, u32) {
        let mut level = leaves.to_vec();
        let mut height = 1;
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|c| hash_pair(&c[0], c.get(1).unwrap_or(&c[0])))
                .collect();
            height += 1;
        }
        (level[0].clone(), height)
    }

    #[test]
    fn test_incremental_root_matches_full_rebuild() {
        let db = setup_db();
        let trail = AuditTrail::new(&db);

        for i in 0..40 {
            let commit = trail.record(&mut entry(&format!("p{}", i))).unwrap();
            let leaves = db.get_all_audit_leaf_hashes().unwrap();
            let (root, height) = rebuild(&leaves);
            assert_eq!(commit.root_hash, root, "root diverged at {} leaves", leaves.len());
            assert_eq!(commit.tree_height, height);
            assert_eq!(
                db.get_audit_frontier().unwrap().len(),
                commit.leaf_count.count_ones() as usize
            );
            assert!(db.get_audit_node(&root).unwrap().is_some());
        }
    }

    #[test]
    fn test_append_work_bounded_by_height() {
        let db = setup_db();
        let trail = AuditTrail::new(&db);

        let mut last = None;
        for i in 0..1100 {
            let commit = trail.record(&mut entry(&format!("p{}", i))).unwrap();
            assert!(
                commit.nodes_written <= 2 * commit.tree_height,
                "{} nodes written at height {}",
                commit.nodes_written,
                commit.tree_height
            );
            last = Some(commit);
        }

        let last = last.unwrap();
        assert_eq!(last.leaf_count, 1100);
        assert_eq!(last.tree_height, 12);
        // 1100 = 0b10001001100
        assert_eq!(db.get_audit_frontier().unwrap().len(), 4);

        let snapshot = trail.snapshot().unwrap();
        assert_eq!(snapshot.root_hash(), last.root_hash);
        assert_eq!(snapshot.leaf_count(), 1100);
        let proof = snapshot.proof(&last.leaf_hash).unwrap();
        assert_eq!(proof.path.len(), 11);
        assert!(verify_proof(&proof));
    }

    #[test]
    fn test_snapshot_rejects_foreign_root() {
        let db = setup_db();
        let trail = AuditTrail::new(&db);
        let first = trail.record(&mut entry("p1")).unwrap();
        trail.record(&mut entry("p2")).unwrap();

        db.conn()
            .execute(
                "UPDATE audit_root SET root_hash = ? WHERE id = 1",
                [&first.leaf_hash],
            )
            .unwrap();

        assert!(matches!(trail.snapshot(), Err(AuditError::InvalidState(_))));
    }

    #[test]
    fn test_rerecording_same_entry_rejected() {
        let db = setup_db();
        let trail = AuditTrail::new(&db);

        let mut e = entry("p1");
        trail.record(&mut e).unwrap();
        let mut again = e.clone();
        again.leaf_hash.clear();
        assert!(matches!(
            trail.record(&mut again),
            Err(AuditError::InvalidState(_))
        ));
    }

    #[test]
    fn test_proofs_for_every_leaf() {
        let db = setup_db();
        let trail = AuditTrail::new(&db);

        for i in 0..7 {
            trail.record(&mut entry(&format!("p{}", i))).unwrap();
        }

        for leaf in db.get_all_audit_leaf_hashes().unwrap() {
            let proof = trail.generate_proof(&leaf).unwrap();
            assert!(verify_proof(&proof), "proof failed for {}", leaf);
        }
    }

    #[test]
    fn test_tampered_proof_fails() {
        let db = setup_db();
        let trail = AuditTrail::new(&db);
        trail.record(&mut entry("p1")).unwrap();
        trail.record(&mut entry("p2")).unwrap();

        let leaves = db.get_all_audit_leaf_hashes().unwrap();
        let mut proof = trail.generate_proof(&leaves[0]).unwrap();
        proof.leaf_hash = "tampered_hash".to_string();
        assert!(!verify_proof(&proof));

        let mut truncated = trail.generate_proof(&leaves[0]).unwrap();
        truncated.path.pop();
        assert!(!verify_proof(&truncated));
    }

    #[test]
    fn test_verify_entry_detects_row_tampering() {
        let db = setup_db();
        let trail = AuditTrail::new(&db);

        let mut e = entry("p1");
        trail.record(&mut e).unwrap();
        trail.record(&mut entry("p2")).unwrap();

        let ok = trail.verify_entry(&e.entry_id).unwrap();
        assert!(ok.is_intact());

        db.conn()
            .execute(
                "UPDATE activity_log SET actor_id = 'someone-else' WHERE entry_id = ?",
                [&e.entry_id],
            )
            .unwrap();

        let tampered = trail.verify_entry(&e.entry_id).unwrap();
        assert!(!tampered.content_matches);
        assert!(tampered.proof_valid);
        assert!(!tampered.is_intact());
    }

    #[test]
    fn test_leaf_payload_recovers_entry() {
        let db = setup_db();
        let trail = AuditTrail::new(&db);

        let mut e = entry("p1");
        let commit = trail.record(&mut e).unwrap();

        let payload = trail.leaf_payload(&commit.leaf_hash).unwrap().unwrap();
        let recovered: ActivityEntry = serde_json::from_str(&payload).unwrap();
        assert_eq!(recovered.entry_id, e.entry_id);
        assert!(recovered.leaf_hash.is_empty());
    }

    #[test]
    fn test_hash_deterministic() {
        let hash1 = hash_data(b"test data");
        let hash2 = hash_data(b"test data");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}
