//! Audit tree node storage.
//!
//! Nodes are content-addressed by hash, so an internal node shared by two
//! successive trees is stored once. The frontier table keeps one pending
//! subtree per level so appends never reread the leaves.

use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};

/// A stored audit tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditNode {
    /// Committed activity entry; `payload` is its canonical JSON
    Leaf { hash: String, payload: String },
    /// `right` is absent when the left child was paired with itself
    Internal {
        hash: String,
        left: String,
        right: Option<String>,
    },
}

impl AuditNode {
    pub fn hash(&self) -> &str {
        match self {
            AuditNode::Leaf { hash, .. } | AuditNode::Internal { hash, .. } => hash,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AuditNode::Leaf { .. } => "leaf",
            AuditNode::Internal { .. } => "internal",
        }
    }
}

/// Root bookkeeping, a single row.
#[derive(Debug, Clone)]
pub struct AuditRootState {
    pub root_hash: Option<String>,
    pub tree_height: u32,
    pub leaf_count: u32,
    pub updated_at: String,
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<AuditNode> {
    let hash: String = row.get(0)?;
    let kind: String = row.get(1)?;
    match kind.as_str() {
        "leaf" => Ok(AuditNode::Leaf {
            hash,
            payload: row.get(4)?,
        }),
        "internal" => Ok(AuditNode::Internal {
            hash,
            left: row.get(2)?,
            right: row.get(3)?,
        }),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown node type: {}", other).into(),
        )),
    }
}

impl Database {
    /// Store a node. Returns false when a node with that hash already exists.
    pub fn insert_audit_node(&self, node: &AuditNode) -> DbResult<bool> {
        let (left, right, payload) = match node {
            AuditNode::Leaf { payload, .. } => (None, None, Some(payload.as_str())),
            AuditNode::Internal { left, right, .. } => {
                (Some(left.as_str()), right.as_deref(), None)
            }
        };
        let inserted = self
            .conn
            .prepare_cached(
                r#"
                INSERT OR IGNORE INTO audit_nodes (hash, node_type, left_child, right_child, payload)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?
            .execute(params![node.hash(), node.kind(), left, right, payload])?;
        Ok(inserted == 1)
    }

    pub fn get_audit_node(&self, hash: &str) -> DbResult<Option<AuditNode>> {
        self.conn
            .prepare_cached(
                "SELECT hash, node_type, left_child, right_child, payload FROM audit_nodes WHERE hash = ?",
            )?
            .query_row([hash], node_from_row)
            .optional()
            .map_err(Into::into)
    }

    pub fn audit_node_exists(&self, hash: &str) -> DbResult<bool> {
        self.conn
            .prepare_cached("SELECT EXISTS(SELECT 1 FROM audit_nodes WHERE hash = ?)")?
            .query_row([hash], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn get_audit_root(&self) -> DbResult<AuditRootState> {
        self.conn
            .prepare_cached(
                "SELECT root_hash, tree_height, leaf_count, updated_at FROM audit_root WHERE id = 1",
            )?
            .query_row([], |row| {
                Ok(AuditRootState {
                    root_hash: row.get(0)?,
                    tree_height: row.get(1)?,
                    leaf_count: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })
            .map_err(Into::into)
    }

    /// Move the root forward. The leaf count may only grow.
    pub fn update_audit_root(
        &self,
        root_hash: &str,
        tree_height: u32,
        leaf_count: u32,
    ) -> DbResult<()> {
        let updated = self
            .conn
            .prepare_cached(
                r#"
                UPDATE audit_root
                SET root_hash = ?1, tree_height = ?2, leaf_count = ?3,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                WHERE id = 1 AND leaf_count <= ?3
                "#,
            )?
            .execute(params![root_hash, tree_height, leaf_count])?;
        if updated == 0 {
            return Err(DbError::Constraint(format!(
                "audit root cannot shrink to {} leaves",
                leaf_count
            )));
        }
        Ok(())
    }

    /// Pending completed-subtree hashes keyed by level.
    pub fn get_audit_frontier(&self) -> DbResult<BTreeMap<u32, String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT level, hash FROM audit_frontier")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<BTreeMap<_, _>, _>>().map_err(Into::into)
    }

    /// Record `hash` as pending at `level`, clearing the levels it absorbed.
    pub fn advance_audit_frontier(&self, level: u32, hash: &str) -> DbResult<()> {
        self.conn
            .prepare_cached("DELETE FROM audit_frontier WHERE level <= ?1")?
            .execute([level])?;
        self.conn
            .prepare_cached("INSERT INTO audit_frontier (level, hash) VALUES (?1, ?2)")?
            .execute(params![level, hash])?;
        Ok(())
    }

    /// Leaf hashes in commit order.
    pub fn get_all_audit_leaf_hashes(&self) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT hash FROM audit_nodes WHERE node_type = 'leaf' ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(hash: &str) -> AuditNode {
        AuditNode::Leaf {
            hash: hash.to_string(),
            payload: format!(r#"{{"entry": "{}"}}"#, hash),
        }
    }

    #[test]
    fn test_nodes_round_trip_by_kind() {
        let db = Database::open_in_memory().unwrap();
        db.insert_audit_node(&leaf("leaf1")).unwrap();
        db.insert_audit_node(&leaf("leaf2")).unwrap();
        let parent = AuditNode::Internal {
            hash: "parent".into(),
            left: "leaf1".into(),
            right: Some("leaf2".into()),
        };
        db.insert_audit_node(&parent).unwrap();

        assert_eq!(db.get_audit_node("leaf1").unwrap(), Some(leaf("leaf1")));
        assert_eq!(db.get_audit_node("parent").unwrap(), Some(parent.clone()));
        assert!(db.get_audit_node("missing").unwrap().is_none());

        assert!(!db.insert_audit_node(&leaf("leaf1")).unwrap());
        assert!(!db.insert_audit_node(&parent).unwrap());
    }

    #[test]
    fn test_frontier_advance_clears_absorbed_levels() {
        let db = Database::open_in_memory().unwrap();
        for hash in ["a", "b", "ab", "c"] {
            db.insert_audit_node(&leaf(hash)).unwrap();
        }
        assert!(db.get_audit_frontier().unwrap().is_empty());

        db.advance_audit_frontier(0, "a").unwrap();
        db.advance_audit_frontier(1, "ab").unwrap();
        let frontier = db.get_audit_frontier().unwrap();
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier.get(&1).map(String::as_str), Some("ab"));

        db.advance_audit_frontier(0, "c").unwrap();
        let frontier = db.get_audit_frontier().unwrap();
        assert_eq!(frontier.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_schema_rejects_childless_internal_node() {
        let db = Database::open_in_memory().unwrap();
        let result = db.conn().execute(
            "INSERT INTO audit_nodes (hash, node_type) VALUES ('x', 'internal')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_root_only_moves_forward() {
        let db = Database::open_in_memory().unwrap();

        let state = db.get_audit_root().unwrap();
        assert!(state.root_hash.is_none());
        assert_eq!(state.leaf_count, 0);

        db.insert_audit_node(&leaf("leaf1")).unwrap();
        db.update_audit_root("leaf1", 1, 1).unwrap();
        let state = db.get_audit_root().unwrap();
        assert_eq!(state.root_hash.as_deref(), Some("leaf1"));
        assert_eq!(state.tree_height, 1);

        assert!(matches!(
            db.update_audit_root("other", 1, 0),
            Err(DbError::Constraint(_))
        ));
    }

    #[test]
    fn test_leaves_in_insertion_order() {
        let db = Database::open_in_memory().unwrap();

        // Same-millisecond inserts must still come back in order
        for hash in ["c", "a", "b"] {
            db.insert_audit_node(&leaf(hash)).unwrap();
        }
        assert_eq!(db.get_all_audit_leaf_hashes().unwrap(), vec!["c", "a", "b"]);
        assert!(db.audit_node_exists("a").unwrap());
        assert!(!db.audit_node_exists("z").unwrap());
    }
}
