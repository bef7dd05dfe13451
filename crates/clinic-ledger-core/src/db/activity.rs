//! Activity log database operations.

use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{column_enum, Database, DbResult};
use crate::models::{ActivityAction, ActivityEntry};

/// Filter for activity log queries. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    pub actor_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    /// Inclusive lower bound (RFC 3339)
    pub since: Option<String>,
    /// Exclusive upper bound (RFC 3339)
    pub until: Option<String>,
    pub limit: Option<usize>,
}

const ACTIVITY_COLUMNS: &str =
    "entry_id, actor_id, action, entity_type, entity_id, details, recorded_at, leaf_hash";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityEntry> {
    let details: String = row.get(5)?;
    Ok(ActivityEntry {
        entry_id: row.get(0)?,
        actor_id: row.get(1)?,
        action: column_enum(2, row.get(2)?, ActivityAction::parse)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        details: serde_json::from_str(&details).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?,
        recorded_at: row.get(6)?,
        leaf_hash: row.get(7)?,
    })
}

impl Database {
    /// Insert an activity entry. Its leaf must already be in the audit tree.
    pub fn insert_activity(&self, entry: &ActivityEntry) -> DbResult<()> {
        let details = serde_json::to_string(&entry.details)?;
        self.conn.execute(
            r#"
            INSERT INTO activity_log (
                entry_id, actor_id, action, entity_type, entity_id, details,
                recorded_at, leaf_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                entry.entry_id,
                entry.actor_id,
                entry.action.as_str(),
                entry.entity_type,
                entry.entity_id,
                details,
                entry.recorded_at,
                entry.leaf_hash,
            ],
        )?;
        Ok(())
    }

    /// Get an entry by ID.
    pub fn get_activity(&self, entry_id: &str) -> DbResult<Option<ActivityEntry>> {
        let sql = format!(
            "SELECT {} FROM activity_log WHERE entry_id = ?",
            ACTIVITY_COLUMNS
        );
        self.conn
            .query_row(&sql, [entry_id], entry_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Query the log, oldest first.
    pub fn query_activity(&self, query: &ActivityQuery) -> DbResult<Vec<ActivityEntry>> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();

        for (column, op, value) in [
            ("actor_id", "=", &query.actor_id),
            ("entity_type", "=", &query.entity_type),
            ("entity_id", "=", &query.entity_id),
            ("recorded_at", ">=", &query.since),
            ("recorded_at", "<", &query.until),
        ] {
            if let Some(v) = value {
                values.push(v.clone());
                clauses.push(format!("{} {} ?{}", column, op, values.len()));
            }
        }

        let mut sql = format!("SELECT {} FROM activity_log", ACTIVITY_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY recorded_at, rowid");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), entry_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// History of a single record.
    pub fn list_activity_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> DbResult<Vec<ActivityEntry>> {
        self.query_activity(&ActivityQuery {
            entity_type: Some(entity_type.to_string()),
            entity_id: Some(entity_id.to_string()),
            ..ActivityQuery::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::AuditNode;

    fn insert(db: &Database, actor: &str, entity: &str, at: &str) -> ActivityEntry {
        let mut entry = ActivityEntry::new(
            actor,
            ActivityAction::Update,
            "patient",
            entity,
            serde_json::json!({"field": "phone"}),
        );
        entry.recorded_at = at.into();
        entry.leaf_hash = format!("leaf-{}", entry.entry_id);
        db.insert_audit_node(&AuditNode::Leaf {
            hash: entry.leaf_hash.clone(),
            payload: "{}".into(),
        })
        .unwrap();
        db.insert_activity(&entry).unwrap();
        entry
    }

    #[test]
    fn test_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let entry = insert(&db, "u1", "p1", "2024-01-01T09:00:00.000Z");
        assert_eq!(db.get_activity(&entry.entry_id).unwrap().unwrap(), entry);
    }

    #[test]
    fn test_requires_audit_leaf() {
        let db = Database::open_in_memory().unwrap();
        let mut entry = ActivityEntry::new(
            "u1",
            ActivityAction::Create,
            "patient",
            "p1",
            serde_json::Value::Null,
        );
        entry.leaf_hash = "missing".into();
        assert!(db.insert_activity(&entry).is_err());
    }

    #[test]
    fn test_query_filters() {
        let db = Database::open_in_memory().unwrap();
        insert(&db, "u1", "p1", "2024-01-01T09:00:00.000Z");
        insert(&db, "u2", "p1", "2024-01-02T09:00:00.000Z");
        insert(&db, "u1", "p2", "2024-01-03T09:00:00.000Z");

        assert_eq!(db.query_activity(&ActivityQuery::default()).unwrap().len(), 3);
        assert_eq!(db.list_activity_for_entity("patient", "p1").unwrap().len(), 2);

        let by_actor = db
            .query_activity(&ActivityQuery {
                actor_id: Some("u1".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_actor.len(), 2);

        let window = db
            .query_activity(&ActivityQuery {
                since: Some("2024-01-02T00:00:00.000Z".into()),
                until: Some("2024-01-03T00:00:00.000Z".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].actor_id, "u2");

        let limited = db
            .query_activity(&ActivityQuery {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }
}
