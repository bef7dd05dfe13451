//! Database layer for the clinic ledger.

mod schema;
mod users;
mod patients;
mod care;
mod charges;
mod payments;
mod shifts;
mod audit;
mod activity;

pub use schema::*;
pub use audit::*;
pub use activity::ActivityQuery;
pub use shifts::ShiftDelta;
pub(crate) use care::{
    admission_status_to_string, case_status_to_string, pathology_status_to_string,
    priority_to_string, string_to_case_status, string_to_priority, string_to_treatment,
    treatment_to_string,
};

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        let db = Self { conn };
        db.initialize()?;
        tracing::debug!(path = %path.as_ref().display(), "Opened clinic ledger database");
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a single transaction.
    ///
    /// Commits when `f` returns `Ok`; any error rolls back every write made
    /// through this database in the meantime. Not reentrant.
    pub fn atomically<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<DbError>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| E::from(DbError::from(e)))?;
        let value = f()?;
        tx.commit().map_err(|e| E::from(DbError::from(e)))?;
        Ok(value)
    }
}

/// Map a stored enum column back to its type, or report a corrupt row.
pub(crate) fn parse_column<T>(
    value: &str,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> DbResult<T> {
    parse(value).ok_or_else(|| DbError::Constraint(format!("Unknown {}: {}", column, value)))
}

/// Same as [`parse_column`], inside a rusqlite row mapper.
pub(crate) fn column_enum<T>(
    idx: usize,
    value: String,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown enum value: {}", value).into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "users",
            "patients",
            "admissions",
            "pathology_orders",
            "fertility_cases",
            "service_charges",
            "payments",
            "payment_allocations",
            "refunds",
            "shifts",
            "cash_movements",
            "audit_nodes",
            "audit_root",
            "activity_log",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let db = Database::open(&path).unwrap();
            db.conn()
                .execute("UPDATE sequences SET value = 41 WHERE name = 'mrn'", [])
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let value: i64 = db
            .conn()
            .query_row("SELECT value FROM sequences WHERE name = 'mrn'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(value, 41);
    }

    #[test]
    fn test_atomically_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();

        let result: DbResult<()> = db.atomically(|| {
            db.conn()
                .execute("UPDATE sequences SET value = 99 WHERE name = 'mrn'", [])?;
            Err(DbError::Constraint("abort".into()))
        });
        assert!(result.is_err());

        let value: i64 = db
            .conn()
            .query_row("SELECT value FROM sequences WHERE name = 'mrn'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(value, 0);
    }

    #[test]
    fn test_atomically_commits() {
        let db = Database::open_in_memory().unwrap();

        let result: DbResult<i64> = db.atomically(|| {
            db.conn()
                .execute("UPDATE sequences SET value = 7 WHERE name = 'mrn'", [])?;
            Ok(7)
        });
        assert_eq!(result.unwrap(), 7);

        let value: i64 = db
            .conn()
            .query_row("SELECT value FROM sequences WHERE name = 'mrn'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(value, 7);
    }
}
