//! Patient database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::Patient;

const PATIENT_COLUMNS: &str = r#"
    patient_id, mrn, first_name, last_name, date_of_birth, sex, phone, email,
    address, notes, active, created_at, updated_at
"#;

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        patient_id: row.get(0)?,
        mrn: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        date_of_birth: row.get(4)?,
        sex: row.get(5)?,
        phone: row.get(6)?,
        email: row.get(7)?,
        address: row.get(8)?,
        notes: row.get(9)?,
        active: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                patient_id, mrn, first_name, last_name, date_of_birth, sex, phone,
                email, address, notes, active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                patient.patient_id,
                patient.mrn,
                patient.first_name,
                patient.last_name,
                patient.date_of_birth,
                patient.sex,
                patient.phone,
                patient.email,
                patient.address,
                patient.notes,
                patient.active,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing patient. The MRN never changes.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                first_name = ?2,
                last_name = ?3,
                date_of_birth = ?4,
                sex = ?5,
                phone = ?6,
                email = ?7,
                address = ?8,
                notes = ?9,
                active = ?10,
                updated_at = ?11
            WHERE patient_id = ?1
            "#,
            params![
                patient.patient_id,
                patient.first_name,
                patient.last_name,
                patient.date_of_birth,
                patient.sex,
                patient.phone,
                patient.email,
                patient.address,
                patient.notes,
                patient.active,
                patient.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, patient_id: &str) -> DbResult<Option<Patient>> {
        let sql = format!("SELECT {} FROM patients WHERE patient_id = ?", PATIENT_COLUMNS);
        self.conn
            .query_row(&sql, [patient_id], patient_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Get a patient by medical record number.
    pub fn get_patient_by_mrn(&self, mrn: &str) -> DbResult<Option<Patient>> {
        let sql = format!("SELECT {} FROM patients WHERE mrn = ?", PATIENT_COLUMNS);
        self.conn
            .query_row(&sql, [mrn], patient_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Search patients by first/last name, MRN or phone (prefix match).
    ///
    /// `%` and `_` in the query match literally.
    pub fn search_patients(&self, query: &str, limit: usize) -> DbResult<Vec<Patient>> {
        let pattern = format!("{}%", escape_like(query.trim()));
        let sql = format!(
            r#"
            SELECT {} FROM patients
            WHERE first_name LIKE ?1 ESCAPE '\'
               OR last_name LIKE ?1 ESCAPE '\'
               OR (first_name || ' ' || last_name) LIKE ?1 ESCAPE '\'
               OR mrn LIKE ?1 ESCAPE '\'
               OR phone LIKE ?1 ESCAPE '\'
            ORDER BY last_name, first_name
            LIMIT ?2
            "#,
            PATIENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, limit as i64], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List all patients.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let sql = format!(
            "SELECT {} FROM patients ORDER BY last_name, first_name",
            PATIENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List active patients.
    pub fn list_active_patients(&self) -> DbResult<Vec<Patient>> {
        let sql = format!(
            "SELECT {} FROM patients WHERE active = 1 ORDER BY last_name, first_name",
            PATIENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Allocate the next MRN sequence number.
    pub fn next_mrn_sequence(&self) -> DbResult<i64> {
        self.conn.execute(
            "UPDATE sequences SET value = value + 1 WHERE name = 'mrn'",
            [],
        )?;
        self.conn
            .query_row("SELECT value FROM sequences WHERE name = 'mrn'", [], |row| {
                row.get(0)
            })
            .map_err(Into::into)
    }
}

/// Escape LIKE wildcards with a backslash.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
