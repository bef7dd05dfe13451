//! Service charge database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{column_enum, Database, DbError, DbResult};
use crate::models::{ChargeKind, ChargeSource, ChargeStatus, ServiceCharge};

const CHARGE_COLUMNS: &str = r#"
    charge_id, patient_id, source_kind, source_reference, description,
    amount_cents, allocated_cents, status, posted_by, charged_at, updated_at
"#;

fn charge_from_row(row: &Row<'_>) -> rusqlite::Result<ServiceCharge> {
    Ok(ServiceCharge {
        charge_id: row.get(0)?,
        patient_id: row.get(1)?,
        source: ChargeSource {
            kind: column_enum(2, row.get(2)?, ChargeKind::parse)?,
            reference_id: row.get(3)?,
        },
        description: row.get(4)?,
        amount_cents: row.get(5)?,
        allocated_cents: row.get(6)?,
        status: column_enum(7, row.get(7)?, ChargeStatus::parse)?,
        posted_by: row.get(8)?,
        charged_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl Database {
    /// Insert a new charge.
    pub fn insert_charge(&self, charge: &ServiceCharge) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO service_charges (
                charge_id, patient_id, source_kind, source_reference, description,
                amount_cents, allocated_cents, status, posted_by, charged_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                charge.charge_id,
                charge.patient_id,
                charge.source.kind.as_str(),
                charge.source.reference_id,
                charge.description,
                charge.amount_cents,
                charge.allocated_cents,
                charge.status.as_str(),
                charge.posted_by,
                charge.charged_at,
                charge.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a charge by ID.
    pub fn get_charge(&self, charge_id: &str) -> DbResult<Option<ServiceCharge>> {
        let sql = format!(
            "SELECT {} FROM service_charges WHERE charge_id = ?",
            CHARGE_COLUMNS
        );
        self.conn
            .query_row(&sql, [charge_id], charge_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// All charges for a patient, oldest first.
    pub fn list_charges_for_patient(&self, patient_id: &str) -> DbResult<Vec<ServiceCharge>> {
        let sql = format!(
            "SELECT {} FROM service_charges WHERE patient_id = ? ORDER BY charged_at, rowid",
            CHARGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], charge_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Charges with a balance still owing, oldest first.
    pub fn list_outstanding_charges(&self, patient_id: &str) -> DbResult<Vec<ServiceCharge>> {
        let sql = format!(
            r#"
            SELECT {} FROM service_charges
            WHERE patient_id = ? AND status IN ('open', 'partially_paid')
            ORDER BY charged_at, rowid
            "#,
            CHARGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], charge_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Charges raised by a given source record (admission, order, case).
    pub fn list_charges_for_source(&self, reference_id: &str) -> DbResult<Vec<ServiceCharge>> {
        let sql = format!(
            "SELECT {} FROM service_charges WHERE source_reference = ? ORDER BY charged_at, rowid",
            CHARGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([reference_id], charge_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Add `delta_cents` (may be negative) to the allocated amount and
    /// recompute the status in the same statement.
    pub fn adjust_charge_allocation(&self, charge_id: &str, delta_cents: i64) -> DbResult<()> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE service_charges SET
                allocated_cents = allocated_cents + ?2,
                status = CASE
                    WHEN allocated_cents + ?2 <= 0 THEN 'open'
                    WHEN allocated_cents + ?2 < amount_cents THEN 'partially_paid'
                    ELSE 'paid'
                END,
                updated_at = ?3
            WHERE charge_id = ?1 AND status != 'voided'
            "#,
            params![charge_id, delta_cents, crate::models::now_timestamp()],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("open charge {}", charge_id)));
        }
        Ok(())
    }

    /// Mark a charge voided. Only unallocated charges can be voided.
    pub fn void_charge(&self, charge_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE service_charges SET status = 'voided', updated_at = ?2
            WHERE charge_id = ?1 AND allocated_cents = 0 AND status != 'voided'
            "#,
            params![charge_id, crate::models::now_timestamp()],
        )?;
        Ok(rows_affected > 0)
    }
}
