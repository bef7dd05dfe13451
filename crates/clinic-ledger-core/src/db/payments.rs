//! Payment, allocation and refund database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{column_enum, Database, DbError, DbResult};
use crate::models::{Payment, PaymentAllocation, PaymentMethod, Refund};

const PAYMENT_COLUMNS: &str = r#"
    payment_id, patient_id, shift_id, received_by, method, amount_cents,
    allocated_cents, refunded_cents, reference, received_at
"#;

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        payment_id: row.get(0)?,
        patient_id: row.get(1)?,
        shift_id: row.get(2)?,
        received_by: row.get(3)?,
        method: column_enum(4, row.get(4)?, PaymentMethod::parse)?,
        amount_cents: row.get(5)?,
        allocated_cents: row.get(6)?,
        refunded_cents: row.get(7)?,
        reference: row.get(8)?,
        received_at: row.get(9)?,
    })
}

fn allocation_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentAllocation> {
    Ok(PaymentAllocation {
        allocation_id: row.get(0)?,
        payment_id: row.get(1)?,
        charge_id: row.get(2)?,
        amount_cents: row.get(3)?,
        allocated_at: row.get(4)?,
    })
}

fn refund_from_row(row: &Row<'_>) -> rusqlite::Result<Refund> {
    Ok(Refund {
        refund_id: row.get(0)?,
        payment_id: row.get(1)?,
        shift_id: row.get(2)?,
        method: column_enum(3, row.get(3)?, PaymentMethod::parse)?,
        amount_cents: row.get(4)?,
        reason: row.get(5)?,
        refunded_by: row.get(6)?,
        refunded_at: row.get(7)?,
    })
}

impl Database {
    // =========================================================================
    // Payments
    // =========================================================================

    /// Insert a new payment.
    pub fn insert_payment(&self, payment: &Payment) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO payments (
                payment_id, patient_id, shift_id, received_by, method, amount_cents,
                allocated_cents, refunded_cents, reference, received_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                payment.payment_id,
                payment.patient_id,
                payment.shift_id,
                payment.received_by,
                payment.method.as_str(),
                payment.amount_cents,
                payment.allocated_cents,
                payment.refunded_cents,
                payment.reference,
                payment.received_at,
            ],
        )?;
        Ok(())
    }

    /// Get a payment by ID.
    pub fn get_payment(&self, payment_id: &str) -> DbResult<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE payment_id = ?", PAYMENT_COLUMNS);
        self.conn
            .query_row(&sql, [payment_id], payment_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// All payments for a patient, oldest first.
    pub fn list_payments_for_patient(&self, patient_id: &str) -> DbResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE patient_id = ? ORDER BY received_at, rowid",
            PAYMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], payment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Payments taken on a shift, oldest first.
    pub fn list_payments_for_shift(&self, shift_id: &str) -> DbResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE shift_id = ? ORDER BY received_at, rowid",
            PAYMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([shift_id], payment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Payments with credit left to apply, oldest first.
    pub fn list_unallocated_payments(&self, patient_id: &str) -> DbResult<Vec<Payment>> {
        let sql = format!(
            r#"
            SELECT {} FROM payments
            WHERE patient_id = ? AND amount_cents - refunded_cents - allocated_cents > 0
            ORDER BY received_at, rowid
            "#,
            PAYMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], payment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Add to (or subtract from) a payment's allocated and refunded totals.
    pub fn adjust_payment_totals(
        &self,
        payment_id: &str,
        allocated_delta: i64,
        refunded_delta: i64,
    ) -> DbResult<()> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE payments SET
                allocated_cents = allocated_cents + ?2,
                refunded_cents = refunded_cents + ?3
            WHERE payment_id = ?1
            "#,
            params![payment_id, allocated_delta, refunded_delta],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("payment {}", payment_id)));
        }
        Ok(())
    }

    // =========================================================================
    // Allocations
    // =========================================================================

    /// Insert an allocation row.
    pub fn insert_allocation(&self, allocation: &PaymentAllocation) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO payment_allocations (
                allocation_id, payment_id, charge_id, amount_cents, allocated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                allocation.allocation_id,
                allocation.payment_id,
                allocation.charge_id,
                allocation.amount_cents,
                allocation.allocated_at,
            ],
        )?;
        Ok(())
    }

    /// Allocations of a payment, newest first (reversal order).
    pub fn list_allocations_for_payment(
        &self,
        payment_id: &str,
    ) -> DbResult<Vec<PaymentAllocation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT allocation_id, payment_id, charge_id, amount_cents, allocated_at
            FROM payment_allocations
            WHERE payment_id = ?
            ORDER BY allocated_at DESC, rowid DESC
            "#,
        )?;
        let rows = stmt.query_map([payment_id], allocation_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Allocations against a charge, oldest first.
    pub fn list_allocations_for_charge(
        &self,
        charge_id: &str,
    ) -> DbResult<Vec<PaymentAllocation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT allocation_id, payment_id, charge_id, amount_cents, allocated_at
            FROM payment_allocations
            WHERE charge_id = ?
            ORDER BY allocated_at, rowid
            "#,
        )?;
        let rows = stmt.query_map([charge_id], allocation_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Shrink an allocation by `amount_cents`, deleting it when it reaches zero.
    pub fn reduce_allocation(&self, allocation_id: &str, amount_cents: i64) -> DbResult<()> {
        let current: i64 = self
            .conn
            .query_row(
                "SELECT amount_cents FROM payment_allocations WHERE allocation_id = ?",
                [allocation_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("allocation {}", allocation_id)))?;

        if amount_cents > current {
            return Err(DbError::Constraint(format!(
                "cannot reduce allocation {} by {} (only {} allocated)",
                allocation_id, amount_cents, current
            )));
        }

        if amount_cents == current {
            self.conn.execute(
                "DELETE FROM payment_allocations WHERE allocation_id = ?",
                [allocation_id],
            )?;
        } else {
            self.conn.execute(
                "UPDATE payment_allocations SET amount_cents = amount_cents - ?2 WHERE allocation_id = ?1",
                params![allocation_id, amount_cents],
            )?;
        }
        Ok(())
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    /// Insert a refund.
    pub fn insert_refund(&self, refund: &Refund) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO refunds (
                refund_id, payment_id, shift_id, method, amount_cents, reason,
                refunded_by, refunded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                refund.refund_id,
                refund.payment_id,
                refund.shift_id,
                refund.method.as_str(),
                refund.amount_cents,
                refund.reason,
                refund.refunded_by,
                refund.refunded_at,
            ],
        )?;
        Ok(())
    }

    /// Refunds issued against a payment.
    pub fn list_refunds_for_payment(&self, payment_id: &str) -> DbResult<Vec<Refund>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT refund_id, payment_id, shift_id, method, amount_cents, reason,
                   refunded_by, refunded_at
            FROM refunds
            WHERE payment_id = ?
            ORDER BY refunded_at, rowid
            "#,
        )?;
        let rows = stmt.query_map([payment_id], refund_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Refunds paid out on a shift.
    pub fn list_refunds_for_shift(&self, shift_id: &str) -> DbResult<Vec<Refund>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT refund_id, payment_id, shift_id, method, amount_cents, reason,
                   refunded_by, refunded_at
            FROM refunds
            WHERE shift_id = ?
            ORDER BY refunded_at, rowid
            "#,
        )?;
        let rows = stmt.query_map([shift_id], refund_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Refunds against any payment of the patient.
    pub fn list_refunds_for_patient(&self, patient_id: &str) -> DbResult<Vec<Refund>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT r.refund_id, r.payment_id, r.shift_id, r.method, r.amount_cents,
                   r.reason, r.refunded_by, r.refunded_at
            FROM refunds r
            JOIN payments p ON p.payment_id = r.payment_id
            WHERE p.patient_id = ?
            ORDER BY r.refunded_at, r.rowid
            "#,
        )?;
        let rows = stmt.query_map([patient_id], refund_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
