//! Shift and cash movement database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{column_enum, Database, DbError, DbResult};
use crate::models::{CashMovement, MovementKind, Shift, ShiftStatus, VarianceStatus};

/// Increments applied to a shift's running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShiftDelta {
    pub cash_collected: i64,
    pub non_cash_collected: i64,
    pub cash_refunded: i64,
    pub non_cash_refunded: i64,
    pub paid_in: i64,
    pub paid_out: i64,
    pub dropped: i64,
}

impl ShiftDelta {
    /// A collected payment.
    pub fn collected(is_cash: bool, amount_cents: i64) -> Self {
        if is_cash {
            Self { cash_collected: amount_cents, ..Self::default() }
        } else {
            Self { non_cash_collected: amount_cents, ..Self::default() }
        }
    }

    /// A refund paid out.
    pub fn refunded(is_cash: bool, amount_cents: i64) -> Self {
        if is_cash {
            Self { cash_refunded: amount_cents, ..Self::default() }
        } else {
            Self { non_cash_refunded: amount_cents, ..Self::default() }
        }
    }

    /// A drawer movement.
    pub fn movement(kind: MovementKind, amount_cents: i64) -> Self {
        match kind {
            MovementKind::PayIn => Self { paid_in: amount_cents, ..Self::default() },
            MovementKind::PayOut => Self { paid_out: amount_cents, ..Self::default() },
            MovementKind::Drop => Self { dropped: amount_cents, ..Self::default() },
        }
    }
}

const SHIFT_COLUMNS: &str = r#"
    shift_id, user_id, status, opening_balance_cents, cash_collected_cents,
    non_cash_collected_cents, cash_refunded_cents, non_cash_refunded_cents,
    paid_in_cents, paid_out_cents, dropped_cents, closing_balance_cents,
    expected_cash_cents, variance_cents, variance_status, closed_by, notes,
    opened_at, closed_at
"#;

fn shift_from_row(row: &Row<'_>) -> rusqlite::Result<Shift> {
    let variance_status: Option<String> = row.get(14)?;
    Ok(Shift {
        shift_id: row.get(0)?,
        user_id: row.get(1)?,
        status: column_enum(2, row.get(2)?, string_to_shift_status)?,
        opening_balance_cents: row.get(3)?,
        cash_collected_cents: row.get(4)?,
        non_cash_collected_cents: row.get(5)?,
        cash_refunded_cents: row.get(6)?,
        non_cash_refunded_cents: row.get(7)?,
        paid_in_cents: row.get(8)?,
        paid_out_cents: row.get(9)?,
        dropped_cents: row.get(10)?,
        closing_balance_cents: row.get(11)?,
        expected_cash_cents: row.get(12)?,
        variance_cents: row.get(13)?,
        variance_status: variance_status
            .map(|s| column_enum(14, s, VarianceStatus::parse))
            .transpose()?,
        closed_by: row.get(15)?,
        notes: row.get(16)?,
        opened_at: row.get(17)?,
        closed_at: row.get(18)?,
    })
}

impl Database {
    /// Insert a newly opened shift.
    pub fn insert_shift(&self, shift: &Shift) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO shifts (
                shift_id, user_id, status, opening_balance_cents, notes, opened_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                shift.shift_id,
                shift.user_id,
                shift_status_to_string(shift.status),
                shift.opening_balance_cents,
                shift.notes,
                shift.opened_at,
            ],
        )?;
        Ok(())
    }

    /// Get a shift by ID.
    pub fn get_shift(&self, shift_id: &str) -> DbResult<Option<Shift>> {
        let sql = format!("SELECT {} FROM shifts WHERE shift_id = ?", SHIFT_COLUMNS);
        self.conn
            .query_row(&sql, [shift_id], shift_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// The user's open shift, if any.
    pub fn get_open_shift(&self, user_id: &str) -> DbResult<Option<Shift>> {
        let sql = format!(
            "SELECT {} FROM shifts WHERE user_id = ? AND status = 'open'",
            SHIFT_COLUMNS
        );
        self.conn
            .query_row(&sql, [user_id], shift_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// All shifts of a user, oldest first.
    pub fn list_shifts_for_user(&self, user_id: &str) -> DbResult<Vec<Shift>> {
        let sql = format!(
            "SELECT {} FROM shifts WHERE user_id = ? ORDER BY opened_at, rowid",
            SHIFT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], shift_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every currently open shift.
    pub fn list_open_shifts(&self) -> DbResult<Vec<Shift>> {
        let sql = format!(
            "SELECT {} FROM shifts WHERE status = 'open' ORDER BY opened_at",
            SHIFT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], shift_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Add a delta to an open shift's running totals.
    pub fn apply_shift_delta(&self, shift_id: &str, delta: &ShiftDelta) -> DbResult<()> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE shifts SET
                cash_collected_cents = cash_collected_cents + ?2,
                non_cash_collected_cents = non_cash_collected_cents + ?3,
                cash_refunded_cents = cash_refunded_cents + ?4,
                non_cash_refunded_cents = non_cash_refunded_cents + ?5,
                paid_in_cents = paid_in_cents + ?6,
                paid_out_cents = paid_out_cents + ?7,
                dropped_cents = dropped_cents + ?8
            WHERE shift_id = ?1 AND status = 'open'
            "#,
            params![
                shift_id,
                delta.cash_collected,
                delta.non_cash_collected,
                delta.cash_refunded,
                delta.non_cash_refunded,
                delta.paid_in,
                delta.paid_out,
                delta.dropped,
            ],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("open shift {}", shift_id)));
        }
        Ok(())
    }

    /// Persist the closing count and reconciliation figures.
    pub fn close_shift_record(&self, shift: &Shift) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE shifts SET
                status = 'closed',
                closing_balance_cents = ?2,
                expected_cash_cents = ?3,
                variance_cents = ?4,
                variance_status = ?5,
                closed_by = ?6,
                notes = ?7,
                closed_at = ?8
            WHERE shift_id = ?1 AND status = 'open'
            "#,
            params![
                shift.shift_id,
                shift.closing_balance_cents,
                shift.expected_cash_cents,
                shift.variance_cents,
                shift.variance_status.map(VarianceStatus::as_str),
                shift.closed_by,
                shift.notes,
                shift.closed_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    // =========================================================================
    // Cash movements
    // =========================================================================

    /// Insert a cash movement.
    pub fn insert_cash_movement(&self, movement: &CashMovement) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO cash_movements (
                movement_id, shift_id, kind, amount_cents, reason, recorded_by, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                movement.movement_id,
                movement.shift_id,
                movement.kind.as_str(),
                movement.amount_cents,
                movement.reason,
                movement.recorded_by,
                movement.recorded_at,
            ],
        )?;
        Ok(())
    }

    /// Movements on a shift, oldest first.
    pub fn list_cash_movements(&self, shift_id: &str) -> DbResult<Vec<CashMovement>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT movement_id, shift_id, kind, amount_cents, reason, recorded_by, recorded_at
            FROM cash_movements
            WHERE shift_id = ?
            ORDER BY recorded_at, rowid
            "#,
        )?;
        let rows = stmt.query_map([shift_id], |row| {
            Ok(CashMovement {
                movement_id: row.get(0)?,
                shift_id: row.get(1)?,
                kind: column_enum(2, row.get(2)?, MovementKind::parse)?,
                amount_cents: row.get(3)?,
                reason: row.get(4)?,
                recorded_by: row.get(5)?,
                recorded_at: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn shift_status_to_string(status: ShiftStatus) -> &'static str {
    match status {
        ShiftStatus::Open => "open",
        ShiftStatus::Closed => "closed",
    }
}

fn string_to_shift_status(s: &str) -> Option<ShiftStatus> {
    match s {
        "open" => Some(ShiftStatus::Open),
        "closed" => Some(ShiftStatus::Closed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, User};

    fn setup_db() -> (Database, User) {
        let db = Database::open_in_memory().unwrap();
        let user = User::new("cash1".into(), "Cashier".into(), Role::Cashier);
        db.insert_user(&user).unwrap();
        (db, user)
    }

    #[test]
    fn test_open_and_get() {
        let (db, user) = setup_db();
        let shift = Shift::open(user.user_id.clone(), 10_000);
        db.insert_shift(&shift).unwrap();

        let open = db.get_open_shift(&user.user_id).unwrap().unwrap();
        assert_eq!(open, shift);
        assert_eq!(db.list_open_shifts().unwrap().len(), 1);
    }

    #[test]
    fn test_apply_delta() {
        let (db, user) = setup_db();
        let shift = Shift::open(user.user_id.clone(), 10_000);
        db.insert_shift(&shift).unwrap();

        db.apply_shift_delta(&shift.shift_id, &ShiftDelta::collected(true, 2_500))
            .unwrap();
        db.apply_shift_delta(&shift.shift_id, &ShiftDelta::collected(false, 4_000))
            .unwrap();
        db.apply_shift_delta(&shift.shift_id, &ShiftDelta::refunded(true, 500))
            .unwrap();
        db.apply_shift_delta(
            &shift.shift_id,
            &ShiftDelta::movement(MovementKind::Drop, 1_000),
        )
        .unwrap();

        let got = db.get_shift(&shift.shift_id).unwrap().unwrap();
        assert_eq!(got.cash_collected_cents, 2_500);
        assert_eq!(got.non_cash_collected_cents, 4_000);
        assert_eq!(got.cash_refunded_cents, 500);
        assert_eq!(got.dropped_cents, 1_000);
    }

    #[test]
    fn test_closed_shift_rejects_delta_and_second_close() {
        let (db, user) = setup_db();
        let mut shift = Shift::open(user.user_id.clone(), 0);
        db.insert_shift(&shift).unwrap();

        shift.status = ShiftStatus::Closed;
        shift.closing_balance_cents = Some(0);
        shift.expected_cash_cents = Some(0);
        shift.variance_cents = Some(0);
        shift.variance_status = Some(VarianceStatus::Balanced);
        shift.closed_by = Some(user.user_id.clone());
        shift.closed_at = Some(crate::models::now_timestamp());
        assert!(db.close_shift_record(&shift).unwrap());
        assert!(!db.close_shift_record(&shift).unwrap());

        let got = db.get_shift(&shift.shift_id).unwrap().unwrap();
        assert_eq!(got, shift);
        assert!(db.get_open_shift(&user.user_id).unwrap().is_none());

        let result = db.apply_shift_delta(&shift.shift_id, &ShiftDelta::collected(true, 1));
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_cash_movements() {
        let (db, user) = setup_db();
        let shift = Shift::open(user.user_id.clone(), 0);
        db.insert_shift(&shift).unwrap();

        let movement = CashMovement::new(
            shift.shift_id.clone(),
            MovementKind::PayOut,
            700,
            "Courier fee".into(),
            user.user_id.clone(),
        );
        db.insert_cash_movement(&movement).unwrap();
        assert_eq!(db.list_cash_movements(&shift.shift_id).unwrap(), vec![movement]);
    }
}
