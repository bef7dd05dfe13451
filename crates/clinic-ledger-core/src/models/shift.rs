//! Cash-handling shifts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShiftStatus {
    Open,
    Closed,
}

/// Outcome of comparing counted cash with the system figure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VarianceStatus {
    /// Within tolerance
    Balanced,
    /// More cash counted than expected
    Over,
    /// Less cash counted than expected
    Short,
}

impl VarianceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VarianceStatus::Balanced => "balanced",
            VarianceStatus::Over => "over",
            VarianceStatus::Short => "short",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "balanced" => Some(VarianceStatus::Balanced),
            "over" => Some(VarianceStatus::Over),
            "short" => Some(VarianceStatus::Short),
            _ => None,
        }
    }
}

/// A staff member's cash session, from opening float to closing count.
///
/// The running totals are maintained as payments, refunds and movements are
/// recorded, so the system cash figure is always available without
/// rescanning the shift's transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shift {
    pub shift_id: String,
    pub user_id: String,
    pub status: ShiftStatus,
    /// Float in the drawer at opening
    pub opening_balance_cents: i64,
    pub cash_collected_cents: i64,
    pub non_cash_collected_cents: i64,
    pub cash_refunded_cents: i64,
    pub non_cash_refunded_cents: i64,
    pub paid_in_cents: i64,
    pub paid_out_cents: i64,
    /// Cash removed to the safe mid-shift
    pub dropped_cents: i64,
    /// Counted cash at close
    pub closing_balance_cents: Option<i64>,
    pub expected_cash_cents: Option<i64>,
    pub variance_cents: Option<i64>,
    pub variance_status: Option<VarianceStatus>,
    pub closed_by: Option<String>,
    pub notes: Option<String>,
    pub opened_at: String,
    pub closed_at: Option<String>,
}

impl Shift {
    /// Open a new shift with the given float.
    pub fn open(user_id: String, opening_balance_cents: i64) -> Self {
        Self {
            shift_id: super::new_id(),
            user_id,
            status: ShiftStatus::Open,
            opening_balance_cents,
            cash_collected_cents: 0,
            non_cash_collected_cents: 0,
            cash_refunded_cents: 0,
            non_cash_refunded_cents: 0,
            paid_in_cents: 0,
            paid_out_cents: 0,
            dropped_cents: 0,
            closing_balance_cents: None,
            expected_cash_cents: None,
            variance_cents: None,
            variance_status: None,
            closed_by: None,
            notes: None,
            opened_at: super::now_timestamp(),
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ShiftStatus::Open
    }

    /// Net takings across all methods.
    pub fn net_collected_cents(&self) -> i64 {
        self.cash_collected_cents + self.non_cash_collected_cents
            - self.cash_refunded_cents
            - self.non_cash_refunded_cents
    }
}

/// Non-sale cash movement in or out of the drawer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MovementKind {
    /// Cash added (e.g. change top-up)
    PayIn,
    /// Cash paid out for an expense
    PayOut,
    /// Cash removed to the safe
    Drop,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::PayIn => "pay_in",
            MovementKind::PayOut => "pay_out",
            MovementKind::Drop => "drop",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pay_in" => Some(MovementKind::PayIn),
            "pay_out" => Some(MovementKind::PayOut),
            "drop" => Some(MovementKind::Drop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CashMovement {
    pub movement_id: String,
    pub shift_id: String,
    pub kind: MovementKind,
    pub amount_cents: i64,
    pub reason: String,
    pub recorded_by: String,
    pub recorded_at: String,
}

impl CashMovement {
    pub fn new(
        shift_id: String,
        kind: MovementKind,
        amount_cents: i64,
        reason: String,
        recorded_by: String,
    ) -> Self {
        Self {
            movement_id: super::new_id(),
            shift_id,
            kind,
            amount_cents,
            reason,
            recorded_by,
            recorded_at: super::now_timestamp(),
        }
    }
}
