//! Shift cash reconciliation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{LedgerError, LedgerResult};
use crate::models::{parse_timestamp, Payment, PaymentMethod, Refund, Shift, VarianceStatus};

/// System cash figure: opening float plus cash in, minus cash out.
///
/// Only cash touches the drawer; card and other takings are excluded.
/// Fails rather than wrapping when the running totals overflow.
pub fn expected_cash(shift: &Shift) -> LedgerResult<i64> {
    Some(shift.opening_balance_cents)
        .and_then(|v| v.checked_add(shift.cash_collected_cents))
        .and_then(|v| v.checked_sub(shift.cash_refunded_cents))
        .and_then(|v| v.checked_add(shift.paid_in_cents))
        .and_then(|v| v.checked_sub(shift.paid_out_cents))
        .and_then(|v| v.checked_sub(shift.dropped_cents))
        .ok_or_else(|| {
            LedgerError::Validation(format!("cash totals of shift {} overflow", shift.shift_id))
        })
}

/// Counted minus expected. Positive means the drawer is over.
pub fn compute_variance(counted_cents: i64, expected_cents: i64) -> LedgerResult<i64> {
    counted_cents.checked_sub(expected_cents).ok_or_else(|| {
        LedgerError::Validation(format!(
            "variance between counted {} and expected {} is out of range",
            counted_cents, expected_cents
        ))
    })
}

pub fn classify_variance(variance_cents: i64, tolerance_cents: i64) -> VarianceStatus {
    if variance_cents.unsigned_abs() <= tolerance_cents.max(0).unsigned_abs() {
        VarianceStatus::Balanced
    } else if variance_cents > 0 {
        VarianceStatus::Over
    } else {
        VarianceStatus::Short
    }
}

/// Reconciliation figures for a closing count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub expected_cash_cents: i64,
    pub counted_cash_cents: i64,
    pub variance_cents: i64,
    pub status: VarianceStatus,
}

pub fn reconcile(
    shift: &Shift,
    counted_cents: i64,
    tolerance_cents: i64,
) -> LedgerResult<Reconciliation> {
    let expected = expected_cash(shift)?;
    let variance = compute_variance(counted_cents, expected)?;
    Ok(Reconciliation {
        expected_cash_cents: expected,
        counted_cash_cents: counted_cents,
        variance_cents: variance,
        status: classify_variance(variance, tolerance_cents),
    })
}

/// The user's shift that was running at `at`.
///
/// An open shift covers everything from its opening on. When no window
/// covers `at`, the most recent shift opened before it is used; shifts
/// opened after `at` never match.
pub fn find_covering_shift<'s>(
    shifts: &'s [Shift],
    user_id: &str,
    at: &str,
) -> LedgerResult<Option<&'s Shift>> {
    let at = parse_timestamp(at)?;
    let mut nearest: Option<(chrono::DateTime<chrono::Utc>, &Shift)> = None;

    for shift in shifts.iter().filter(|s| s.user_id == user_id) {
        let opened = parse_timestamp(&shift.opened_at)?;
        if opened > at {
            continue;
        }
        let covers = match &shift.closed_at {
            Some(closed) => at <= parse_timestamp(closed)?,
            None => true,
        };
        if covers {
            return Ok(Some(shift));
        }
        if nearest.map_or(true, |(best, _)| opened > best) {
            nearest = Some((opened, shift));
        }
    }

    Ok(nearest.map(|(_, shift)| shift))
}

/// Takings for one payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodTotal {
    pub method: PaymentMethod,
    pub payment_count: u32,
    pub collected_cents: i64,
    pub refund_count: u32,
    pub refunded_cents: i64,
}

impl MethodTotal {
    pub fn net_cents(&self) -> i64 {
        self.collected_cents - self.refunded_cents
    }
}

/// Per-method totals, in [`PaymentMethod`] order. Methods with no activity
/// are left out.
pub fn summarize_by_method(payments: &[Payment], refunds: &[Refund]) -> Vec<MethodTotal> {
    let mut totals: BTreeMap<PaymentMethod, MethodTotal> = BTreeMap::new();
    let empty = |method| MethodTotal {
        method,
        payment_count: 0,
        collected_cents: 0,
        refund_count: 0,
        refunded_cents: 0,
    };

    for payment in payments {
        let total = totals
            .entry(payment.method)
            .or_insert_with(|| empty(payment.method));
        total.payment_count += 1;
        total.collected_cents += payment.amount_cents;
    }
    for refund in refunds {
        let total = totals
            .entry(refund.method)
            .or_insert_with(|| empty(refund.method));
        total.refund_count += 1;
        total.refunded_cents += refund.amount_cents;
    }

    totals.into_values().collect()
}
