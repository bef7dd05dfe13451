//! End-of-shift Z report.

use serde::{Deserialize, Serialize};

use super::escape_csv;
use crate::config::LedgerConfig;
use crate::db::Database;
use crate::ledger::{expected_cash, summarize_by_method, LedgerError, LedgerResult, MethodTotal};
use crate::models::{now_timestamp, CashMovement, PaymentMethod, ShiftStatus, VarianceStatus};

/// Z report for a single shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftReport {
    pub metadata: ShiftReportMetadata,
    pub reconciliation: ReconciliationFigures,
    pub method_totals: Vec<MethodTotal>,
    pub payments: Vec<ShiftPaymentLine>,
    pub refunds: Vec<ShiftRefundLine>,
    pub movements: Vec<CashMovement>,
}

/// Z report metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftReportMetadata {
    pub clinic_name: String,
    pub currency: String,
    pub shift_id: String,
    /// Shift owner
    pub user_id: String,
    pub username: String,
    pub status: ShiftStatus,
    pub opened_at: String,
    pub closed_at: Option<String>,
    pub closed_by: Option<String>,
    pub notes: Option<String>,
    pub exported_at: String,
    pub system_id: String,
}

/// Drawer figures. Closing fields are absent while the shift is open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciliationFigures {
    pub opening_balance_cents: i64,
    pub cash_collected_cents: i64,
    pub cash_refunded_cents: i64,
    pub paid_in_cents: i64,
    pub paid_out_cents: i64,
    pub dropped_cents: i64,
    pub non_cash_collected_cents: i64,
    pub non_cash_refunded_cents: i64,
    pub expected_cash_cents: i64,
    pub counted_cash_cents: Option<i64>,
    pub variance_cents: Option<i64>,
    pub variance_status: Option<VarianceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftPaymentLine {
    pub payment_id: String,
    pub patient_mrn: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub reference: Option<String>,
    pub received_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftRefundLine {
    pub refund_id: String,
    pub payment_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub reason: String,
    pub refunded_at: String,
}

impl ShiftReport {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV: one row per transaction, then the summary rows.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        let shift_id = escape_csv(&self.metadata.shift_id);

        csv.push_str("shift_id,record_type,record_id,method_or_kind,amount_cents,timestamp,detail\n");

        for p in &self.payments {
            csv.push_str(&format!(
                "{},payment,{},{},{},{},{}\n",
                shift_id,
                escape_csv(&p.payment_id),
                p.method.as_str(),
                p.amount_cents,
                escape_csv(&p.received_at),
                escape_csv(&p.patient_mrn),
            ));
        }
        for r in &self.refunds {
            csv.push_str(&format!(
                "{},refund,{},{},{},{},{}\n",
                shift_id,
                escape_csv(&r.refund_id),
                r.method.as_str(),
                -r.amount_cents,
                escape_csv(&r.refunded_at),
                escape_csv(&r.reason),
            ));
        }
        for m in &self.movements {
            csv.push_str(&format!(
                "{},movement,{},{},{},{},{}\n",
                shift_id,
                escape_csv(&m.movement_id),
                m.kind.as_str(),
                m.amount_cents,
                escape_csv(&m.recorded_at),
                escape_csv(&m.reason),
            ));
        }

        let rec = &self.reconciliation;
        let mut summary: Vec<(&str, String)> = vec![
            ("opening_balance", rec.opening_balance_cents.to_string()),
            ("expected_cash", rec.expected_cash_cents.to_string()),
        ];
        if let Some(counted) = rec.counted_cash_cents {
            summary.push(("counted_cash", counted.to_string()));
        }
        if let Some(variance) = rec.variance_cents {
            summary.push(("variance", variance.to_string()));
        }
        for (label, amount) in summary {
            csv.push_str(&format!(
                "{},summary,{},,{},{},\n",
                shift_id,
                label,
                amount,
                escape_csv(&self.metadata.exported_at),
            ));
        }

        csv
    }
}

/// Builds Z reports.
pub struct ShiftReportExporter<'a> {
    db: &'a Database,
    config: &'a LedgerConfig,
}

impl<'a> ShiftReportExporter<'a> {
    pub fn new(db: &'a Database, config: &'a LedgerConfig) -> Self {
        Self { db, config }
    }

    /// Report for one shift. Open shifts report running figures.
    pub fn export(&self, shift_id: &str) -> LedgerResult<ShiftReport> {
        let shift = self
            .db
            .get_shift(shift_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("shift {}", shift_id)))?;
        let username = self
            .db
            .get_user(&shift.user_id)?
            .map(|u| u.username)
            .unwrap_or_default();

        let payments = self.db.list_payments_for_shift(shift_id)?;
        let refunds = self.db.list_refunds_for_shift(shift_id)?;
        let movements = self.db.list_cash_movements(shift_id)?;
        let method_totals = summarize_by_method(&payments, &refunds);

        let mut payment_lines = Vec::with_capacity(payments.len());
        for p in &payments {
            let patient_mrn = self
                .db
                .get_patient(&p.patient_id)?
                .map(|patient| patient.mrn)
                .unwrap_or_default();
            payment_lines.push(ShiftPaymentLine {
                payment_id: p.payment_id.clone(),
                patient_mrn,
                method: p.method,
                amount_cents: p.amount_cents,
                reference: p.reference.clone(),
                received_at: p.received_at.clone(),
            });
        }

        let refund_lines = refunds
            .into_iter()
            .map(|r| ShiftRefundLine {
                refund_id: r.refund_id,
                payment_id: r.payment_id,
                method: r.method,
                amount_cents: r.amount_cents,
                reason: r.reason,
                refunded_at: r.refunded_at,
            })
            .collect();

        let reconciliation = ReconciliationFigures {
            opening_balance_cents: shift.opening_balance_cents,
            cash_collected_cents: shift.cash_collected_cents,
            cash_refunded_cents: shift.cash_refunded_cents,
            paid_in_cents: shift.paid_in_cents,
            paid_out_cents: shift.paid_out_cents,
            dropped_cents: shift.dropped_cents,
            non_cash_collected_cents: shift.non_cash_collected_cents,
            non_cash_refunded_cents: shift.non_cash_refunded_cents,
            expected_cash_cents: match shift.expected_cash_cents {
                Some(recorded) => recorded,
                None => expected_cash(&shift)?,
            },
            counted_cash_cents: shift.closing_balance_cents,
            variance_cents: shift.variance_cents,
            variance_status: shift.variance_status,
        };

        Ok(ShiftReport {
            metadata: ShiftReportMetadata {
                clinic_name: self.config.clinic_name.clone(),
                currency: self.config.currency.clone(),
                shift_id: shift.shift_id,
                user_id: shift.user_id,
                username,
                status: shift.status,
                opened_at: shift.opened_at,
                closed_at: shift.closed_at,
                closed_by: shift.closed_by,
                notes: shift.notes,
                exported_at: now_timestamp(),
                system_id: self.config.system_id.clone(),
            },
            reconciliation,
            method_totals,
            payments: payment_lines,
            refunds: refund_lines,
            movements,
        })
    }
}
