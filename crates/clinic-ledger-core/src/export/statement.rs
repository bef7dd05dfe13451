//! Patient account statements.

use serde::{Deserialize, Serialize};

use super::escape_csv;
use crate::config::LedgerConfig;
use crate::db::Database;
use crate::ledger::{ClinicLedger, LedgerError, LedgerResult, PatientBalance};
use crate::models::{now_timestamp, ChargeKind, ChargeStatus, PaymentMethod};

/// Statement of a patient's account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientStatement {
    pub metadata: StatementMetadata,
    pub charges: Vec<StatementCharge>,
    pub payments: Vec<StatementPayment>,
    pub refunds: Vec<StatementRefund>,
    pub balance: PatientBalance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementMetadata {
    pub clinic_name: String,
    pub currency: String,
    pub patient_id: String,
    pub mrn: String,
    pub patient_name: String,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementCharge {
    pub charge_id: String,
    pub charged_at: String,
    pub kind: ChargeKind,
    pub description: String,
    pub amount_cents: i64,
    pub paid_cents: i64,
    pub outstanding_cents: i64,
    pub status: ChargeStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementPayment {
    pub payment_id: String,
    pub received_at: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub allocated_cents: i64,
    pub refunded_cents: i64,
    pub unallocated_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementRefund {
    pub refund_id: String,
    pub payment_id: String,
    pub refunded_at: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub reason: String,
}

impl PatientStatement {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV, one row per charge, payment and refund followed by
    /// a balance row.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        let mrn = escape_csv(&self.metadata.mrn);

        csv.push_str("mrn,date,line_type,id,description,amount_cents,paid_cents,outstanding_cents,status\n");

        for c in &self.charges {
            csv.push_str(&format!(
                "{},{},charge,{},{},{},{},{},{}\n",
                mrn,
                escape_csv(&c.charged_at),
                escape_csv(&c.charge_id),
                escape_csv(&c.description),
                c.amount_cents,
                c.paid_cents,
                c.outstanding_cents,
                c.status.as_str(),
            ));
        }
        for p in &self.payments {
            csv.push_str(&format!(
                "{},{},payment,{},{},{},{},,\n",
                mrn,
                escape_csv(&p.received_at),
                escape_csv(&p.payment_id),
                p.method.as_str(),
                -p.amount_cents,
                p.allocated_cents,
            ));
        }
        for r in &self.refunds {
            csv.push_str(&format!(
                "{},{},refund,{},{},{},,,\n",
                mrn,
                escape_csv(&r.refunded_at),
                escape_csv(&r.refund_id),
                escape_csv(&r.reason),
                r.amount_cents,
            ));
        }

        let b = &self.balance;
        csv.push_str(&format!(
            "{},{},balance,,net due,{},{},{},\n",
            mrn,
            escape_csv(&self.metadata.generated_at),
            b.total_charged_cents,
            b.total_paid_cents,
            b.net_due_cents(),
        ));

        csv
    }
}

/// Builds patient statements.
pub struct StatementExporter<'a> {
    db: &'a Database,
    config: &'a LedgerConfig,
}

impl<'a> StatementExporter<'a> {
    pub fn new(db: &'a Database, config: &'a LedgerConfig) -> Self {
        Self { db, config }
    }

    pub fn export(&self, patient_id: &str) -> LedgerResult<PatientStatement> {
        let patient = self
            .db
            .get_patient(patient_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("patient {}", patient_id)))?;
        let balance = ClinicLedger::new(self.db, self.config).patient_balance(patient_id)?;

        let charges = self
            .db
            .list_charges_for_patient(patient_id)?
            .into_iter()
            .map(|c| StatementCharge {
                outstanding_cents: c.outstanding_cents(),
                charge_id: c.charge_id,
                charged_at: c.charged_at,
                kind: c.source.kind,
                description: c.description,
                amount_cents: c.amount_cents,
                paid_cents: c.allocated_cents,
                status: c.status,
            })
            .collect();

        let payments = self
            .db
            .list_payments_for_patient(patient_id)?
            .into_iter()
            .map(|p| StatementPayment {
                unallocated_cents: p.unallocated_cents(),
                payment_id: p.payment_id,
                received_at: p.received_at,
                method: p.method,
                amount_cents: p.amount_cents,
                allocated_cents: p.allocated_cents,
                refunded_cents: p.refunded_cents,
            })
            .collect();

        let refunds = self
            .db
            .list_refunds_for_patient(patient_id)?
            .into_iter()
            .map(|r| StatementRefund {
                refund_id: r.refund_id,
                payment_id: r.payment_id,
                refunded_at: r.refunded_at,
                method: r.method,
                amount_cents: r.amount_cents,
                reason: r.reason,
            })
            .collect();

        Ok(PatientStatement {
            metadata: StatementMetadata {
                clinic_name: self.config.clinic_name.clone(),
                currency: self.config.currency.clone(),
                patient_id: patient.patient_id.clone(),
                patient_name: patient.full_name(),
                mrn: patient.mrn,
                generated_at: now_timestamp(),
            },
            charges,
            payments,
            refunds,
            balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ChargeRequest, NewPatient, PaymentRequest};
    use crate::models::Role;

    #[test]
    fn test_statement_lines_and_balance() {
        let db = Database::open_in_memory().unwrap();
        let config = LedgerConfig::default();
        let ledger = ClinicLedger::new(&db, &config);

        let admin = ledger.bootstrap_admin("admin", "Admin").unwrap();
        let cashier = ledger
            .create_user(&admin.user_id, "cashier", "Front Desk", Role::Cashier)
            .unwrap();
        let patient = ledger
            .register_patient(
                &cashier.user_id,
                NewPatient {
                    first_name: "Brian".into(),
                    last_name: "Kamau".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .patient;

        for (description, amount) in [("Consultation, follow-up", 3_000), ("Dressing", 1_500)] {
            ledger
                .post_charge(
                    &cashier.user_id,
                    ChargeRequest {
                        patient_id: patient.patient_id.clone(),
                        kind: ChargeKind::Consultation,
                        description: description.into(),
                        amount_cents: amount,
                        reference_id: None,
                    },
                )
                .unwrap();
        }
        let receipt = ledger
            .record_payment(
                &cashier.user_id,
                PaymentRequest {
                    patient_id: patient.patient_id.clone(),
                    method: PaymentMethod::MobileMoney,
                    amount_cents: 4_000,
                    reference: Some("MP-1234".into()),
                    target_charge_ids: vec![],
                },
            )
            .unwrap();
        ledger
            .refund_payment(&admin.user_id, &receipt.payment.payment_id, 500, "overcharged")
            .unwrap();

        let statement = StatementExporter::new(&db, &config)
            .export(&patient.patient_id)
            .unwrap();

        assert_eq!(statement.metadata.mrn, patient.mrn);
        assert_eq!(statement.charges.len(), 2);
        assert_eq!(statement.payments.len(), 1);
        assert_eq!(statement.refunds.len(), 1);
        assert_eq!(statement.payments[0].refunded_cents, 500);
        // Refund unwinds the newest allocation (the dressing)
        assert_eq!(statement.charges[1].outstanding_cents, 1_000);
        assert_eq!(statement.balance.outstanding_cents, 1_000);
        assert_eq!(statement.balance.total_paid_cents, 3_500);

        let csv = statement.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        // Header + 2 charges + 1 payment + 1 refund + balance
        assert_eq!(lines.len(), 6);
        assert!(csv.contains("\"Consultation, follow-up\""));
        assert!(lines[5].contains(",balance,"));
    }
}
