//! Clinic Ledger Core Library
//!
//! Local-first administration core for a clinic front desk: patients,
//! admissions, pathology, fertility cases, and the shift-based cash
//! accounting that ties them together.
//!
//! # Architecture
//!
//! ```text
//!   Admissions    Pathology    Fertility    Manual charges
//!        │            │            │              │
//!        └────────────┴─────┬──────┴──────────────┘
//!                           ▼
//!                   Service Charges ◄──── Payment Allocations ◄──── Payments
//!                                                                      │
//!                                                          Shift running totals
//!                                                                      │
//!                                                      Close: counted vs expected
//!
//!   Every change ──► Activity entry ──► Merkle leaf ──► new audit root
//! ```
//!
//! # Core Principle
//!
//! **A change and its activity entry commit together or not at all.** Every
//! mutating operation runs in one SQLite transaction that includes the
//! audit trail update.
//!
//! # Modules
//!
//! - [`config`]: Ledger settings (currency, MRN prefix, tolerances)
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (Patient, ServiceCharge, Payment, Shift, etc.)
//! - [`ledger`]: Operations, allocation planning and reconciliation
//! - [`audit`]: Merkle tree over the activity log
//! - [`export`]: Z reports, patient statements and audit exports

pub mod audit;
pub mod config;
pub mod db;
pub mod export;
pub mod ledger;
pub mod models;

// Re-export commonly used types
pub use audit::{AuditTrail, EntryVerification, LeafCommit, TreeSnapshot, TreeStats};
pub use config::{AllocationStrategy, LedgerConfig};
pub use db::Database;
pub use ledger::{ClinicLedger, LedgerError, LedgerResult};
pub use models::{
    ActivityEntry, Admission, CashMovement, FertilityCase, PathologyOrder, Patient, Payment,
    PaymentMethod, Refund, Role, ServiceCharge, Shift, User,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use ledger::{
    AdmissionRequest, ChargeRequest, FertilityCaseRequest, NewPatient, PathologyRequest,
    PaymentRequest,
};
use models::{ChargeKind, MovementKind};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<db::DbError> for ClinicError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => ClinicError::NotFound(what),
            other => ClinicError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::SerializationError(e.to_string())
    }
}

impl From<audit::AuditError> for ClinicError {
    fn from(e: audit::AuditError) -> Self {
        match e {
            audit::AuditError::Database(inner) => inner.into(),
            audit::AuditError::Json(inner) => inner.into(),
            audit::AuditError::NodeNotFound(what) => ClinicError::NotFound(what),
            other => ClinicError::DatabaseError(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for ClinicError {
    fn from(e: config::ConfigError) -> Self {
        ClinicError::ConfigError(e.to_string())
    }
}

impl From<LedgerError> for ClinicError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Database(inner) => inner.into(),
            LedgerError::Audit(inner) => inner.into(),
            LedgerError::Timestamp(inner) => ClinicError::InvalidInput(inner.to_string()),
            LedgerError::Validation(msg) => ClinicError::InvalidInput(msg),
            LedgerError::PermissionDenied(msg) => ClinicError::PermissionDenied(msg),
            LedgerError::InvalidState(msg) => ClinicError::InvalidState(msg),
            LedgerError::NotFound(msg) => ClinicError::NotFound(msg),
            LedgerError::OverAllocation(msg) => ClinicError::InvalidState(msg),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

fn parse_arg<T>(value: &str, what: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T, ClinicError> {
    parse(value).ok_or_else(|| ClinicError::InvalidInput(format!("unknown {}: {}", what, value)))
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path, with an optional JSON config.
#[uniffi::export]
pub fn open_database(path: String, config_json: Option<String>) -> Result<Arc<ClinicCore>, ClinicError> {
    let config = match config_json {
        Some(json) => LedgerConfig::from_json_str(&json)?,
        None => LedgerConfig::default(),
    };
    let db = Database::open(&path)?;
    Ok(Arc::new(ClinicCore {
        db: Arc::new(Mutex::new(db)),
        config,
    }))
}

/// Create an in-memory database with default settings (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ClinicCore>, ClinicError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(ClinicCore {
        db: Arc::new(Mutex::new(db)),
        config: LedgerConfig::default(),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe ledger handle for FFI.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    db: Arc<Mutex<Database>>,
    config: LedgerConfig,
}

#[uniffi::export]
impl ClinicCore {
    /// Active configuration as JSON.
    pub fn config_json(&self) -> Result<String, ClinicError> {
        Ok(serde_json::to_string_pretty(&self.config)?)
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Create the first admin on a fresh database.
    pub fn bootstrap_admin(&self, username: String, display_name: String) -> Result<FfiUser, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.bootstrap_admin(&username, &display_name)?.into())
    }

    pub fn create_user(
        &self,
        actor_id: String,
        username: String,
        display_name: String,
        role: String,
    ) -> Result<FfiUser, ClinicError> {
        let role = parse_arg(&role, "role", Role::parse)?;
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.create_user(&actor_id, &username, &display_name, role)?.into())
    }

    pub fn change_role(&self, actor_id: String, user_id: String, role: String) -> Result<FfiUser, ClinicError> {
        let role = parse_arg(&role, "role", Role::parse)?;
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.change_role(&actor_id, &user_id, role)?.into())
    }

    pub fn deactivate_user(&self, actor_id: String, user_id: String) -> Result<FfiUser, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.deactivate_user(&actor_id, &user_id)?.into())
    }

    pub fn list_users(&self) -> Result<Vec<FfiUser>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.list_users()?.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Patients
    // =========================================================================

    /// Register a patient. Possible duplicates are returned, not rejected.
    pub fn register_patient(&self, actor_id: String, patient: FfiNewPatient) -> Result<FfiRegistration, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.register_patient(&actor_id, patient.into())?.into())
    }

    pub fn update_patient(&self, actor_id: String, patient: FfiPatient) -> Result<FfiPatient, ClinicError> {
        let db = self.db.lock()?;
        let stored = db
            .get_patient(&patient.patient_id)?
            .ok_or_else(|| ClinicError::NotFound(format!("patient {}", patient.patient_id)))?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.update_patient(&actor_id, &patient.merge_into(stored))?.into())
    }

    pub fn deactivate_patient(&self, actor_id: String, patient_id: String) -> Result<FfiPatient, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.deactivate_patient(&actor_id, &patient_id)?.into())
    }

    pub fn get_patient(&self, patient_id: String) -> Result<Option<FfiPatient>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.get_patient(&patient_id)?.map(Into::into))
    }

    pub fn get_patient_by_mrn(&self, mrn: String) -> Result<Option<FfiPatient>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.get_patient_by_mrn(&mrn)?.map(Into::into))
    }

    /// Search patients by name, MRN or phone prefix.
    pub fn search_patients(&self, query: String, limit: u32) -> Result<Vec<FfiPatient>, ClinicError> {
        let db = self.db.lock()?;
        let patients = db.search_patients(&query, limit as usize)?;
        Ok(patients.into_iter().map(Into::into).collect())
    }

    pub fn find_possible_duplicates(
        &self,
        first_name: String,
        last_name: String,
        date_of_birth: Option<String>,
    ) -> Result<Vec<FfiDuplicateCandidate>, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        let candidates = ledger.find_possible_duplicates(&first_name, &last_name, date_of_birth.as_deref())?;
        Ok(candidates.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Admissions
    // =========================================================================

    pub fn admit_patient(
        &self,
        actor_id: String,
        patient_id: String,
        ward: String,
        bed: Option<String>,
        attending_id: Option<String>,
        reason: Option<String>,
        daily_rate_cents: i64,
    ) -> Result<FfiAdmission, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        let admission = ledger.admit_patient(
            &actor_id,
            AdmissionRequest {
                patient_id,
                ward,
                bed,
                attending_id,
                reason,
                daily_rate_cents,
            },
        )?;
        Ok(admission.into())
    }

    pub fn discharge_patient(&self, actor_id: String, admission_id: String) -> Result<FfiDischarge, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.discharge_patient(&actor_id, &admission_id)?.into())
    }

    pub fn cancel_admission(
        &self,
        actor_id: String,
        admission_id: String,
        reason: String,
    ) -> Result<FfiAdmission, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.cancel_admission(&actor_id, &admission_id, &reason)?.into())
    }

    /// Current inpatients, optionally for one ward.
    pub fn list_current_admissions(&self, ward: Option<String>) -> Result<Vec<FfiAdmission>, ClinicError> {
        let db = self.db.lock()?;
        let admissions = db.list_current_admissions(ward.as_deref())?;
        Ok(admissions.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Pathology
    // =========================================================================

    pub fn order_pathology_test(
        &self,
        actor_id: String,
        patient_id: String,
        admission_id: Option<String>,
        test_code: String,
        test_name: String,
        priority: String,
        price_cents: i64,
    ) -> Result<FfiPathologyOrder, ClinicError> {
        let priority = parse_arg(&priority, "priority", db::string_to_priority)?;
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        let order = ledger.order_pathology_test(
            &actor_id,
            PathologyRequest {
                patient_id,
                admission_id,
                test_code,
                test_name,
                priority,
                price_cents,
            },
        )?;
        Ok(order.into())
    }

    pub fn advance_pathology_order(
        &self,
        actor_id: String,
        order_id: String,
        result: Option<String>,
    ) -> Result<FfiPathologyOrder, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.advance_pathology_order(&actor_id, &order_id, result)?.into())
    }

    pub fn cancel_pathology_order(
        &self,
        actor_id: String,
        order_id: String,
        reason: String,
    ) -> Result<FfiPathologyOrder, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.cancel_pathology_order(&actor_id, &order_id, &reason)?.into())
    }

    /// Open orders, most urgent first.
    pub fn pathology_worklist(&self) -> Result<Vec<FfiPathologyOrder>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.list_pathology_worklist()?.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Fertility
    // =========================================================================

    pub fn open_fertility_case(
        &self,
        actor_id: String,
        patient_id: String,
        treatment: String,
        partner_name: Option<String>,
        consultant_id: Option<String>,
    ) -> Result<FfiFertilityCase, ClinicError> {
        let treatment = parse_arg(&treatment, "treatment", db::string_to_treatment)?;
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        let case = ledger.open_fertility_case(
            &actor_id,
            FertilityCaseRequest {
                patient_id,
                treatment,
                partner_name,
                consultant_id,
                notes: None,
            },
        )?;
        Ok(case.into())
    }

    pub fn record_fertility_procedure(
        &self,
        actor_id: String,
        case_id: String,
        description: String,
        amount_cents: i64,
    ) -> Result<FfiCharge, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger
            .record_fertility_procedure(&actor_id, &case_id, &description, amount_cents)?
            .into())
    }

    pub fn set_fertility_case_status(
        &self,
        actor_id: String,
        case_id: String,
        status: String,
    ) -> Result<FfiFertilityCase, ClinicError> {
        let status = parse_arg(&status, "case status", db::string_to_case_status)?;
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.set_fertility_case_status(&actor_id, &case_id, status)?.into())
    }

    pub fn start_new_cycle(
        &self,
        actor_id: String,
        case_id: String,
        treatment: Option<String>,
    ) -> Result<FfiFertilityCase, ClinicError> {
        let treatment = treatment
            .map(|t| parse_arg(&t, "treatment", db::string_to_treatment))
            .transpose()?;
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.start_new_cycle(&actor_id, &case_id, treatment)?.into())
    }

    // =========================================================================
    // Charges & Payments
    // =========================================================================

    pub fn post_charge(
        &self,
        actor_id: String,
        patient_id: String,
        kind: String,
        description: String,
        amount_cents: i64,
        reference_id: Option<String>,
    ) -> Result<FfiCharge, ClinicError> {
        let kind = parse_arg(&kind, "charge kind", ChargeKind::parse)?;
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        let charge = ledger.post_charge(
            &actor_id,
            ChargeRequest {
                patient_id,
                kind,
                description,
                amount_cents,
                reference_id,
            },
        )?;
        Ok(charge.into())
    }

    pub fn void_charge(&self, actor_id: String, charge_id: String, reason: String) -> Result<FfiCharge, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.void_charge(&actor_id, &charge_id, &reason)?.into())
    }

    pub fn list_charges(&self, patient_id: String) -> Result<Vec<FfiCharge>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.list_charges_for_patient(&patient_id)?.into_iter().map(Into::into).collect())
    }

    /// Take a payment. Empty `target_charge_ids` applies the configured strategy.
    pub fn record_payment(
        &self,
        actor_id: String,
        patient_id: String,
        method: String,
        amount_cents: i64,
        reference: Option<String>,
        target_charge_ids: Vec<String>,
    ) -> Result<FfiPaymentReceipt, ClinicError> {
        let method = parse_arg(&method, "payment method", PaymentMethod::parse)?;
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        let receipt = ledger.record_payment(
            &actor_id,
            PaymentRequest {
                patient_id,
                method,
                amount_cents,
                reference,
                target_charge_ids,
            },
        )?;
        Ok(receipt.into())
    }

    pub fn apply_credit(&self, actor_id: String, patient_id: String) -> Result<Vec<FfiAllocation>, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.apply_credit(&actor_id, &patient_id)?.into_iter().map(Into::into).collect())
    }

    pub fn refund_payment(
        &self,
        actor_id: String,
        payment_id: String,
        amount_cents: i64,
        reason: String,
    ) -> Result<FfiRefundReceipt, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.refund_payment(&actor_id, &payment_id, amount_cents, &reason)?.into())
    }

    pub fn list_payments(&self, patient_id: String) -> Result<Vec<FfiPayment>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.list_payments_for_patient(&patient_id)?.into_iter().map(Into::into).collect())
    }

    pub fn patient_balance(&self, patient_id: String) -> Result<FfiPatientBalance, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.patient_balance(&patient_id)?.into())
    }

    // =========================================================================
    // Shifts
    // =========================================================================

    pub fn open_shift(&self, actor_id: String, opening_balance_cents: i64) -> Result<FfiShift, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.open_shift(&actor_id, opening_balance_cents)?.into())
    }

    /// The user's open shift, if any.
    pub fn current_shift(&self, user_id: String) -> Result<Option<FfiShift>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.get_open_shift(&user_id)?.map(Into::into))
    }

    pub fn record_cash_movement(
        &self,
        actor_id: String,
        shift_id: String,
        kind: String,
        amount_cents: i64,
        reason: String,
    ) -> Result<FfiCashMovement, ClinicError> {
        let kind = parse_arg(&kind, "movement kind", MovementKind::parse)?;
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger
            .record_cash_movement(&actor_id, &shift_id, kind, amount_cents, &reason)?
            .into())
    }

    pub fn close_shift(
        &self,
        actor_id: String,
        shift_id: String,
        counted_cash_cents: i64,
        notes: Option<String>,
    ) -> Result<FfiShift, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.close_shift(&actor_id, &shift_id, counted_cash_cents, notes)?.into())
    }

    pub fn shift_summary(&self, shift_id: String) -> Result<FfiShiftSummary, ClinicError> {
        let db = self.db.lock()?;
        let ledger = ClinicLedger::new(&db, &self.config);
        Ok(ledger.shift_summary(&shift_id)?.into())
    }

    // =========================================================================
    // Audit Trail
    // =========================================================================

    pub fn get_tree_stats(&self) -> Result<FfiTreeStats, ClinicError> {
        let db = self.db.lock()?;
        let trail = AuditTrail::new(&db);
        Ok(trail.stats()?.into())
    }

    /// Re-hash a stored activity entry and check its inclusion proof.
    pub fn verify_activity_entry(&self, entry_id: String) -> Result<FfiEntryVerification, ClinicError> {
        let db = self.db.lock()?;
        let trail = AuditTrail::new(&db);
        Ok(trail.verify_entry(&entry_id)?.into())
    }

    pub fn activity_for_entity(
        &self,
        entity_type: String,
        entity_id: String,
    ) -> Result<Vec<FfiActivityEntry>, ClinicError> {
        let db = self.db.lock()?;
        let entries = db.list_activity_for_entity(&entity_type, &entity_id)?;
        Ok(entries.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Export Operations
    // =========================================================================

    pub fn export_shift_report_json(&self, shift_id: String) -> Result<String, ClinicError> {
        let db = self.db.lock()?;
        let report = export::ShiftReportExporter::new(&db, &self.config).export(&shift_id)?;
        Ok(report.to_json()?)
    }

    pub fn export_shift_report_csv(&self, shift_id: String) -> Result<String, ClinicError> {
        let db = self.db.lock()?;
        let report = export::ShiftReportExporter::new(&db, &self.config).export(&shift_id)?;
        Ok(report.to_csv())
    }

    pub fn export_patient_statement_json(&self, patient_id: String) -> Result<String, ClinicError> {
        let db = self.db.lock()?;
        let statement = export::StatementExporter::new(&db, &self.config).export(&patient_id)?;
        Ok(statement.to_json()?)
    }

    pub fn export_patient_statement_csv(&self, patient_id: String) -> Result<String, ClinicError> {
        let db = self.db.lock()?;
        let statement = export::StatementExporter::new(&db, &self.config).export(&patient_id)?;
        Ok(statement.to_csv())
    }

    /// Export the activity log with inclusion proofs as JSON.
    pub fn export_audit_json(&self) -> Result<String, ClinicError> {
        let db = self.db.lock()?;
        let exporter =
            export::AuditExporter::new(&db).with_system_id(self.config.system_id.clone());
        Ok(exporter.export_all()?.to_json()?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe user.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUser {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub active: bool,
}

impl From<User> for FfiUser {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            display_name: user.display_name,
            role: user.role.as_str().to_string(),
            active: user.active,
        }
    }
}

/// FFI-safe patient registration input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewPatient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub sex: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl From<FfiNewPatient> for NewPatient {
    fn from(p: FfiNewPatient) -> Self {
        NewPatient {
            first_name: p.first_name,
            last_name: p.last_name,
            date_of_birth: p.date_of_birth,
            sex: p.sex,
            phone: p.phone,
            email: p.email,
            address: p.address,
            notes: p.notes,
        }
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub patient_id: String,
    pub mrn: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub sex: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub active: bool,
}

impl FfiPatient {
    /// Apply the editable fields onto the stored record.
    fn merge_into(self, mut stored: Patient) -> Patient {
        stored.mrn = self.mrn;
        stored.first_name = self.first_name;
        stored.last_name = self.last_name;
        stored.date_of_birth = self.date_of_birth;
        stored.sex = self.sex;
        stored.phone = self.phone;
        stored.email = self.email;
        stored.address = self.address;
        stored.notes = self.notes;
        stored
    }
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            patient_id: patient.patient_id,
            mrn: patient.mrn,
            first_name: patient.first_name,
            last_name: patient.last_name,
            date_of_birth: patient.date_of_birth,
            sex: patient.sex,
            phone: patient.phone,
            email: patient.email,
            address: patient.address,
            notes: patient.notes,
            active: patient.active,
        }
    }
}

/// FFI-safe duplicate candidate.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDuplicateCandidate {
    pub patient_id: String,
    pub mrn: String,
    pub full_name: String,
    pub similarity: f64,
    pub same_date_of_birth: bool,
}

impl From<models::DuplicateCandidate> for FfiDuplicateCandidate {
    fn from(c: models::DuplicateCandidate) -> Self {
        Self {
            patient_id: c.patient_id,
            mrn: c.mrn,
            full_name: c.full_name,
            similarity: c.similarity,
            same_date_of_birth: c.same_date_of_birth,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRegistration {
    pub patient: FfiPatient,
    pub possible_duplicates: Vec<FfiDuplicateCandidate>,
}

impl From<ledger::Registration> for FfiRegistration {
    fn from(r: ledger::Registration) -> Self {
        Self {
            patient: r.patient.into(),
            possible_duplicates: r.possible_duplicates.into_iter().map(Into::into).collect(),
        }
    }
}

/// FFI-safe admission.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAdmission {
    pub admission_id: String,
    pub patient_id: String,
    pub ward: String,
    pub bed: Option<String>,
    pub attending_id: Option<String>,
    pub daily_rate_cents: i64,
    pub status: String,
    pub admitted_at: String,
    pub discharged_at: Option<String>,
    pub charge_id: Option<String>,
}

impl From<Admission> for FfiAdmission {
    fn from(a: Admission) -> Self {
        Self {
            admission_id: a.admission_id,
            patient_id: a.patient_id,
            ward: a.ward,
            bed: a.bed,
            attending_id: a.attending_id,
            daily_rate_cents: a.daily_rate_cents,
            status: db::admission_status_to_string(a.status).to_string(),
            admitted_at: a.admitted_at,
            discharged_at: a.discharged_at,
            charge_id: a.charge_id,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDischarge {
    pub admission: FfiAdmission,
    pub billable_days: i64,
    pub charge: Option<FfiCharge>,
}

impl From<ledger::Discharge> for FfiDischarge {
    fn from(d: ledger::Discharge) -> Self {
        Self {
            admission: d.admission.into(),
            billable_days: d.billable_days,
            charge: d.charge.map(Into::into),
        }
    }
}

/// FFI-safe pathology order.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPathologyOrder {
    pub order_id: String,
    pub patient_id: String,
    pub admission_id: Option<String>,
    pub test_code: String,
    pub test_name: String,
    pub priority: String,
    pub status: String,
    pub price_cents: i64,
    pub result: Option<String>,
    pub charge_id: Option<String>,
    pub ordered_at: String,
    pub completed_at: Option<String>,
}

impl From<PathologyOrder> for FfiPathologyOrder {
    fn from(o: PathologyOrder) -> Self {
        Self {
            order_id: o.order_id,
            patient_id: o.patient_id,
            admission_id: o.admission_id,
            test_code: o.test_code,
            test_name: o.test_name,
            priority: db::priority_to_string(o.priority).to_string(),
            status: db::pathology_status_to_string(o.status).to_string(),
            price_cents: o.price_cents,
            result: o.result,
            charge_id: o.charge_id,
            ordered_at: o.ordered_at,
            completed_at: o.completed_at,
        }
    }
}

/// FFI-safe fertility case.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFertilityCase {
    pub case_id: String,
    pub patient_id: String,
    pub partner_name: Option<String>,
    pub treatment: String,
    pub cycle_number: u32,
    pub status: String,
    pub consultant_id: Option<String>,
    pub opened_at: String,
}

impl From<FertilityCase> for FfiFertilityCase {
    fn from(c: FertilityCase) -> Self {
        Self {
            case_id: c.case_id,
            patient_id: c.patient_id,
            partner_name: c.partner_name,
            treatment: db::treatment_to_string(c.treatment).to_string(),
            cycle_number: c.cycle_number,
            status: db::case_status_to_string(c.status).to_string(),
            consultant_id: c.consultant_id,
            opened_at: c.opened_at,
        }
    }
}

/// FFI-safe service charge.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCharge {
    pub charge_id: String,
    pub patient_id: String,
    pub kind: String,
    pub reference_id: Option<String>,
    pub description: String,
    pub amount_cents: i64,
    pub allocated_cents: i64,
    pub outstanding_cents: i64,
    pub status: String,
    pub charged_at: String,
}

impl From<ServiceCharge> for FfiCharge {
    fn from(c: ServiceCharge) -> Self {
        Self {
            outstanding_cents: c.outstanding_cents(),
            charge_id: c.charge_id,
            patient_id: c.patient_id,
            kind: c.source.kind.as_str().to_string(),
            reference_id: c.source.reference_id,
            description: c.description,
            amount_cents: c.amount_cents,
            allocated_cents: c.allocated_cents,
            status: c.status.as_str().to_string(),
            charged_at: c.charged_at,
        }
    }
}

/// FFI-safe payment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPayment {
    pub payment_id: String,
    pub patient_id: String,
    pub shift_id: Option<String>,
    pub received_by: String,
    pub method: String,
    pub amount_cents: i64,
    pub allocated_cents: i64,
    pub refunded_cents: i64,
    pub unallocated_cents: i64,
    pub reference: Option<String>,
    pub received_at: String,
}

impl From<Payment> for FfiPayment {
    fn from(p: Payment) -> Self {
        Self {
            unallocated_cents: p.unallocated_cents(),
            payment_id: p.payment_id,
            patient_id: p.patient_id,
            shift_id: p.shift_id,
            received_by: p.received_by,
            method: p.method.as_str().to_string(),
            amount_cents: p.amount_cents,
            allocated_cents: p.allocated_cents,
            refunded_cents: p.refunded_cents,
            reference: p.reference,
            received_at: p.received_at,
        }
    }
}

/// FFI-safe payment allocation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAllocation {
    pub allocation_id: String,
    pub payment_id: String,
    pub charge_id: String,
    pub amount_cents: i64,
}

impl From<models::PaymentAllocation> for FfiAllocation {
    fn from(a: models::PaymentAllocation) -> Self {
        Self {
            allocation_id: a.allocation_id,
            payment_id: a.payment_id,
            charge_id: a.charge_id,
            amount_cents: a.amount_cents,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPaymentReceipt {
    pub payment: FfiPayment,
    pub allocations: Vec<FfiAllocation>,
}

impl From<ledger::PaymentReceipt> for FfiPaymentReceipt {
    fn from(r: ledger::PaymentReceipt) -> Self {
        Self {
            payment: r.payment.into(),
            allocations: r.allocations.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRefundReceipt {
    pub refund_id: String,
    pub shift_id: Option<String>,
    pub amount_cents: i64,
    pub from_unallocated_cents: i64,
    pub reversed_cents: i64,
    pub payment: FfiPayment,
}

impl From<ledger::RefundReceipt> for FfiRefundReceipt {
    fn from(r: ledger::RefundReceipt) -> Self {
        Self {
            refund_id: r.refund.refund_id,
            shift_id: r.refund.shift_id,
            amount_cents: r.refund.amount_cents,
            from_unallocated_cents: r.from_unallocated_cents,
            reversed_cents: r.reversed.iter().map(|l| l.amount_cents).sum(),
            payment: r.payment.into(),
        }
    }
}

/// FFI-safe shift.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiShift {
    pub shift_id: String,
    pub user_id: String,
    pub status: String,
    pub opening_balance_cents: i64,
    pub cash_collected_cents: i64,
    pub non_cash_collected_cents: i64,
    pub cash_refunded_cents: i64,
    pub non_cash_refunded_cents: i64,
    pub paid_in_cents: i64,
    pub paid_out_cents: i64,
    pub dropped_cents: i64,
    /// Running figure while open, frozen at close; absent if the totals overflow
    pub expected_cash_cents: Option<i64>,
    pub closing_balance_cents: Option<i64>,
    pub variance_cents: Option<i64>,
    pub variance_status: Option<String>,
    pub notes: Option<String>,
    pub opened_at: String,
    pub closed_at: Option<String>,
}

impl From<Shift> for FfiShift {
    fn from(s: Shift) -> Self {
        Self {
            expected_cash_cents: s
                .expected_cash_cents
                .or_else(|| ledger::expected_cash(&s).ok()),
            status: if s.is_open() { "open" } else { "closed" }.to_string(),
            variance_status: s.variance_status.map(|v| v.as_str().to_string()),
            shift_id: s.shift_id,
            user_id: s.user_id,
            opening_balance_cents: s.opening_balance_cents,
            cash_collected_cents: s.cash_collected_cents,
            non_cash_collected_cents: s.non_cash_collected_cents,
            cash_refunded_cents: s.cash_refunded_cents,
            non_cash_refunded_cents: s.non_cash_refunded_cents,
            paid_in_cents: s.paid_in_cents,
            paid_out_cents: s.paid_out_cents,
            dropped_cents: s.dropped_cents,
            closing_balance_cents: s.closing_balance_cents,
            variance_cents: s.variance_cents,
            notes: s.notes,
            opened_at: s.opened_at,
            closed_at: s.closed_at,
        }
    }
}

/// FFI-safe cash movement.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCashMovement {
    pub movement_id: String,
    pub shift_id: String,
    pub kind: String,
    pub amount_cents: i64,
    pub reason: String,
    pub recorded_at: String,
}

impl From<CashMovement> for FfiCashMovement {
    fn from(m: CashMovement) -> Self {
        Self {
            movement_id: m.movement_id,
            shift_id: m.shift_id,
            kind: m.kind.as_str().to_string(),
            amount_cents: m.amount_cents,
            reason: m.reason,
            recorded_at: m.recorded_at,
        }
    }
}

/// FFI-safe per-method totals.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMethodTotal {
    pub method: String,
    pub payment_count: u32,
    pub collected_cents: i64,
    pub refund_count: u32,
    pub refunded_cents: i64,
}

impl From<ledger::MethodTotal> for FfiMethodTotal {
    fn from(t: ledger::MethodTotal) -> Self {
        Self {
            method: t.method.as_str().to_string(),
            payment_count: t.payment_count,
            collected_cents: t.collected_cents,
            refund_count: t.refund_count,
            refunded_cents: t.refunded_cents,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiShiftSummary {
    pub shift: FfiShift,
    pub expected_cash_cents: i64,
    pub payment_count: u32,
    pub refund_count: u32,
    pub movement_count: u32,
    pub method_totals: Vec<FfiMethodTotal>,
}

impl From<ledger::ShiftSummary> for FfiShiftSummary {
    fn from(s: ledger::ShiftSummary) -> Self {
        Self {
            shift: s.shift.into(),
            expected_cash_cents: s.expected_cash_cents,
            payment_count: s.payment_count,
            refund_count: s.refund_count,
            movement_count: s.movement_count,
            method_totals: s.method_totals.into_iter().map(Into::into).collect(),
        }
    }
}

/// FFI-safe account balance.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientBalance {
    pub patient_id: String,
    pub total_charged_cents: i64,
    pub total_paid_cents: i64,
    pub outstanding_cents: i64,
    pub credit_cents: i64,
    pub net_due_cents: i64,
}

impl From<ledger::PatientBalance> for FfiPatientBalance {
    fn from(b: ledger::PatientBalance) -> Self {
        Self {
            net_due_cents: b.net_due_cents(),
            patient_id: b.patient_id,
            total_charged_cents: b.total_charged_cents,
            total_paid_cents: b.total_paid_cents,
            outstanding_cents: b.outstanding_cents,
            credit_cents: b.credit_cents,
        }
    }
}

/// FFI-safe activity entry. Details are passed as a JSON string.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiActivityEntry {
    pub entry_id: String,
    pub actor_id: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details_json: String,
    pub recorded_at: String,
    pub leaf_hash: String,
}

impl From<ActivityEntry> for FfiActivityEntry {
    fn from(e: ActivityEntry) -> Self {
        Self {
            entry_id: e.entry_id,
            actor_id: e.actor_id,
            action: e.action.as_str().to_string(),
            entity_type: e.entity_type,
            entity_id: e.entity_id,
            details_json: e.details.to_string(),
            recorded_at: e.recorded_at,
            leaf_hash: e.leaf_hash,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEntryVerification {
    pub entry_id: String,
    pub leaf_hash: String,
    pub content_matches: bool,
    pub proof_valid: bool,
}

impl From<EntryVerification> for FfiEntryVerification {
    fn from(v: EntryVerification) -> Self {
        Self {
            entry_id: v.entry_id,
            leaf_hash: v.leaf_hash,
            content_matches: v.content_matches,
            proof_valid: v.proof_valid,
        }
    }
}

/// FFI-safe tree statistics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTreeStats {
    pub root_hash: Option<String>,
    pub height: u32,
    pub leaf_count: u32,
}

impl From<TreeStats> for FfiTreeStats {
    fn from(stats: TreeStats) -> Self {
        Self {
            root_hash: stats.root_hash,
            height: stats.height,
            leaf_count: stats.leaf_count,
        }
    }
}
