//! The clinic ledger service: every staff-facing operation.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use strsim::jaro_winkler;
use tracing::{debug, info, warn};

use super::allocation::{plan_allocation, plan_reversal, AllocationPlan, ReversalLine};
use super::reconcile::{expected_cash, find_covering_shift, reconcile, summarize_by_method, MethodTotal};
use super::{LedgerError, LedgerResult};
use crate::audit::AuditTrail;
use crate::config::LedgerConfig;
use crate::db::{Database, ShiftDelta};
use crate::models::{
    format_timestamp, now_timestamp, ActivityAction, ActivityEntry, Admission, AdmissionStatus,
    CaseStatus, CashMovement, ChargeKind, ChargeSource, DuplicateCandidate, FertilityCase,
    FertilityTreatment, MovementKind, PathologyOrder, PathologyStatus, Patient, Payment,
    PaymentAllocation, PaymentMethod, Permission, Priority, Refund, Role, ServiceCharge, Shift,
    ShiftStatus, User,
};

// =============================================================================
// Requests
// =============================================================================

/// Demographics for a new patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    /// YYYY-MM-DD
    pub date_of_birth: Option<String>,
    pub sex: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub patient_id: String,
    pub ward: String,
    pub bed: Option<String>,
    pub attending_id: Option<String>,
    pub reason: Option<String>,
    pub daily_rate_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathologyRequest {
    pub patient_id: String,
    pub admission_id: Option<String>,
    pub test_code: String,
    pub test_name: String,
    pub priority: Priority,
    pub price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FertilityCaseRequest {
    pub patient_id: String,
    pub treatment: FertilityTreatment,
    pub partner_name: Option<String>,
    pub consultant_id: Option<String>,
    pub notes: Option<String>,
}

/// A manually posted charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub patient_id: String,
    pub kind: ChargeKind,
    pub description: String,
    pub amount_cents: i64,
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub patient_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub reference: Option<String>,
    /// Charges to settle, in order. Empty means use the configured strategy.
    #[serde(default)]
    pub target_charge_ids: Vec<String>,
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub patient: Patient,
    pub possible_duplicates: Vec<DuplicateCandidate>,
}

impl Registration {
    /// Candidates that also share the recorded date of birth.
    pub fn likely_duplicates(&self) -> impl Iterator<Item = &DuplicateCandidate> {
        self.possible_duplicates.iter().filter(|d| d.same_date_of_birth)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discharge {
    pub admission: Admission,
    pub billable_days: i64,
    /// Room charge; absent for zero-rate stays
    pub charge: Option<ServiceCharge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub allocations: Vec<PaymentAllocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund: Refund,
    pub payment: Payment,
    pub from_unallocated_cents: i64,
    pub reversed: Vec<ReversalLine>,
}

/// Running position of a shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftSummary {
    pub shift: Shift,
    pub expected_cash_cents: i64,
    pub payment_count: u32,
    pub refund_count: u32,
    pub movement_count: u32,
    pub method_totals: Vec<MethodTotal>,
}

/// A patient's account position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientBalance {
    pub patient_id: String,
    /// Sum of non-voided charges
    pub total_charged_cents: i64,
    /// Sum allocated against those charges
    pub total_paid_cents: i64,
    pub outstanding_cents: i64,
    /// Payments not yet applied to any charge
    pub credit_cents: i64,
}

impl PatientBalance {
    /// Outstanding minus credit. Negative means the clinic owes the patient.
    pub fn net_due_cents(&self) -> i64 {
        self.outstanding_cents - self.credit_cents
    }
}

// =============================================================================
// Service
// =============================================================================

/// Staff-facing ledger operations over one database.
pub struct ClinicLedger<'a> {
    db: &'a Database,
    config: &'a LedgerConfig,
}

impl<'a> ClinicLedger<'a> {
    pub fn new(db: &'a Database, config: &'a LedgerConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &LedgerConfig {
        self.config
    }

    // -------------------------------------------------------------------------
    // Guards and logging
    // -------------------------------------------------------------------------

    fn load_actor(&self, actor_id: &str) -> LedgerResult<User> {
        let actor = self
            .db
            .get_user(actor_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("user {}", actor_id)))?;
        if !actor.active {
            return Err(LedgerError::PermissionDenied(format!(
                "user {} is deactivated",
                actor.username
            )));
        }
        Ok(actor)
    }

    fn authorize(&self, actor_id: &str, permission: Permission) -> LedgerResult<User> {
        let actor = self.load_actor(actor_id)?;
        if !actor.can(permission) {
            warn!(actor = %actor.username, role = actor.role.as_str(), ?permission, "Permission denied");
            return Err(LedgerError::PermissionDenied(format!(
                "{} may not {:?}",
                actor.role.as_str(),
                permission
            )));
        }
        Ok(actor)
    }

    fn log(
        &self,
        actor: &User,
        action: ActivityAction,
        entity_type: &str,
        entity_id: &str,
        details: serde_json::Value,
    ) -> LedgerResult<()> {
        let mut entry = ActivityEntry::new(&actor.user_id, action, entity_type, entity_id, details);
        AuditTrail::new(self.db).record(&mut entry)?;
        Ok(())
    }

    fn active_patient(&self, patient_id: &str) -> LedgerResult<Patient> {
        let patient = self.patient(patient_id)?;
        if !patient.active {
            return Err(LedgerError::InvalidState(format!(
                "patient {} is inactive",
                patient.mrn
            )));
        }
        Ok(patient)
    }

    fn patient(&self, patient_id: &str) -> LedgerResult<Patient> {
        self.db
            .get_patient(patient_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("patient {}", patient_id)))
    }

    fn shift(&self, shift_id: &str) -> LedgerResult<Shift> {
        self.db
            .get_shift(shift_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("shift {}", shift_id)))
    }

    fn charge(&self, charge_id: &str) -> LedgerResult<ServiceCharge> {
        self.db
            .get_charge(charge_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("charge {}", charge_id)))
    }

    /// Insert a charge and log it. Runs inside the caller's transaction.
    fn post_charge_logged(&self, actor: &User, charge: &ServiceCharge) -> LedgerResult<()> {
        self.db.insert_charge(charge)?;
        self.log(
            actor,
            ActivityAction::PostCharge,
            "charge",
            &charge.charge_id,
            json!({
                "patient_id": charge.patient_id,
                "kind": charge.source.kind.as_str(),
                "reference_id": charge.source.reference_id,
                "amount_cents": charge.amount_cents,
            }),
        )
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    /// Create the first admin account. Only allowed on an empty user table.
    pub fn bootstrap_admin(&self, username: &str, display_name: &str) -> LedgerResult<User> {
        self.db.atomically(|| {
            if !self.db.list_users()?.is_empty() {
                return Err(LedgerError::InvalidState("users already exist".into()));
            }
            let admin = User::new(username.trim().to_string(), display_name.to_string(), Role::Admin);
            if admin.username.is_empty() {
                return Err(LedgerError::Validation("username is required".into()));
            }
            self.db.insert_user(&admin)?;
            self.log(&admin, ActivityAction::Create, "user", &admin.user_id, json!({
                "username": admin.username,
                "role": admin.role.as_str(),
                "bootstrap": true,
            }))?;
            info!(username = %admin.username, "Bootstrapped admin account");
            Ok(admin)
        })
    }

    pub fn create_user(
        &self,
        actor_id: &str,
        username: &str,
        display_name: &str,
        role: Role,
    ) -> LedgerResult<User> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManageUsers)?;
            let username = username.trim();
            if username.is_empty() {
                return Err(LedgerError::Validation("username is required".into()));
            }
            if self.db.get_user_by_username(username)?.is_some() {
                return Err(LedgerError::Validation(format!(
                    "username {} is taken",
                    username
                )));
            }

            let user = User::new(username.to_string(), display_name.trim().to_string(), role);
            self.db.insert_user(&user)?;
            self.log(&actor, ActivityAction::Create, "user", &user.user_id, json!({
                "username": user.username,
                "role": role.as_str(),
            }))?;
            info!(username = %user.username, role = role.as_str(), "Created user");
            Ok(user)
        })
    }

    pub fn change_role(&self, actor_id: &str, user_id: &str, role: Role) -> LedgerResult<User> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManageUsers)?;
            let mut user = self
                .db
                .get_user(user_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("user {}", user_id)))?;
            if user.role == role {
                return Ok(user);
            }
            if user.role == Role::Admin && user.active && self.db.count_active_admins()? <= 1 {
                return Err(LedgerError::InvalidState(
                    "cannot demote the last active admin".into(),
                ));
            }

            let previous = user.role;
            user.role = role;
            user.updated_at = now_timestamp();
            self.db.update_user(&user)?;
            self.log(&actor, ActivityAction::Update, "user", &user.user_id, json!({
                "role_from": previous.as_str(),
                "role_to": role.as_str(),
            }))?;
            Ok(user)
        })
    }

    pub fn deactivate_user(&self, actor_id: &str, user_id: &str) -> LedgerResult<User> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManageUsers)?;
            let mut user = self
                .db
                .get_user(user_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("user {}", user_id)))?;
            if !user.active {
                return Err(LedgerError::InvalidState(format!(
                    "user {} is already inactive",
                    user.username
                )));
            }
            if user.role == Role::Admin && self.db.count_active_admins()? <= 1 {
                return Err(LedgerError::InvalidState(
                    "cannot deactivate the last active admin".into(),
                ));
            }
            if self.db.get_open_shift(&user.user_id)?.is_some() {
                return Err(LedgerError::InvalidState(format!(
                    "user {} has an open shift",
                    user.username
                )));
            }

            user.active = false;
            user.updated_at = now_timestamp();
            self.db.update_user(&user)?;
            self.log(&actor, ActivityAction::Deactivate, "user", &user.user_id, json!({
                "username": user.username,
            }))?;
            Ok(user)
        })
    }

    // -------------------------------------------------------------------------
    // Patients
    // -------------------------------------------------------------------------

    /// Register a patient and assign the next MRN.
    ///
    /// Likely duplicates are returned alongside the new record; registration
    /// is not blocked by them.
    pub fn register_patient(&self, actor_id: &str, new: NewPatient) -> LedgerResult<Registration> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManagePatients)?;
            validate_names(&new.first_name, &new.last_name)?;
            if let Some(dob) = &new.date_of_birth {
                validate_date_of_birth(dob)?;
            }

            let possible_duplicates = self.find_possible_duplicates(
                &new.first_name,
                &new.last_name,
                new.date_of_birth.as_deref(),
            )?;

            let mut patient =
                Patient::new(new.first_name.trim().to_string(), new.last_name.trim().to_string());
            patient.date_of_birth = new.date_of_birth;
            patient.sex = new.sex;
            patient.phone = new.phone;
            patient.email = new.email;
            patient.address = new.address;
            patient.notes = new.notes;
            let sequence = self.db.next_mrn_sequence()?;
            patient.mrn = format!("{}-{:06}", self.config.mrn_prefix, sequence);

            self.db.insert_patient(&patient)?;
            self.log(&actor, ActivityAction::Create, "patient", &patient.patient_id, json!({
                "mrn": patient.mrn,
                "possible_duplicates": possible_duplicates
                    .iter()
                    .map(|d| d.mrn.as_str())
                    .collect::<Vec<_>>(),
            }))?;

            let registration = Registration {
                patient,
                possible_duplicates,
            };
            let likely = registration.likely_duplicates().count();
            if likely > 0 {
                warn!(
                    mrn = %registration.patient.mrn,
                    candidates = likely,
                    "Registered patient matches existing records with the same date of birth"
                );
            } else if !registration.possible_duplicates.is_empty() {
                debug!(
                    mrn = %registration.patient.mrn,
                    candidates = registration.possible_duplicates.len(),
                    "Registered patient resembles existing names"
                );
            }
            info!(mrn = %registration.patient.mrn, "Registered patient");

            Ok(registration)
        })
    }

    /// Active patients whose names resemble the given name.
    ///
    /// A candidate with a different recorded date of birth is never a match.
    pub fn find_possible_duplicates(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: Option<&str>,
    ) -> LedgerResult<Vec<DuplicateCandidate>> {
        let wanted = format!("{} {}", first_name.trim(), last_name.trim()).to_lowercase();
        let mut candidates: Vec<DuplicateCandidate> = self
            .db
            .list_active_patients()?
            .into_iter()
            .filter_map(|p| {
                let similarity = jaro_winkler(&wanted, &p.canonical_name());
                if similarity < self.config.duplicate_name_threshold {
                    return None;
                }
                let same_date_of_birth = match (date_of_birth, p.date_of_birth.as_deref()) {
                    (Some(a), Some(b)) if a != b => return None,
                    (Some(_), Some(_)) => true,
                    _ => false,
                };
                Some(DuplicateCandidate {
                    full_name: p.full_name(),
                    patient_id: p.patient_id,
                    mrn: p.mrn,
                    similarity,
                    same_date_of_birth,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.same_date_of_birth
                .cmp(&a.same_date_of_birth)
                .then(b.similarity.total_cmp(&a.similarity))
        });
        Ok(candidates)
    }

    /// Update demographics. The MRN and active flag are not editable here.
    pub fn update_patient(&self, actor_id: &str, patient: &Patient) -> LedgerResult<Patient> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManagePatients)?;
            let mut stored = self.patient(&patient.patient_id)?;
            if patient.mrn != stored.mrn {
                return Err(LedgerError::Validation("MRN cannot be changed".into()));
            }
            validate_names(&patient.first_name, &patient.last_name)?;
            if let Some(dob) = &patient.date_of_birth {
                validate_date_of_birth(dob)?;
            }

            stored.first_name = patient.first_name.trim().to_string();
            stored.last_name = patient.last_name.trim().to_string();
            stored.date_of_birth = patient.date_of_birth.clone();
            stored.sex = patient.sex.clone();
            stored.phone = patient.phone.clone();
            stored.email = patient.email.clone();
            stored.address = patient.address.clone();
            stored.notes = patient.notes.clone();
            stored.updated_at = now_timestamp();

            self.db.update_patient(&stored)?;
            self.log(&actor, ActivityAction::Update, "patient", &stored.patient_id, json!({
                "mrn": stored.mrn,
            }))?;
            Ok(stored)
        })
    }

    pub fn deactivate_patient(&self, actor_id: &str, patient_id: &str) -> LedgerResult<Patient> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManagePatients)?;
            let mut patient = self.active_patient(patient_id)?;
            if self.db.get_active_admission(patient_id)?.is_some() {
                return Err(LedgerError::InvalidState(format!(
                    "patient {} is currently admitted",
                    patient.mrn
                )));
            }

            patient.active = false;
            patient.updated_at = now_timestamp();
            self.db.update_patient(&patient)?;
            self.log(&actor, ActivityAction::Deactivate, "patient", patient_id, json!({
                "mrn": patient.mrn,
            }))?;
            Ok(patient)
        })
    }

    // -------------------------------------------------------------------------
    // Admissions
    // -------------------------------------------------------------------------

    pub fn admit_patient(&self, actor_id: &str, request: AdmissionRequest) -> LedgerResult<Admission> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManageAdmissions)?;
            let patient = self.active_patient(&request.patient_id)?;
            if request.ward.trim().is_empty() {
                return Err(LedgerError::Validation("ward is required".into()));
            }
            if request.daily_rate_cents < 0 {
                return Err(LedgerError::Validation("daily rate must not be negative".into()));
            }
            if self.db.get_active_admission(&patient.patient_id)?.is_some() {
                return Err(LedgerError::InvalidState(format!(
                    "patient {} is already admitted",
                    patient.mrn
                )));
            }

            let mut admission = Admission::new(
                patient.patient_id.clone(),
                request.ward.trim().to_string(),
                request.daily_rate_cents,
            );
            admission.bed = request.bed;
            admission.attending_id = request.attending_id;
            admission.reason = request.reason;

            self.db.insert_admission(&admission)?;
            self.log(&actor, ActivityAction::Create, "admission", &admission.admission_id, json!({
                "patient_id": admission.patient_id,
                "ward": admission.ward,
                "daily_rate_cents": admission.daily_rate_cents,
            }))?;
            info!(mrn = %patient.mrn, ward = %admission.ward, "Admitted patient");
            Ok(admission)
        })
    }

    /// Discharge and bill the stay: one daily rate per started day.
    pub fn discharge_patient(&self, actor_id: &str, admission_id: &str) -> LedgerResult<Discharge> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManageAdmissions)?;
            let mut admission = self
                .db
                .get_admission(admission_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("admission {}", admission_id)))?;
            if admission.status != AdmissionStatus::Admitted {
                return Err(LedgerError::InvalidState(format!(
                    "admission {} is not active",
                    admission_id
                )));
            }

            let now = Utc::now();
            let billable_days = admission.billable_days(now)?;
            let amount = billable_days
                .checked_mul(admission.daily_rate_cents)
                .ok_or_else(|| LedgerError::Validation("room charge overflows".into()))?;

            let charge = if amount > 0 {
                let charge = ServiceCharge::new(
                    admission.patient_id.clone(),
                    ChargeSource::new(ChargeKind::Admission, Some(admission.admission_id.clone())),
                    format!("Ward {}: {} day(s)", admission.ward, billable_days),
                    amount,
                    actor.user_id.clone(),
                );
                self.post_charge_logged(&actor, &charge)?;
                admission.charge_id = Some(charge.charge_id.clone());
                Some(charge)
            } else {
                None
            };

            admission.status = AdmissionStatus::Discharged;
            admission.discharged_at = Some(format_timestamp(now));
            self.db.update_admission(&admission)?;
            self.log(&actor, ActivityAction::StatusChange, "admission", admission_id, json!({
                "status": "discharged",
                "billable_days": billable_days,
                "charge_cents": amount,
            }))?;
            info!(admission_id = %admission_id, billable_days, amount_cents = amount, "Discharged patient");

            Ok(Discharge {
                admission,
                billable_days,
                charge,
            })
        })
    }

    pub fn cancel_admission(
        &self,
        actor_id: &str,
        admission_id: &str,
        reason: &str,
    ) -> LedgerResult<Admission> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManageAdmissions)?;
            let mut admission = self
                .db
                .get_admission(admission_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("admission {}", admission_id)))?;
            if admission.status != AdmissionStatus::Admitted {
                return Err(LedgerError::InvalidState(format!(
                    "admission {} is not active",
                    admission_id
                )));
            }

            admission.status = AdmissionStatus::Cancelled;
            self.db.update_admission(&admission)?;
            self.log(&actor, ActivityAction::StatusChange, "admission", admission_id, json!({
                "status": "cancelled",
                "reason": reason,
            }))?;
            Ok(admission)
        })
    }

    // -------------------------------------------------------------------------
    // Pathology
    // -------------------------------------------------------------------------

    /// Place a lab order and bill it.
    pub fn order_pathology_test(
        &self,
        actor_id: &str,
        request: PathologyRequest,
    ) -> LedgerResult<PathologyOrder> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManagePathology)?;
            let patient = self.active_patient(&request.patient_id)?;
            if request.test_code.trim().is_empty() {
                return Err(LedgerError::Validation("test code is required".into()));
            }
            if request.price_cents < 0 {
                return Err(LedgerError::Validation("price must not be negative".into()));
            }
            if let Some(admission_id) = &request.admission_id {
                let admission = self
                    .db
                    .get_admission(admission_id)?
                    .ok_or_else(|| LedgerError::NotFound(format!("admission {}", admission_id)))?;
                if admission.patient_id != patient.patient_id {
                    return Err(LedgerError::Validation(
                        "admission belongs to another patient".into(),
                    ));
                }
            }

            let mut order = PathologyOrder::new(
                patient.patient_id.clone(),
                request.test_code.trim().to_string(),
                request.test_name,
                request.price_cents,
                actor.user_id.clone(),
            );
            order.priority = request.priority;
            order.admission_id = request.admission_id;

            if order.price_cents > 0 {
                let charge = ServiceCharge::new(
                    patient.patient_id.clone(),
                    ChargeSource::new(ChargeKind::Pathology, Some(order.order_id.clone())),
                    format!("Pathology: {} ({})", order.test_name, order.test_code),
                    order.price_cents,
                    actor.user_id.clone(),
                );
                self.post_charge_logged(&actor, &charge)?;
                order.charge_id = Some(charge.charge_id);
            }

            self.db.insert_pathology_order(&order)?;
            self.log(&actor, ActivityAction::Create, "pathology_order", &order.order_id, json!({
                "patient_id": order.patient_id,
                "test_code": order.test_code,
                "priority": order.priority,
            }))?;
            Ok(order)
        })
    }

    /// Move an order one step along its workflow. Completing requires a result.
    pub fn advance_pathology_order(
        &self,
        actor_id: &str,
        order_id: &str,
        result: Option<String>,
    ) -> LedgerResult<PathologyOrder> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManagePathology)?;
            let mut order = self
                .db
                .get_pathology_order(order_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("pathology order {}", order_id)))?;
            let from = order.status;
            let next = from.next().ok_or_else(|| {
                LedgerError::InvalidState(format!("order {} is {:?}", order_id, from))
            })?;

            let now = now_timestamp();
            if next == PathologyStatus::Completed {
                let result = result
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| LedgerError::Validation("a result is required to complete".into()))?;
                order.result = Some(result);
                order.completed_at = Some(now.clone());
            }
            order.status = next;
            order.updated_at = now;

            self.db.update_pathology_order(&order)?;
            self.log(&actor, ActivityAction::StatusChange, "pathology_order", order_id, json!({
                "from": from,
                "to": next,
            }))?;
            Ok(order)
        })
    }

    /// Cancel an order that has not reached the lab bench, voiding its charge.
    pub fn cancel_pathology_order(
        &self,
        actor_id: &str,
        order_id: &str,
        reason: &str,
    ) -> LedgerResult<PathologyOrder> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManagePathology)?;
            let mut order = self
                .db
                .get_pathology_order(order_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("pathology order {}", order_id)))?;
            if !order.status.can_cancel() {
                return Err(LedgerError::InvalidState(format!(
                    "order {} can no longer be cancelled ({:?})",
                    order_id, order.status
                )));
            }

            if let Some(charge_id) = &order.charge_id {
                self.void_charge_inner(&actor, charge_id, reason)?;
            }

            order.status = PathologyStatus::Cancelled;
            order.updated_at = now_timestamp();
            self.db.update_pathology_order(&order)?;
            self.log(&actor, ActivityAction::StatusChange, "pathology_order", order_id, json!({
                "to": PathologyStatus::Cancelled,
                "reason": reason,
            }))?;
            Ok(order)
        })
    }

    // -------------------------------------------------------------------------
    // Fertility
    // -------------------------------------------------------------------------

    pub fn open_fertility_case(
        &self,
        actor_id: &str,
        request: FertilityCaseRequest,
    ) -> LedgerResult<FertilityCase> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManageFertility)?;
            let patient = self.active_patient(&request.patient_id)?;

            let mut case = FertilityCase::new(patient.patient_id, request.treatment);
            case.partner_name = request.partner_name;
            case.consultant_id = request.consultant_id;
            case.notes = request.notes;

            self.db.insert_fertility_case(&case)?;
            self.log(&actor, ActivityAction::Create, "fertility_case", &case.case_id, json!({
                "patient_id": case.patient_id,
                "treatment": case.treatment,
            }))?;
            Ok(case)
        })
    }

    fn open_case(&self, case_id: &str) -> LedgerResult<FertilityCase> {
        let case = self
            .db
            .get_fertility_case(case_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("fertility case {}", case_id)))?;
        if case.is_closed() {
            return Err(LedgerError::InvalidState(format!("case {} is closed", case_id)));
        }
        Ok(case)
    }

    /// Bill a procedure against the case's current cycle.
    pub fn record_fertility_procedure(
        &self,
        actor_id: &str,
        case_id: &str,
        description: &str,
        amount_cents: i64,
    ) -> LedgerResult<ServiceCharge> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManageFertility)?;
            let case = self.open_case(case_id)?;
            if amount_cents <= 0 {
                return Err(LedgerError::Validation("amount must be positive".into()));
            }
            if description.trim().is_empty() {
                return Err(LedgerError::Validation("description is required".into()));
            }

            let charge = ServiceCharge::new(
                case.patient_id.clone(),
                ChargeSource::new(ChargeKind::Fertility, Some(case.case_id.clone())),
                format!("Cycle {}: {}", case.cycle_number, description.trim()),
                amount_cents,
                actor.user_id.clone(),
            );
            self.post_charge_logged(&actor, &charge)?;
            Ok(charge)
        })
    }

    /// Change case status. Closing is final.
    pub fn set_fertility_case_status(
        &self,
        actor_id: &str,
        case_id: &str,
        status: CaseStatus,
    ) -> LedgerResult<FertilityCase> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManageFertility)?;
            let mut case = self.open_case(case_id)?;
            let from = case.status;
            if from == status {
                return Ok(case);
            }

            case.status = status;
            case.updated_at = now_timestamp();
            self.db.update_fertility_case(&case)?;
            self.log(&actor, ActivityAction::StatusChange, "fertility_case", case_id, json!({
                "from": from,
                "to": status,
            }))?;
            Ok(case)
        })
    }

    /// Begin the next treatment cycle, optionally switching treatment.
    pub fn start_new_cycle(
        &self,
        actor_id: &str,
        case_id: &str,
        treatment: Option<FertilityTreatment>,
    ) -> LedgerResult<FertilityCase> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::ManageFertility)?;
            let mut case = self.open_case(case_id)?;

            case.cycle_number += 1;
            case.status = CaseStatus::Active;
            if let Some(treatment) = treatment {
                case.treatment = treatment;
            }
            case.updated_at = now_timestamp();
            self.db.update_fertility_case(&case)?;
            self.log(&actor, ActivityAction::Update, "fertility_case", case_id, json!({
                "cycle_number": case.cycle_number,
                "treatment": case.treatment,
            }))?;
            Ok(case)
        })
    }

    // -------------------------------------------------------------------------
    // Charges
    // -------------------------------------------------------------------------

    /// Post a charge that no clinical workflow produces.
    pub fn post_charge(&self, actor_id: &str, request: ChargeRequest) -> LedgerResult<ServiceCharge> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::PostCharges)?;
            let patient = self.active_patient(&request.patient_id)?;
            if !matches!(
                request.kind,
                ChargeKind::Consultation | ChargeKind::Pharmacy | ChargeKind::Other
            ) {
                return Err(LedgerError::Validation(format!(
                    "{} charges are posted by their workflow",
                    request.kind.as_str()
                )));
            }
            if request.amount_cents <= 0 {
                return Err(LedgerError::Validation("amount must be positive".into()));
            }
            if request.description.trim().is_empty() {
                return Err(LedgerError::Validation("description is required".into()));
            }

            let charge = ServiceCharge::new(
                patient.patient_id,
                ChargeSource::new(request.kind, request.reference_id),
                request.description.trim().to_string(),
                request.amount_cents,
                actor.user_id.clone(),
            );
            self.post_charge_logged(&actor, &charge)?;
            Ok(charge)
        })
    }

    /// Void a charge nothing has been allocated to.
    pub fn void_charge(
        &self,
        actor_id: &str,
        charge_id: &str,
        reason: &str,
    ) -> LedgerResult<ServiceCharge> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::VoidCharges)?;
            self.void_charge_inner(&actor, charge_id, reason)
        })
    }

    fn void_charge_inner(
        &self,
        actor: &User,
        charge_id: &str,
        reason: &str,
    ) -> LedgerResult<ServiceCharge> {
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation("a void reason is required".into()));
        }
        let charge = self.charge(charge_id)?;
        if charge.is_voided() {
            return Err(LedgerError::InvalidState(format!(
                "charge {} is already voided",
                charge_id
            )));
        }
        if charge.allocated_cents > 0 {
            return Err(LedgerError::InvalidState(format!(
                "charge {} has {} cents of payments allocated",
                charge_id, charge.allocated_cents
            )));
        }
        if !self.db.void_charge(charge_id)? {
            return Err(LedgerError::InvalidState(format!(
                "charge {} changed while voiding",
                charge_id
            )));
        }

        self.log(actor, ActivityAction::VoidCharge, "charge", charge_id, json!({
            "amount_cents": charge.amount_cents,
            "reason": reason,
        }))?;
        self.charge(charge_id)
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    /// Take a payment and apply it to the patient's charges.
    ///
    /// Cash can only be taken on the receiver's open shift; other methods
    /// are attached to it when one is open.
    pub fn record_payment(&self, actor_id: &str, request: PaymentRequest) -> LedgerResult<PaymentReceipt> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::CollectPayments)?;
            let patient = self.patient(&request.patient_id)?;
            if request.amount_cents <= 0 {
                return Err(LedgerError::Validation("amount must be positive".into()));
            }

            let shift = self.db.get_open_shift(&actor.user_id)?;
            if request.method.is_cash() && shift.is_none() {
                return Err(LedgerError::InvalidState(
                    "cash payments require an open shift".into(),
                ));
            }

            let mut payment = Payment::new(
                patient.patient_id.clone(),
                actor.user_id.clone(),
                request.method,
                request.amount_cents,
            );
            payment.shift_id = shift.as_ref().map(|s| s.shift_id.clone());
            payment.reference = request.reference;

            let charges = self.allocation_candidates(&patient.patient_id, &request.target_charge_ids)?;
            let plan = plan_allocation(
                payment.amount_cents,
                &patient.patient_id,
                &charges,
                &request.target_charge_ids,
                &payment.received_at,
                self.config.allocation_strategy,
            )?;

            self.db.insert_payment(&payment)?;
            if let Some(shift) = &shift {
                self.db.apply_shift_delta(
                    &shift.shift_id,
                    &ShiftDelta::collected(payment.method.is_cash(), payment.amount_cents),
                )?;
            }
            self.log(&actor, ActivityAction::RecordPayment, "payment", &payment.payment_id, json!({
                "patient_id": payment.patient_id,
                "method": payment.method.as_str(),
                "amount_cents": payment.amount_cents,
                "shift_id": payment.shift_id,
            }))?;

            let allocations = self.apply_plan(&actor, &mut payment, &plan)?;
            info!(
                payment_id = %payment.payment_id,
                method = payment.method.as_str(),
                amount_cents = payment.amount_cents,
                allocated_cents = payment.allocated_cents,
                "Recorded payment"
            );

            Ok(PaymentReceipt {
                payment,
                allocations,
            })
        })
    }

    /// Charges a plan may draw on: the named targets, or everything the
    /// patient still owes.
    fn allocation_candidates(
        &self,
        patient_id: &str,
        targets: &[String],
    ) -> LedgerResult<Vec<ServiceCharge>> {
        if targets.is_empty() {
            return Ok(self.db.list_outstanding_charges(patient_id)?);
        }
        let mut seen = HashSet::new();
        let mut charges = Vec::new();
        for target in targets {
            if seen.insert(target.as_str()) {
                if let Some(charge) = self.db.get_charge(target)? {
                    charges.push(charge);
                }
            }
        }
        Ok(charges)
    }

    fn apply_plan(
        &self,
        actor: &User,
        payment: &mut Payment,
        plan: &AllocationPlan,
    ) -> LedgerResult<Vec<PaymentAllocation>> {
        if plan.lines.is_empty() {
            return Ok(Vec::new());
        }
        if plan.allocated_cents() > payment.unallocated_cents() {
            return Err(LedgerError::OverAllocation(format!(
                "plan allocates {} but payment {} has {} unallocated",
                plan.allocated_cents(),
                payment.payment_id,
                payment.unallocated_cents()
            )));
        }

        let mut allocations = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            let allocation = PaymentAllocation::new(
                payment.payment_id.clone(),
                line.charge_id.clone(),
                line.amount_cents,
            );
            self.db.insert_allocation(&allocation)?;
            self.db
                .adjust_charge_allocation(&line.charge_id, line.amount_cents)?;
            allocations.push(allocation);
        }
        self.db
            .adjust_payment_totals(&payment.payment_id, plan.allocated_cents(), 0)?;
        payment.allocated_cents += plan.allocated_cents();

        self.log(actor, ActivityAction::Allocate, "payment", &payment.payment_id, json!({
            "lines": plan.lines,
            "unallocated_cents": payment.unallocated_cents(),
        }))?;
        Ok(allocations)
    }

    /// Apply a patient's unallocated credit to what they owe, oldest payment first.
    pub fn apply_credit(&self, actor_id: &str, patient_id: &str) -> LedgerResult<Vec<PaymentAllocation>> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::CollectPayments)?;
            self.patient(patient_id)?;

            let mut charges = self.db.list_outstanding_charges(patient_id)?;
            let mut allocations = Vec::new();

            for mut payment in self.db.list_unallocated_payments(patient_id)? {
                if charges.iter().all(|c| c.outstanding_cents() == 0) {
                    break;
                }
                let plan = plan_allocation(
                    payment.unallocated_cents(),
                    patient_id,
                    &charges,
                    &[],
                    &payment.received_at,
                    self.config.allocation_strategy,
                )?;
                for line in &plan.lines {
                    if let Some(charge) = charges.iter_mut().find(|c| c.charge_id == line.charge_id) {
                        charge.apply_allocation_delta(line.amount_cents);
                    }
                }
                allocations.extend(self.apply_plan(&actor, &mut payment, &plan)?);
            }

            debug!(patient_id = %patient_id, allocations = allocations.len(), "Applied patient credit");
            Ok(allocations)
        })
    }

    /// Refund part or all of a payment.
    ///
    /// Unapplied credit is returned first, then allocations are unwound newest
    /// first, reopening the charges they settled. Cash leaves the refunding
    /// user's drawer.
    pub fn refund_payment(
        &self,
        actor_id: &str,
        payment_id: &str,
        amount_cents: i64,
        reason: &str,
    ) -> LedgerResult<RefundReceipt> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::IssueRefunds)?;
            if reason.trim().is_empty() {
                return Err(LedgerError::Validation("a refund reason is required".into()));
            }
            if amount_cents <= 0 {
                return Err(LedgerError::Validation("amount must be positive".into()));
            }
            let mut payment = self
                .db
                .get_payment(payment_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("payment {}", payment_id)))?;
            if amount_cents > payment.refundable_cents() {
                return Err(LedgerError::Validation(format!(
                    "refund of {} exceeds refundable {}",
                    amount_cents,
                    payment.refundable_cents()
                )));
            }
            if amount_cents > self.config.manager_refund_threshold_cents && !actor.role.is_supervisor() {
                warn!(actor = %actor.username, amount_cents, "Refund above threshold needs a manager");
                return Err(LedgerError::PermissionDenied(format!(
                    "refunds above {} need a manager or admin",
                    self.config.manager_refund_threshold_cents
                )));
            }

            let shift = self.db.get_open_shift(&actor.user_id)?;
            if payment.method.is_cash() {
                let Some(open) = &shift else {
                    return Err(LedgerError::InvalidState(
                        "cash refunds require an open shift".into(),
                    ));
                };
                let drawer = expected_cash(open)?;
                if amount_cents > drawer {
                    return Err(LedgerError::InvalidState(format!(
                        "drawer holds {} cents, cannot refund {} in cash",
                        drawer, amount_cents
                    )));
                }
            }

            let allocations = self.db.list_allocations_for_payment(payment_id)?;
            let plan = plan_reversal(amount_cents, payment.unallocated_cents(), &allocations)?;

            for line in &plan.lines {
                self.db.reduce_allocation(&line.allocation_id, line.amount_cents)?;
                self.db
                    .adjust_charge_allocation(&line.charge_id, -line.amount_cents)?;
            }
            self.db
                .adjust_payment_totals(payment_id, -plan.reversed_cents(), amount_cents)?;
            payment.allocated_cents -= plan.reversed_cents();
            payment.refunded_cents += amount_cents;

            let mut refund = Refund::new(&payment, amount_cents, reason.trim().to_string(), actor.user_id.clone());
            refund.shift_id = shift.as_ref().map(|s| s.shift_id.clone());
            self.db.insert_refund(&refund)?;
            if let Some(shift) = &shift {
                self.db.apply_shift_delta(
                    &shift.shift_id,
                    &ShiftDelta::refunded(refund.method.is_cash(), amount_cents),
                )?;
            }

            self.log(&actor, ActivityAction::Refund, "payment", payment_id, json!({
                "refund_id": refund.refund_id,
                "amount_cents": amount_cents,
                "from_unallocated_cents": plan.from_unallocated_cents,
                "reversed": plan.lines,
                "shift_id": refund.shift_id,
                "reason": refund.reason,
            }))?;
            info!(payment_id = %payment_id, amount_cents, "Refunded payment");

            Ok(RefundReceipt {
                refund,
                payment,
                from_unallocated_cents: plan.from_unallocated_cents,
                reversed: plan.lines,
            })
        })
    }

    /// The shift a payment belongs to. Payments taken without an open
    /// shift are attributed to the receiver's shift covering the payment
    /// time, or the nearest earlier one.
    pub fn attributed_shift(&self, payment_id: &str) -> LedgerResult<Option<Shift>> {
        let payment = self
            .db
            .get_payment(payment_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("payment {}", payment_id)))?;
        if let Some(shift_id) = &payment.shift_id {
            return Ok(self.db.get_shift(shift_id)?);
        }
        let shifts = self.db.list_shifts_for_user(&payment.received_by)?;
        Ok(find_covering_shift(&shifts, &payment.received_by, &payment.received_at)?.cloned())
    }

    // -------------------------------------------------------------------------
    // Shifts
    // -------------------------------------------------------------------------

    pub fn open_shift(&self, actor_id: &str, opening_balance_cents: i64) -> LedgerResult<Shift> {
        self.db.atomically(|| {
            let actor = self.authorize(actor_id, Permission::OperateShift)?;
            if opening_balance_cents < 0 {
                return Err(LedgerError::Validation(
                    "opening balance must not be negative".into(),
                ));
            }
            if let Some(open) = self.db.get_open_shift(&actor.user_id)? {
                return Err(LedgerError::InvalidState(format!(
                    "user {} already has open shift {}",
                    actor.username, open.shift_id
                )));
            }

            let shift = Shift::open(actor.user_id.clone(), opening_balance_cents);
            self.db.insert_shift(&shift)?;
            self.log(&actor, ActivityAction::OpenShift, "shift", &shift.shift_id, json!({
                "opening_balance_cents": opening_balance_cents,
            }))?;
            info!(shift_id = %shift.shift_id, user = %actor.username, opening_balance_cents, "Shift opened");
            Ok(shift)
        })
    }

    /// Owners operate their own shift; supervisors may act on anyone's.
    fn authorize_on_shift(&self, actor_id: &str, shift: &Shift) -> LedgerResult<User> {
        let permission = if shift.user_id == actor_id {
            Permission::OperateShift
        } else {
            Permission::SuperviseShifts
        };
        self.authorize(actor_id, permission)
    }

    pub fn record_cash_movement(
        &self,
        actor_id: &str,
        shift_id: &str,
        kind: MovementKind,
        amount_cents: i64,
        reason: &str,
    ) -> LedgerResult<CashMovement> {
        self.db.atomically(|| {
            let shift = self.shift(shift_id)?;
            let actor = self.authorize_on_shift(actor_id, &shift)?;
            if !shift.is_open() {
                return Err(LedgerError::InvalidState(format!("shift {} is closed", shift_id)));
            }
            if amount_cents <= 0 {
                return Err(LedgerError::Validation("amount must be positive".into()));
            }
            if reason.trim().is_empty() {
                return Err(LedgerError::Validation("a reason is required".into()));
            }
            if kind != MovementKind::PayIn {
                let drawer = expected_cash(&shift)?;
                if amount_cents > drawer {
                    return Err(LedgerError::InvalidState(format!(
                        "drawer holds {} cents, cannot remove {}",
                        drawer, amount_cents
                    )));
                }
            }

            let movement = CashMovement::new(
                shift_id.to_string(),
                kind,
                amount_cents,
                reason.trim().to_string(),
                actor.user_id.clone(),
            );
            self.db.insert_cash_movement(&movement)?;
            self.db
                .apply_shift_delta(shift_id, &ShiftDelta::movement(kind, amount_cents))?;
            self.log(&actor, ActivityAction::CashMovement, "shift", shift_id, json!({
                "movement_id": movement.movement_id,
                "kind": kind.as_str(),
                "amount_cents": amount_cents,
                "reason": movement.reason,
            }))?;
            Ok(movement)
        })
    }

    /// Close a shift against the counted drawer.
    ///
    /// A note is mandatory when the variance exceeds the note threshold.
    pub fn close_shift(
        &self,
        actor_id: &str,
        shift_id: &str,
        counted_cash_cents: i64,
        notes: Option<String>,
    ) -> LedgerResult<Shift> {
        self.db.atomically(|| {
            let mut shift = self.shift(shift_id)?;
            let actor = self.authorize_on_shift(actor_id, &shift)?;
            if !shift.is_open() {
                return Err(LedgerError::InvalidState(format!(
                    "shift {} is already closed",
                    shift_id
                )));
            }
            if counted_cash_cents < 0 {
                return Err(LedgerError::Validation("counted cash must not be negative".into()));
            }

            let rec = reconcile(&shift, counted_cash_cents, self.config.variance_tolerance_cents)?;
            let notes = notes.filter(|n| !n.trim().is_empty());
            let note_threshold = self.config.variance_note_threshold_cents.max(0).unsigned_abs();
            if rec.variance_cents.unsigned_abs() > note_threshold && notes.is_none() {
                return Err(LedgerError::Validation(format!(
                    "variance of {} cents needs a note",
                    rec.variance_cents
                )));
            }

            shift.status = ShiftStatus::Closed;
            shift.closing_balance_cents = Some(counted_cash_cents);
            shift.expected_cash_cents = Some(rec.expected_cash_cents);
            shift.variance_cents = Some(rec.variance_cents);
            shift.variance_status = Some(rec.status);
            shift.closed_by = Some(actor.user_id.clone());
            shift.notes = notes;
            shift.closed_at = Some(now_timestamp());

            if !self.db.close_shift_record(&shift)? {
                return Err(LedgerError::InvalidState(format!(
                    "shift {} was closed concurrently",
                    shift_id
                )));
            }
            self.log(&actor, ActivityAction::CloseShift, "shift", shift_id, json!({
                "expected_cash_cents": rec.expected_cash_cents,
                "counted_cash_cents": rec.counted_cash_cents,
                "variance_cents": rec.variance_cents,
                "variance_status": rec.status.as_str(),
            }))?;

            if rec.variance_cents != 0 {
                warn!(
                    shift_id = %shift_id,
                    variance_cents = rec.variance_cents,
                    status = rec.status.as_str(),
                    "Shift closed with variance"
                );
            }
            info!(shift_id = %shift_id, closed_by = %actor.username, "Shift closed");
            Ok(shift)
        })
    }

    pub fn shift_summary(&self, shift_id: &str) -> LedgerResult<ShiftSummary> {
        let shift = self.shift(shift_id)?;
        let payments = self.db.list_payments_for_shift(shift_id)?;
        let refunds = self.db.list_refunds_for_shift(shift_id)?;
        let movements = self.db.list_cash_movements(shift_id)?;
        let expected_cash_cents = match shift.expected_cash_cents {
            Some(recorded) => recorded,
            None => expected_cash(&shift)?,
        };

        Ok(ShiftSummary {
            expected_cash_cents,
            payment_count: payments.len() as u32,
            refund_count: refunds.len() as u32,
            movement_count: movements.len() as u32,
            method_totals: summarize_by_method(&payments, &refunds),
            shift,
        })
    }

    // -------------------------------------------------------------------------
    // Balances
    // -------------------------------------------------------------------------

    pub fn patient_balance(&self, patient_id: &str) -> LedgerResult<PatientBalance> {
        self.patient(patient_id)?;
        let charges = self.db.list_charges_for_patient(patient_id)?;
        let live = charges.iter().filter(|c| !c.is_voided());
        let credit_cents: i64 = self
            .db
            .list_unallocated_payments(patient_id)?
            .iter()
            .map(Payment::unallocated_cents)
            .sum();

        let (total_charged_cents, total_paid_cents, outstanding_cents) =
            live.fold((0i64, 0i64, 0i64), |(charged, paid, owed), c| {
                (
                    charged + c.amount_cents,
                    paid + c.allocated_cents,
                    owed + c.outstanding_cents(),
                )
            });

        Ok(PatientBalance {
            patient_id: patient_id.to_string(),
            total_charged_cents,
            total_paid_cents,
            outstanding_cents,
            credit_cents,
        })
    }
}

fn validate_names(first_name: &str, last_name: &str) -> LedgerResult<()> {
    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(LedgerError::Validation("first and last name are required".into()));
    }
    Ok(())
}

fn validate_date_of_birth(value: &str) -> LedgerResult<()> {
    let dob = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| LedgerError::Validation(format!("invalid date of birth: {}", value)))?;
    if dob > Utc::now().date_naive() {
        return Err(LedgerError::Validation("date of birth is in the future".into()));
    }
    Ok(())
}
