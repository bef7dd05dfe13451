//! Admission, pathology order and fertility case database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{column_enum, Database, DbResult};
use crate::models::{
    Admission, AdmissionStatus, CaseStatus, FertilityCase, FertilityTreatment, PathologyOrder,
    PathologyStatus, Priority,
};

// =========================================================================
// Admissions
// =========================================================================

const ADMISSION_COLUMNS: &str = r#"
    admission_id, patient_id, ward, bed, attending_id, reason, daily_rate_cents,
    status, admitted_at, discharged_at, charge_id
"#;

fn admission_from_row(row: &Row<'_>) -> rusqlite::Result<Admission> {
    Ok(Admission {
        admission_id: row.get(0)?,
        patient_id: row.get(1)?,
        ward: row.get(2)?,
        bed: row.get(3)?,
        attending_id: row.get(4)?,
        reason: row.get(5)?,
        daily_rate_cents: row.get(6)?,
        status: column_enum(7, row.get(7)?, string_to_admission_status)?,
        admitted_at: row.get(8)?,
        discharged_at: row.get(9)?,
        charge_id: row.get(10)?,
    })
}

impl Database {
    /// Insert a new admission.
    pub fn insert_admission(&self, admission: &Admission) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO admissions (
                admission_id, patient_id, ward, bed, attending_id, reason,
                daily_rate_cents, status, admitted_at, discharged_at, charge_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                admission.admission_id,
                admission.patient_id,
                admission.ward,
                admission.bed,
                admission.attending_id,
                admission.reason,
                admission.daily_rate_cents,
                admission_status_to_string(admission.status),
                admission.admitted_at,
                admission.discharged_at,
                admission.charge_id,
            ],
        )?;
        Ok(())
    }

    /// Update placement, status and discharge details.
    pub fn update_admission(&self, admission: &Admission) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE admissions SET
                ward = ?2,
                bed = ?3,
                attending_id = ?4,
                reason = ?5,
                status = ?6,
                discharged_at = ?7,
                charge_id = ?8
            WHERE admission_id = ?1
            "#,
            params![
                admission.admission_id,
                admission.ward,
                admission.bed,
                admission.attending_id,
                admission.reason,
                admission_status_to_string(admission.status),
                admission.discharged_at,
                admission.charge_id,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get an admission by ID.
    pub fn get_admission(&self, admission_id: &str) -> DbResult<Option<Admission>> {
        let sql = format!(
            "SELECT {} FROM admissions WHERE admission_id = ?",
            ADMISSION_COLUMNS
        );
        self.conn
            .query_row(&sql, [admission_id], admission_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// The patient's current (admitted) stay, if any.
    pub fn get_active_admission(&self, patient_id: &str) -> DbResult<Option<Admission>> {
        let sql = format!(
            "SELECT {} FROM admissions WHERE patient_id = ? AND status = 'admitted'",
            ADMISSION_COLUMNS
        );
        self.conn
            .query_row(&sql, [patient_id], admission_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// All admissions for a patient, newest first.
    pub fn list_admissions_for_patient(&self, patient_id: &str) -> DbResult<Vec<Admission>> {
        let sql = format!(
            "SELECT {} FROM admissions WHERE patient_id = ? ORDER BY admitted_at DESC",
            ADMISSION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], admission_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Current inpatient census, optionally for one ward.
    pub fn list_current_admissions(&self, ward: Option<&str>) -> DbResult<Vec<Admission>> {
        let sql = format!(
            r#"
            SELECT {} FROM admissions
            WHERE status = 'admitted' AND (?1 IS NULL OR ward = ?1)
            ORDER BY ward, bed
            "#,
            ADMISSION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([ward], admission_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

pub(crate) fn admission_status_to_string(status: AdmissionStatus) -> &'static str {
    match status {
        AdmissionStatus::Admitted => "admitted",
        AdmissionStatus::Discharged => "discharged",
        AdmissionStatus::Cancelled => "cancelled",
    }
}

fn string_to_admission_status(s: &str) -> Option<AdmissionStatus> {
    match s {
        "admitted" => Some(AdmissionStatus::Admitted),
        "discharged" => Some(AdmissionStatus::Discharged),
        "cancelled" => Some(AdmissionStatus::Cancelled),
        _ => None,
    }
}

// =========================================================================
// Pathology orders
// =========================================================================

const ORDER_COLUMNS: &str = r#"
    order_id, patient_id, admission_id, test_code, test_name, priority, status,
    price_cents, ordered_by, result, charge_id, ordered_at, updated_at, completed_at
"#;

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<PathologyOrder> {
    Ok(PathologyOrder {
        order_id: row.get(0)?,
        patient_id: row.get(1)?,
        admission_id: row.get(2)?,
        test_code: row.get(3)?,
        test_name: row.get(4)?,
        priority: column_enum(5, row.get(5)?, string_to_priority)?,
        status: column_enum(6, row.get(6)?, string_to_pathology_status)?,
        price_cents: row.get(7)?,
        ordered_by: row.get(8)?,
        result: row.get(9)?,
        charge_id: row.get(10)?,
        ordered_at: row.get(11)?,
        updated_at: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

impl Database {
    /// Insert a new pathology order.
    pub fn insert_pathology_order(&self, order: &PathologyOrder) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO pathology_orders (
                order_id, patient_id, admission_id, test_code, test_name, priority,
                status, price_cents, ordered_by, result, charge_id, ordered_at,
                updated_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                order.order_id,
                order.patient_id,
                order.admission_id,
                order.test_code,
                order.test_name,
                priority_to_string(order.priority),
                pathology_status_to_string(order.status),
                order.price_cents,
                order.ordered_by,
                order.result,
                order.charge_id,
                order.ordered_at,
                order.updated_at,
                order.completed_at,
            ],
        )?;
        Ok(())
    }

    /// Update workflow fields.
    pub fn update_pathology_order(&self, order: &PathologyOrder) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE pathology_orders SET
                priority = ?2,
                status = ?3,
                result = ?4,
                charge_id = ?5,
                updated_at = ?6,
                completed_at = ?7
            WHERE order_id = ?1
            "#,
            params![
                order.order_id,
                priority_to_string(order.priority),
                pathology_status_to_string(order.status),
                order.result,
                order.charge_id,
                order.updated_at,
                order.completed_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get an order by ID.
    pub fn get_pathology_order(&self, order_id: &str) -> DbResult<Option<PathologyOrder>> {
        let sql = format!(
            "SELECT {} FROM pathology_orders WHERE order_id = ?",
            ORDER_COLUMNS
        );
        self.conn
            .query_row(&sql, [order_id], order_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Orders for a patient, newest first.
    pub fn list_pathology_orders_for_patient(
        &self,
        patient_id: &str,
    ) -> DbResult<Vec<PathologyOrder>> {
        let sql = format!(
            "SELECT {} FROM pathology_orders WHERE patient_id = ? ORDER BY ordered_at DESC",
            ORDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], order_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Lab worklist: open orders, STAT first, then urgent, then oldest.
    pub fn list_pathology_worklist(&self) -> DbResult<Vec<PathologyOrder>> {
        let sql = format!(
            r#"
            SELECT {} FROM pathology_orders
            WHERE status IN ('ordered', 'sample_collected', 'in_progress')
            ORDER BY CASE priority WHEN 'stat' THEN 0 WHEN 'urgent' THEN 1 ELSE 2 END,
                     ordered_at
            "#,
            ORDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], order_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

pub(crate) fn priority_to_string(priority: Priority) -> &'static str {
    match priority {
        Priority::Routine => "routine",
        Priority::Urgent => "urgent",
        Priority::Stat => "stat",
    }
}

pub(crate) fn string_to_priority(s: &str) -> Option<Priority> {
    match s {
        "routine" => Some(Priority::Routine),
        "urgent" => Some(Priority::Urgent),
        "stat" => Some(Priority::Stat),
        _ => None,
    }
}

pub(crate) fn pathology_status_to_string(status: PathologyStatus) -> &'static str {
    match status {
        PathologyStatus::Ordered => "ordered",
        PathologyStatus::SampleCollected => "sample_collected",
        PathologyStatus::InProgress => "in_progress",
        PathologyStatus::Completed => "completed",
        PathologyStatus::Cancelled => "cancelled",
    }
}

fn string_to_pathology_status(s: &str) -> Option<PathologyStatus> {
    match s {
        "ordered" => Some(PathologyStatus::Ordered),
        "sample_collected" => Some(PathologyStatus::SampleCollected),
        "in_progress" => Some(PathologyStatus::InProgress),
        "completed" => Some(PathologyStatus::Completed),
        "cancelled" => Some(PathologyStatus::Cancelled),
        _ => None,
    }
}

// =========================================================================
// Fertility cases
// =========================================================================

const CASE_COLUMNS: &str = r#"
    case_id, patient_id, partner_name, treatment, cycle_number, status,
    consultant_id, notes, opened_at, updated_at
"#;

fn case_from_row(row: &Row<'_>) -> rusqlite::Result<FertilityCase> {
    Ok(FertilityCase {
        case_id: row.get(0)?,
        patient_id: row.get(1)?,
        partner_name: row.get(2)?,
        treatment: column_enum(3, row.get(3)?, string_to_treatment)?,
        cycle_number: row.get(4)?,
        status: column_enum(5, row.get(5)?, string_to_case_status)?,
        consultant_id: row.get(6)?,
        notes: row.get(7)?,
        opened_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl Database {
    /// Insert a new fertility case.
    pub fn insert_fertility_case(&self, case: &FertilityCase) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO fertility_cases (
                case_id, patient_id, partner_name, treatment, cycle_number, status,
                consultant_id, notes, opened_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                case.case_id,
                case.patient_id,
                case.partner_name,
                treatment_to_string(case.treatment),
                case.cycle_number,
                case_status_to_string(case.status),
                case.consultant_id,
                case.notes,
                case.opened_at,
                case.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update a fertility case.
    pub fn update_fertility_case(&self, case: &FertilityCase) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE fertility_cases SET
                partner_name = ?2,
                treatment = ?3,
                cycle_number = ?4,
                status = ?5,
                consultant_id = ?6,
                notes = ?7,
                updated_at = ?8
            WHERE case_id = ?1
            "#,
            params![
                case.case_id,
                case.partner_name,
                treatment_to_string(case.treatment),
                case.cycle_number,
                case_status_to_string(case.status),
                case.consultant_id,
                case.notes,
                case.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a case by ID.
    pub fn get_fertility_case(&self, case_id: &str) -> DbResult<Option<FertilityCase>> {
        let sql = format!("SELECT {} FROM fertility_cases WHERE case_id = ?", CASE_COLUMNS);
        self.conn
            .query_row(&sql, [case_id], case_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Cases for a patient, newest first.
    pub fn list_fertility_cases_for_patient(
        &self,
        patient_id: &str,
    ) -> DbResult<Vec<FertilityCase>> {
        let sql = format!(
            "SELECT {} FROM fertility_cases WHERE patient_id = ? ORDER BY opened_at DESC",
            CASE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], case_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

pub(crate) fn treatment_to_string(treatment: FertilityTreatment) -> &'static str {
    match treatment {
        FertilityTreatment::Consultation => "consultation",
        FertilityTreatment::Iui => "iui",
        FertilityTreatment::Ivf => "ivf",
        FertilityTreatment::Icsi => "icsi",
        FertilityTreatment::Fet => "fet",
    }
}

pub(crate) fn string_to_treatment(s: &str) -> Option<FertilityTreatment> {
    match s {
        "consultation" => Some(FertilityTreatment::Consultation),
        "iui" => Some(FertilityTreatment::Iui),
        "ivf" => Some(FertilityTreatment::Ivf),
        "icsi" => Some(FertilityTreatment::Icsi),
        "fet" => Some(FertilityTreatment::Fet),
        _ => None,
    }
}

pub(crate) fn case_status_to_string(status: CaseStatus) -> &'static str {
    match status {
        CaseStatus::Active => "active",
        CaseStatus::OnHold => "on_hold",
        CaseStatus::Completed => "completed",
        CaseStatus::Closed => "closed",
    }
}

pub(crate) fn string_to_case_status(s: &str) -> Option<CaseStatus> {
    match s {
        "active" => Some(CaseStatus::Active),
        "on_hold" => Some(CaseStatus::OnHold),
        "completed" => Some(CaseStatus::Completed),
        "closed" => Some(CaseStatus::Closed),
        _ => None,
    }
}
