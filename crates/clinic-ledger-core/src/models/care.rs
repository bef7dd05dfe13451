//! Clinical episodes that generate charges: admissions, pathology orders and
//! fertility cases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inpatient admission status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AdmissionStatus {
    Admitted,
    Discharged,
    Cancelled,
}

/// An inpatient stay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Admission {
    pub admission_id: String,
    pub patient_id: String,
    pub ward: String,
    pub bed: Option<String>,
    /// Attending doctor (user ID)
    pub attending_id: Option<String>,
    pub reason: Option<String>,
    /// Room rate charged per started day, in cents
    pub daily_rate_cents: i64,
    pub status: AdmissionStatus,
    pub admitted_at: String,
    pub discharged_at: Option<String>,
    /// Room charge posted on discharge
    pub charge_id: Option<String>,
}

impl Admission {
    /// Create a new admission starting now.
    pub fn new(patient_id: String, ward: String, daily_rate_cents: i64) -> Self {
        Self {
            admission_id: super::new_id(),
            patient_id,
            ward,
            bed: None,
            attending_id: None,
            reason: None,
            daily_rate_cents,
            status: AdmissionStatus::Admitted,
            admitted_at: super::now_timestamp(),
            discharged_at: None,
            charge_id: None,
        }
    }

    /// Started days between admission and `until`; every started day counts
    /// and a same-day stay bills one day.
    pub fn billable_days(&self, until: DateTime<Utc>) -> Result<i64, chrono::ParseError> {
        let admitted = super::parse_timestamp(&self.admitted_at)?;
        let minutes = (until - admitted).num_minutes().max(0);
        let days = (minutes + 24 * 60 - 1) / (24 * 60);
        Ok(days.max(1))
    }
}

/// Pathology order urgency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Priority {
    Routine,
    Urgent,
    Stat,
}

/// Pathology order lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PathologyStatus {
    Ordered,
    SampleCollected,
    InProgress,
    Completed,
    Cancelled,
}

impl PathologyStatus {
    /// The next status in the forward workflow, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            PathologyStatus::Ordered => Some(PathologyStatus::SampleCollected),
            PathologyStatus::SampleCollected => Some(PathologyStatus::InProgress),
            PathologyStatus::InProgress => Some(PathologyStatus::Completed),
            PathologyStatus::Completed | PathologyStatus::Cancelled => None,
        }
    }

    /// Cancellation is only possible before the lab starts processing.
    pub fn can_cancel(self) -> bool {
        matches!(
            self,
            PathologyStatus::Ordered | PathologyStatus::SampleCollected
        )
    }
}

/// A laboratory test order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathologyOrder {
    pub order_id: String,
    pub patient_id: String,
    /// Set when ordered during an inpatient stay
    pub admission_id: Option<String>,
    pub test_code: String,
    pub test_name: String,
    pub priority: Priority,
    pub status: PathologyStatus,
    pub price_cents: i64,
    pub ordered_by: String,
    pub result: Option<String>,
    pub charge_id: Option<String>,
    pub ordered_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl PathologyOrder {
    /// Create a new routine order.
    pub fn new(
        patient_id: String,
        test_code: String,
        test_name: String,
        price_cents: i64,
        ordered_by: String,
    ) -> Self {
        let now = super::now_timestamp();
        Self {
            order_id: super::new_id(),
            patient_id,
            admission_id: None,
            test_code,
            test_name,
            priority: Priority::Routine,
            status: PathologyStatus::Ordered,
            price_cents,
            ordered_by,
            result: None,
            charge_id: None,
            ordered_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Assisted reproduction treatment type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FertilityTreatment {
    Consultation,
    /// Intrauterine insemination
    Iui,
    /// In vitro fertilisation
    Ivf,
    /// Intracytoplasmic sperm injection
    Icsi,
    /// Frozen embryo transfer
    Fet,
}

/// Fertility case status. `Closed` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CaseStatus {
    Active,
    OnHold,
    Completed,
    Closed,
}

/// An infertility-clinic case spanning one or more treatment cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FertilityCase {
    pub case_id: String,
    pub patient_id: String,
    pub partner_name: Option<String>,
    pub treatment: FertilityTreatment,
    /// Starts at 1, incremented per new cycle
    pub cycle_number: u32,
    pub status: CaseStatus,
    pub consultant_id: Option<String>,
    pub notes: Option<String>,
    pub opened_at: String,
    pub updated_at: String,
}

impl FertilityCase {
    /// Open a new case on its first cycle.
    pub fn new(patient_id: String, treatment: FertilityTreatment) -> Self {
        let now = super::now_timestamp();
        Self {
            case_id: super::new_id(),
            patient_id,
            partner_name: None,
            treatment,
            cycle_number: 1,
            status: CaseStatus::Active,
            consultant_id: None,
            notes: None,
            opened_at: now.clone(),
            updated_at: now,
        }
    }

    /// Closed cases take no procedures or cycles.
    pub fn is_closed(&self) -> bool {
        self.status == CaseStatus::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_timestamp;

    fn admission_at(admitted_at: &str) -> Admission {
        let mut admission = Admission::new("patient-1".into(), "Ward A".into(), 5_000);
        admission.admitted_at = admitted_at.into();
        admission
    }

    #[test]
    fn test_billable_days_same_day() {
        let admission = admission_at("2024-03-01T08:00:00.000Z");
        let until = parse_timestamp("2024-03-01T15:00:00.000Z").unwrap();
        assert_eq!(admission.billable_days(until).unwrap(), 1);
    }

    #[test]
    fn test_billable_days_started_day_counts() {
        let admission = admission_at("2024-03-01T08:00:00.000Z");
        let exact = parse_timestamp("2024-03-03T08:00:00.000Z").unwrap();
        assert_eq!(admission.billable_days(exact).unwrap(), 2);

        let one_minute_over = parse_timestamp("2024-03-03T08:01:00.000Z").unwrap();
        assert_eq!(admission.billable_days(one_minute_over).unwrap(), 3);
    }

    #[test]
    fn test_billable_days_clock_skew() {
        let admission = admission_at("2024-03-01T08:00:00.000Z");
        let before = parse_timestamp("2024-03-01T07:00:00.000Z").unwrap();
        assert_eq!(admission.billable_days(before).unwrap(), 1);
    }

    #[test]
    fn test_pathology_workflow() {
        let mut status = PathologyStatus::Ordered;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            status = next;
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                PathologyStatus::Ordered,
                PathologyStatus::SampleCollected,
                PathologyStatus::InProgress,
                PathologyStatus::Completed,
            ]
        );
        assert!(PathologyStatus::SampleCollected.can_cancel());
        assert!(!PathologyStatus::InProgress.can_cancel());
    }

    #[test]
    fn test_new_fertility_case() {
        let case = FertilityCase::new("patient-1".into(), FertilityTreatment::Ivf);
        assert_eq!(case.cycle_number, 1);
        assert_eq!(case.status, CaseStatus::Active);
        assert!(!case.is_closed());
    }
}
