//! Service charges: billable line items on a patient account.

use serde::{Deserialize, Serialize};

/// What produced a charge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChargeKind {
    Admission,
    Pathology,
    Fertility,
    Consultation,
    Pharmacy,
    Other,
}

impl ChargeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChargeKind::Admission => "admission",
            ChargeKind::Pathology => "pathology",
            ChargeKind::Fertility => "fertility",
            ChargeKind::Consultation => "consultation",
            ChargeKind::Pharmacy => "pharmacy",
            ChargeKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admission" => Some(ChargeKind::Admission),
            "pathology" => Some(ChargeKind::Pathology),
            "fertility" => Some(ChargeKind::Fertility),
            "consultation" => Some(ChargeKind::Consultation),
            "pharmacy" => Some(ChargeKind::Pharmacy),
            "other" => Some(ChargeKind::Other),
            _ => None,
        }
    }
}

/// Source of a charge: kind plus the originating record, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChargeSource {
    pub kind: ChargeKind,
    /// Admission/order/case ID
    pub reference_id: Option<String>,
}

impl ChargeSource {
    pub fn new(kind: ChargeKind, reference_id: Option<String>) -> Self {
        Self { kind, reference_id }
    }
}

/// Settlement status, derived from allocated vs charged amount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChargeStatus {
    Open,
    PartiallyPaid,
    Paid,
    Voided,
}

impl ChargeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChargeStatus::Open => "open",
            ChargeStatus::PartiallyPaid => "partially_paid",
            ChargeStatus::Paid => "paid",
            ChargeStatus::Voided => "voided",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ChargeStatus::Open),
            "partially_paid" => Some(ChargeStatus::PartiallyPaid),
            "paid" => Some(ChargeStatus::Paid),
            "voided" => Some(ChargeStatus::Voided),
            _ => None,
        }
    }
}

/// A billable line item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceCharge {
    pub charge_id: String,
    pub patient_id: String,
    pub source: ChargeSource,
    pub description: String,
    pub amount_cents: i64,
    /// Sum of allocations against this charge
    pub allocated_cents: i64,
    pub status: ChargeStatus,
    /// User who posted the charge
    pub posted_by: String,
    pub charged_at: String,
    pub updated_at: String,
}

impl ServiceCharge {
    /// Create a new open charge.
    pub fn new(
        patient_id: String,
        source: ChargeSource,
        description: String,
        amount_cents: i64,
        posted_by: String,
    ) -> Self {
        let now = super::now_timestamp();
        Self {
            charge_id: super::new_id(),
            patient_id,
            source,
            description,
            amount_cents,
            allocated_cents: 0,
            status: ChargeStatus::Open,
            posted_by,
            charged_at: now.clone(),
            updated_at: now,
        }
    }

    /// Amount still owed. Zero for voided charges.
    pub fn outstanding_cents(&self) -> i64 {
        if self.status == ChargeStatus::Voided {
            return 0;
        }
        (self.amount_cents - self.allocated_cents).max(0)
    }

    /// Status implied by the allocated amount.
    pub fn derived_status(&self) -> ChargeStatus {
        if self.status == ChargeStatus::Voided {
            ChargeStatus::Voided
        } else if self.allocated_cents <= 0 {
            ChargeStatus::Open
        } else if self.allocated_cents < self.amount_cents {
            ChargeStatus::PartiallyPaid
        } else {
            ChargeStatus::Paid
        }
    }

    /// Adjust the allocated amount and refresh the status.
    pub fn apply_allocation_delta(&mut self, delta_cents: i64) {
        self.allocated_cents += delta_cents;
        self.status = self.derived_status();
    }

    pub fn is_voided(&self) -> bool {
        self.status == ChargeStatus::Voided
    }
}
