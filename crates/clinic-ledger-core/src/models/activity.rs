//! Activity log entries (audit trail rows).

use serde::{Deserialize, Serialize};

/// What an actor did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Create,
    Update,
    Deactivate,
    StatusChange,
    PostCharge,
    VoidCharge,
    RecordPayment,
    Allocate,
    Refund,
    OpenShift,
    CashMovement,
    CloseShift,
}

impl ActivityAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityAction::Create => "create",
            ActivityAction::Update => "update",
            ActivityAction::Deactivate => "deactivate",
            ActivityAction::StatusChange => "status_change",
            ActivityAction::PostCharge => "post_charge",
            ActivityAction::VoidCharge => "void_charge",
            ActivityAction::RecordPayment => "record_payment",
            ActivityAction::Allocate => "allocate",
            ActivityAction::Refund => "refund",
            ActivityAction::OpenShift => "open_shift",
            ActivityAction::CashMovement => "cash_movement",
            ActivityAction::CloseShift => "close_shift",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ActivityAction::Create),
            "update" => Some(ActivityAction::Update),
            "deactivate" => Some(ActivityAction::Deactivate),
            "status_change" => Some(ActivityAction::StatusChange),
            "post_charge" => Some(ActivityAction::PostCharge),
            "void_charge" => Some(ActivityAction::VoidCharge),
            "record_payment" => Some(ActivityAction::RecordPayment),
            "allocate" => Some(ActivityAction::Allocate),
            "refund" => Some(ActivityAction::Refund),
            "open_shift" => Some(ActivityAction::OpenShift),
            "cash_movement" => Some(ActivityAction::CashMovement),
            "close_shift" => Some(ActivityAction::CloseShift),
            _ => None,
        }
    }
}

/// One audit trail row: who did what to which record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    pub entry_id: String,
    /// Acting user ID
    pub actor_id: String,
    pub action: ActivityAction,
    /// Table-level entity name, e.g. "patient", "shift"
    pub entity_type: String,
    pub entity_id: String,
    /// Free-form structured context
    pub details: serde_json::Value,
    pub recorded_at: String,
    /// Audit tree leaf; empty until committed
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub leaf_hash: String,
}

impl ActivityEntry {
    pub fn new(
        actor_id: &str,
        action: ActivityAction,
        entity_type: &str,
        entity_id: &str,
        details: serde_json::Value,
    ) -> Self {
        Self {
            entry_id: super::new_id(),
            actor_id: actor_id.to_string(),
            action,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            details,
            recorded_at: super::now_timestamp(),
            leaf_hash: String::new(),
        }
    }

    /// Serialize for hashing. The leaf hash itself is excluded.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        let mut unhashed = self.clone();
        unhashed.leaf_hash.clear();
        serde_json::to_string(&unhashed)
    }
}
