//! Staff users and role permissions.

use serde::{Deserialize, Serialize};

/// Staff role. Each user has exactly one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Cashier,
    Doctor,
    Nurse,
    LabTechnician,
    Receptionist,
}

/// Something a role may be allowed to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageUsers,
    ManagePatients,
    ManageAdmissions,
    ManagePathology,
    ManageFertility,
    PostCharges,
    VoidCharges,
    CollectPayments,
    IssueRefunds,
    OperateShift,
    SuperviseShifts,
    ViewReports,
    ViewAuditLog,
}

impl Role {
    /// Whether this role grants the permission.
    pub fn allows(self, permission: Permission) -> bool {
        use Permission::*;
        match self {
            Role::Admin => true,
            Role::Manager => !matches!(permission, ManageUsers),
            Role::Cashier => matches!(
                permission,
                ManagePatients | PostCharges | CollectPayments | IssueRefunds | OperateShift
                    | ViewReports
            ),
            Role::Doctor => matches!(
                permission,
                ManagePatients | ManageAdmissions | ManagePathology | ManageFertility | PostCharges
            ),
            Role::Nurse => matches!(permission, ManagePatients | ManageAdmissions),
            Role::LabTechnician => matches!(permission, ManagePathology),
            Role::Receptionist => matches!(
                permission,
                ManagePatients | ManageAdmissions | CollectPayments | OperateShift
            ),
        }
    }

    /// Stored/display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Cashier => "cashier",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::LabTechnician => "lab_technician",
            Role::Receptionist => "receptionist",
        }
    }

    /// Parse a stored role name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "cashier" => Some(Role::Cashier),
            "doctor" => Some(Role::Doctor),
            "nurse" => Some(Role::Nurse),
            "lab_technician" => Some(Role::LabTechnician),
            "receptionist" => Some(Role::Receptionist),
            _ => None,
        }
    }

    /// Managers and admins may act on other staff members' shifts.
    pub fn is_supervisor(self) -> bool {
        self.allows(Permission::SuperviseShifts)
    }
}

/// A staff account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: String,
    /// Login name, unique
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Create a new active user.
    pub fn new(username: String, display_name: String, role: Role) -> Self {
        let now = super::now_timestamp();
        Self {
            user_id: super::new_id(),
            username,
            display_name,
            role,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Active and granted the permission.
    pub fn can(&self, permission: Permission) -> bool {
        self.active && self.role.allows(permission)
    }
}
