use serde::{Deserialize, Serialize};

use crate::domain::leave::EmployeeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeAccount {
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub status: AccountStatus,
}

/// First-layer mapping: who approves requests from a division.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionApprover {
    pub division_code: String,
    pub approver_id: EmployeeId,
    pub active: bool,
}

/// An entry in the HR approver pool.
///
/// `division_code` is the entry's affinity; `is_generic` marks an entry that
/// serves any division without an affinity of its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrApproverEntry {
    pub id: String,
    pub employee_id: EmployeeId,
    pub division_code: Option<String>,
    pub is_generic: bool,
    pub active: bool,
}
