use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::leave::{EmployeeId, LeaveRequestId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalRecordId(pub String);

/// Rejections update the request directly, so a record only ever holds an approval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Some(Self::Approved),
            _ => None,
        }
    }
}

/// Approval layer a decision was taken at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    Manager,
    Hrd,
}

impl ApproverRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Hrd => "hrd",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manager" => Some(Self::Manager),
            "hrd" => Some(Self::Hrd),
            _ => None,
        }
    }
}

/// One approval taken at one level. Append-only history of a leave request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: ApprovalRecordId,
    pub leave_request_id: LeaveRequestId,
    pub level: u8,
    pub approver_id: EmployeeId,
    pub approver_name: String,
    pub approver_role: ApproverRole,
    pub decision: ApprovalDecision,
    pub notes: Option<String>,
    pub signature: String,
    pub decided_at: DateTime<Utc>,
}
