use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::approvals::HrMatch;
use crate::domain::approval::ApproverRole;
use crate::domain::leave::{EmployeeId, LeaveKind, LeaveRequest, LeaveStatus, Rejection, Requester};
use crate::effects::SideEffect;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approve,
    Reject,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// A decision attempt by one actor. `notes` is the approval note or, for a
/// rejection, the mandatory reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub actor_id: EmployeeId,
    pub action: DecisionAction,
    pub notes: Option<String>,
    pub expected_version: Option<u32>,
}

/// What a submission or transition does to the requester's quota ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaEffect {
    None,
    Reserve { days: u32 },
    Settle { days: u32 },
    Release { days: u32 },
}

/// The caller-supplied half of a new request. The first-layer approver is
/// resolved by the caller; only the HR layer is resolved here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveApplication {
    pub requester: Requester,
    pub kind: LeaveKind,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub first_approver_id: Option<EmployeeId>,
}

/// A validated new request plus everything that must happen around its insert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opening {
    pub request: LeaveRequest,
    pub quota: QuotaEffect,
    pub top_level: bool,
    pub hr_match: Option<HrMatch>,
    pub effects: Vec<SideEffect>,
}

/// An approval the caller persists as an `ApprovalRecord` at `level`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStamp {
    pub level: u8,
    pub approver_id: EmployeeId,
    pub approver_role: ApproverRole,
    pub notes: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub action: DecisionAction,
    pub from: LeaveStatus,
    pub to: LeaveStatus,
    pub from_level: u8,
    pub to_level: u8,
    pub next_approver_id: Option<EmployeeId>,
    pub hr_match: Option<HrMatch>,
    pub approval: Option<ApprovalStamp>,
    pub rejection: Option<Rejection>,
    pub quota: QuotaEffect,
    pub effects: Vec<SideEffect>,
    pub decided_at: DateTime<Utc>,
}

impl TransitionOutcome {
    /// The request as it reads after this transition commits.
    pub fn apply_to(&self, current: &LeaveRequest) -> LeaveRequest {
        let mut next = current.clone();
        next.status = self.to;
        next.approval_level = self.to_level;
        next.current_approver_id = self.next_approver_id.clone();
        if self.rejection.is_some() {
            next.rejection = self.rejection.clone();
        }
        next.state_version = current.state_version.saturating_add(1);
        next.updated_at = self.decided_at;
        next
    }

    pub fn is_final(&self) -> bool {
        self.to.is_terminal()
    }
}
