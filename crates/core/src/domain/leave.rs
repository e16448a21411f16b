use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaveRequestId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

/// The kind of absence being requested. Only `Cuti` draws on the yearly quota.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveKind {
    Cuti,
    Sakit,
    Izin,
    DatangTerlambat,
    MeninggalkanPekerjaan,
}

impl LeaveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuti => "cuti",
            Self::Sakit => "sakit",
            Self::Izin => "izin",
            Self::DatangTerlambat => "datang_terlambat",
            Self::MeninggalkanPekerjaan => "meninggalkan_pekerjaan",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cuti" => Some(Self::Cuti),
            "sakit" => Some(Self::Sakit),
            "izin" => Some(Self::Izin),
            "datang_terlambat" => Some(Self::DatangTerlambat),
            "meninggalkan_pekerjaan" => Some(Self::MeninggalkanPekerjaan),
            _ => None,
        }
    }

    pub fn is_quota_bearing(&self) -> bool {
        matches!(self, Self::Cuti)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    WaitingManager,
    WaitingHrd,
    Approved,
    RejectedManager,
    RejectedHrd,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingManager => "waiting_manager",
            Self::WaitingHrd => "waiting_hrd",
            Self::Approved => "approved",
            Self::RejectedManager => "rejected_manager",
            Self::RejectedHrd => "rejected_hrd",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "waiting_manager" => Some(Self::WaitingManager),
            "waiting_hrd" => Some(Self::WaitingHrd),
            "approved" => Some(Self::Approved),
            "rejected_manager" => Some(Self::RejectedManager),
            "rejected_hrd" => Some(Self::RejectedHrd),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::RejectedManager | Self::RejectedHrd)
    }
}

/// Inclusive date range of an absence. Non-`cuti` kinds always use a single day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LeavePeriod {
    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn range(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (end >= start).then_some(Self { start, end })
    }

    /// Whole days covered, counting both ends.
    pub fn days(&self) -> u32 {
        let span = (self.end - self.start).num_days() + 1;
        u32::try_from(span).unwrap_or(u32::MAX)
    }

    /// Calendar year the quota is charged to.
    pub fn quota_year(&self) -> i32 {
        self.start.year()
    }
}

/// Who filed the request, captured at submission time so later role or
/// division changes never alter an in-flight request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub role_id: String,
    pub role_name: String,
    pub division_code: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRefs {
    pub submission: Option<String>,
    pub level1: Option<String>,
    pub final_document: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: String,
    pub rejected_by: EmployeeId,
    pub rejected_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: LeaveRequestId,
    pub requester: Requester,
    pub kind: LeaveKind,
    pub period: LeavePeriod,
    pub duration_days: u32,
    pub description: Option<String>,
    pub status: LeaveStatus,
    pub approval_level: u8,
    pub max_approval_level: u8,
    pub current_approver_id: Option<EmployeeId>,
    pub rejection: Option<Rejection>,
    pub documents: DocumentRefs,
    pub state_version: u32,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_final_level(&self) -> bool {
        self.approval_level >= self.max_approval_level
    }

    /// Days to reserve, settle or release on the quota ledger.
    pub fn quota_days(&self) -> u32 {
        if self.kind.is_quota_bearing() {
            self.duration_days
        } else {
            0
        }
    }

    pub fn quota_year(&self) -> i32 {
        self.period.quota_year()
    }

    /// Checks the structural invariants every persisted request must satisfy.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.approval_level == 0 {
            return Err("approval_level must be at least 1".to_string());
        }
        if !(1..=2).contains(&self.max_approval_level) {
            return Err(format!("max_approval_level {} is outside 1..=2", self.max_approval_level));
        }
        if self.approval_level > self.max_approval_level {
            return Err(format!(
                "approval_level {} exceeds max_approval_level {}",
                self.approval_level, self.max_approval_level
            ));
        }
        if self.current_approver_id.is_some() == self.status.is_terminal() {
            return Err(format!(
                "status `{}` is inconsistent with current approver presence",
                self.status.as_str()
            ));
        }
        Ok(())
    }
}
