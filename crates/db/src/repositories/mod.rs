use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use leaveflow_core::approvals::HrCandidate;
use leaveflow_core::domain::approval::ApprovalRecord;
use leaveflow_core::domain::directory::{DivisionApprover, EmployeeAccount, HrApproverEntry};
use leaveflow_core::domain::leave::{EmployeeId, LeaveRequest, LeaveRequestId};
use leaveflow_core::effects::EffectFailure;
use leaveflow_core::ledger::{QuotaAdjustment, QuotaBalance};

pub mod approval_record;
pub mod directory;
pub mod effect_failure;
pub mod leave_request;
pub mod quota_ledger;

pub use approval_record::SqlApprovalRecordRepository;
pub use directory::SqlApproverDirectory;
pub use effect_failure::SqlEffectFailureSink;
pub use leave_request::SqlLeaveRequestRepository;
pub use quota_ledger::SqlQuotaLedgerRepository;

/// Primary result code for `SQLITE_BUSY`; extended codes share the low byte.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    /// True when another connection held the write lock long enough for this
    /// statement to give up.
    pub fn is_contention(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(error)) => error
                .code()
                .and_then(|code| code.parse::<i64>().ok())
                .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
                .unwrap_or(false),
            Self::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Database(sqlx::Error::Database(error)) if error.is_unique_violation())
    }
}

#[async_trait]
pub trait LeaveRequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &LeaveRequestId)
        -> Result<Option<LeaveRequest>, RepositoryError>;

    /// Non-terminal requests whose current approver is `approver_id`, oldest first.
    async fn list_awaiting(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<LeaveRequest>, RepositoryError>;

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<LeaveRequest>, RepositoryError>;
}

#[async_trait]
pub trait ApprovalRecordRepository: Send + Sync {
    async fn list_for_request(
        &self,
        id: &LeaveRequestId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError>;
}

#[async_trait]
pub trait QuotaLedgerRepository: Send + Sync {
    async fn find(
        &self,
        employee_id: &EmployeeId,
        year: i32,
    ) -> Result<Option<QuotaBalance>, RepositoryError>;

    async fn list_adjustments(
        &self,
        employee_id: &EmployeeId,
        year: i32,
    ) -> Result<Vec<QuotaAdjustment>, RepositoryError>;

    /// Sets the days newly created ledger entries for `year` start with.
    async fn set_year_allotment(&self, year: i32, default_days: u32)
        -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ApproverDirectory: Send + Sync {
    async fn save_employee(&self, account: EmployeeAccount) -> Result<(), RepositoryError>;

    async fn find_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Option<EmployeeAccount>, RepositoryError>;

    async fn save_division_approver(
        &self,
        approver: DivisionApprover,
    ) -> Result<(), RepositoryError>;

    /// The active first-layer approver for a division, if their account is active.
    async fn manager_for_division(
        &self,
        division_code: &str,
    ) -> Result<Option<EmployeeId>, RepositoryError>;

    async fn save_hr_approver(&self, entry: HrApproverEntry) -> Result<(), RepositoryError>;

    async fn hr_candidates(&self) -> Result<Vec<HrCandidate>, RepositoryError>;
}

#[async_trait]
pub trait EffectFailureRepository: Send + Sync {
    async fn list_for_request(
        &self,
        id: &LeaveRequestId,
    ) -> Result<Vec<EffectFailure>, RepositoryError>;
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_u8(column: &str, value: i64) -> Result<u8, RepositoryError> {
    u8::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `{column}` (expected u8): {value}"))
    })
}

pub(crate) fn parse_i32(column: &str, value: i64) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `{column}` (expected i32): {value}"))
    })
}

pub(crate) fn parse_bool_flag(column: &str, value: i64) -> Result<bool, RepositoryError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepositoryError::Decode(format!(
            "invalid flag in `{column}`: expected 0 or 1, got {other}"
        ))),
    }
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|value| parse_timestamp(column, value)).transpose()
}

pub(crate) fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

#[cfg(test)]
mod tests {
    use super::{parse_bool_flag, parse_date, parse_u8, RepositoryError};

    #[test]
    fn decoders_reject_out_of_range_values() {
        assert!(matches!(parse_u8("approval_level", 300), Err(RepositoryError::Decode(_))));
        assert!(matches!(parse_bool_flag("active", 2), Err(RepositoryError::Decode(_))));
        assert!(matches!(parse_date("start_date", "03/02/2026".to_owned()), Err(_)));
        let parsed = parse_date("start_date", "2026-03-02".to_owned()).expect("date");
        assert_eq!(parsed.to_string(), "2026-03-02");
    }

    #[test]
    fn decode_errors_are_not_contention() {
        let error = RepositoryError::Decode("bad row".to_owned());
        assert!(!error.is_contention());
        assert!(!error.is_unique_violation());
        assert!(RepositoryError::Database(sqlx::Error::PoolTimedOut).is_contention());
    }
}
