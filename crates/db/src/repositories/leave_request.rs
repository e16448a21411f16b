use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leaveflow_core::domain::leave::{
    DocumentRefs, EmployeeId, LeaveKind, LeavePeriod, LeaveRequest, LeaveRequestId, LeaveStatus,
    Rejection, Requester,
};
use leaveflow_core::effects::DocumentStage;

use super::{
    parse_date, parse_optional_timestamp, parse_timestamp, parse_u32, parse_u8,
    LeaveRequestRepository, RepositoryError, DATE_FORMAT,
};
use crate::DbPool;

const LEAVE_REQUEST_COLUMNS: &str = "id, employee_id, employee_name, role_id, role_name,
    division_code, kind, start_date, end_date, duration_days, description, status,
    approval_level, max_approval_level, current_approver_id, rejection_reason, rejected_by,
    rejected_at, submission_document, level1_document, final_document, state_version,
    submitted_at, updated_at";

pub struct SqlLeaveRequestRepository {
    pool: DbPool,
}

impl SqlLeaveRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LeaveRequestRepository for SqlLeaveRequestRepository {
    async fn find_by_id(
        &self,
        id: &LeaveRequestId,
    ) -> Result<Option<LeaveRequest>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, id).await
    }

    async fn list_awaiting(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<LeaveRequest>, RepositoryError> {
        let query = format!(
            "SELECT {LEAVE_REQUEST_COLUMNS}
             FROM leave_request
             WHERE current_approver_id = ?
             ORDER BY submitted_at ASC, id ASC"
        );
        let rows = sqlx::query(&query).bind(&approver_id.0).fetch_all(&self.pool).await?;

        rows.into_iter().map(leave_request_from_row).collect()
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<LeaveRequest>, RepositoryError> {
        let query = format!(
            "SELECT {LEAVE_REQUEST_COLUMNS}
             FROM leave_request
             WHERE employee_id = ?
             ORDER BY submitted_at DESC, id ASC"
        );
        let rows = sqlx::query(&query).bind(&employee_id.0).fetch_all(&self.pool).await?;

        rows.into_iter().map(leave_request_from_row).collect()
    }
}

pub async fn find(
    conn: &mut SqliteConnection,
    id: &LeaveRequestId,
) -> Result<Option<LeaveRequest>, RepositoryError> {
    let query = format!("SELECT {LEAVE_REQUEST_COLUMNS} FROM leave_request WHERE id = ?");
    let row = sqlx::query(&query).bind(&id.0).fetch_optional(&mut *conn).await?;

    row.map(leave_request_from_row).transpose()
}

pub async fn insert(
    conn: &mut SqliteConnection,
    request: &LeaveRequest,
) -> Result<(), RepositoryError> {
    let rejection = request.rejection.as_ref();

    sqlx::query(
        "INSERT INTO leave_request (
            id, employee_id, employee_name, role_id, role_name, division_code, kind,
            start_date, end_date, duration_days, description, status, approval_level,
            max_approval_level, current_approver_id, rejection_reason, rejected_by, rejected_at,
            submission_document, level1_document, final_document, state_version,
            submitted_at, updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&request.id.0)
    .bind(&request.requester.employee_id.0)
    .bind(&request.requester.full_name)
    .bind(&request.requester.role_id)
    .bind(&request.requester.role_name)
    .bind(&request.requester.division_code)
    .bind(request.kind.as_str())
    .bind(request.period.start.format(DATE_FORMAT).to_string())
    .bind(request.period.end.format(DATE_FORMAT).to_string())
    .bind(i64::from(request.duration_days))
    .bind(request.description.as_deref())
    .bind(request.status.as_str())
    .bind(i64::from(request.approval_level))
    .bind(i64::from(request.max_approval_level))
    .bind(request.current_approver_id.as_ref().map(|id| id.0.as_str()))
    .bind(rejection.map(|rejection| rejection.reason.as_str()))
    .bind(rejection.map(|rejection| rejection.rejected_by.0.as_str()))
    .bind(rejection.map(|rejection| rejection.rejected_at.to_rfc3339()))
    .bind(request.documents.submission.as_deref())
    .bind(request.documents.level1.as_deref())
    .bind(request.documents.final_document.as_deref())
    .bind(i64::from(request.state_version))
    .bind(request.submitted_at.to_rfc3339())
    .bind(request.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Moves `current` to `next` only if the stored row still reads as `current`.
///
/// Returns `false` when another decision got there first; the caller must
/// treat that as a lost race and roll back.
pub async fn apply_transition(
    conn: &mut SqliteConnection,
    current: &LeaveRequest,
    next: &LeaveRequest,
) -> Result<bool, RepositoryError> {
    let rejection = next.rejection.as_ref();

    let result = sqlx::query(
        "UPDATE leave_request
         SET status = ?,
             approval_level = ?,
             current_approver_id = ?,
             rejection_reason = ?,
             rejected_by = ?,
             rejected_at = ?,
             state_version = ?,
             updated_at = ?
         WHERE id = ?
           AND status = ?
           AND approval_level = ?
           AND state_version = ?
           AND current_approver_id IS ?",
    )
    .bind(next.status.as_str())
    .bind(i64::from(next.approval_level))
    .bind(next.current_approver_id.as_ref().map(|id| id.0.as_str()))
    .bind(rejection.map(|rejection| rejection.reason.as_str()))
    .bind(rejection.map(|rejection| rejection.rejected_by.0.as_str()))
    .bind(rejection.map(|rejection| rejection.rejected_at.to_rfc3339()))
    .bind(i64::from(next.state_version))
    .bind(next.updated_at.to_rfc3339())
    .bind(&current.id.0)
    .bind(current.status.as_str())
    .bind(i64::from(current.approval_level))
    .bind(i64::from(current.state_version))
    .bind(current.current_approver_id.as_ref().map(|id| id.0.as_str()))
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Records where a generated document landed. Runs after the decision has
/// committed, so it never touches status or version.
pub async fn set_document(
    conn: &mut SqliteConnection,
    id: &LeaveRequestId,
    stage: DocumentStage,
    reference: &str,
) -> Result<bool, RepositoryError> {
    let query = match stage {
        DocumentStage::Submission => {
            "UPDATE leave_request SET submission_document = ? WHERE id = ?"
        }
        DocumentStage::Level1 => "UPDATE leave_request SET level1_document = ? WHERE id = ?",
        DocumentStage::Final => "UPDATE leave_request SET final_document = ? WHERE id = ?",
    };

    let result = sqlx::query(query).bind(reference).bind(&id.0).execute(&mut *conn).await?;
    Ok(result.rows_affected() == 1)
}

fn leave_request_from_row(row: SqliteRow) -> Result<LeaveRequest, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = LeaveKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown leave kind `{kind_raw}`")))?;
    let status_raw = row.try_get::<String, _>("status")?;
    let status = LeaveStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown leave status `{status_raw}`")))?;

    let start = parse_date("start_date", row.try_get("start_date")?)?;
    let end = parse_date("end_date", row.try_get("end_date")?)?;
    let period = LeavePeriod::range(start, end).ok_or_else(|| {
        RepositoryError::Decode(format!("end_date {end} precedes start_date {start}"))
    })?;

    let rejection = match (
        row.try_get::<Option<String>, _>("rejection_reason")?,
        row.try_get::<Option<String>, _>("rejected_by")?,
        parse_optional_timestamp("rejected_at", row.try_get("rejected_at")?)?,
    ) {
        (Some(reason), Some(rejected_by), Some(rejected_at)) => {
            Some(Rejection { reason, rejected_by: EmployeeId(rejected_by), rejected_at })
        }
        _ => None,
    };

    Ok(LeaveRequest {
        id: LeaveRequestId(row.try_get("id")?),
        requester: Requester {
            employee_id: EmployeeId(row.try_get("employee_id")?),
            full_name: row.try_get("employee_name")?,
            role_id: row.try_get("role_id")?,
            role_name: row.try_get("role_name")?,
            division_code: row.try_get("division_code")?,
        },
        kind,
        period,
        duration_days: parse_u32("duration_days", row.try_get("duration_days")?)?,
        description: row.try_get("description")?,
        status,
        approval_level: parse_u8("approval_level", row.try_get("approval_level")?)?,
        max_approval_level: parse_u8("max_approval_level", row.try_get("max_approval_level")?)?,
        current_approver_id: row
            .try_get::<Option<String>, _>("current_approver_id")?
            .map(EmployeeId),
        rejection,
        documents: DocumentRefs {
            submission: row.try_get("submission_document")?,
            level1: row.try_get("level1_document")?,
            final_document: row.try_get("final_document")?,
        },
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        submitted_at: parse_timestamp("submitted_at", row.try_get("submitted_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
