use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leaveflow_core::domain::approval::{
    ApprovalDecision, ApprovalRecord, ApprovalRecordId, ApproverRole,
};
use leaveflow_core::domain::leave::{EmployeeId, LeaveRequestId};

use super::{parse_timestamp, parse_u8, ApprovalRecordRepository, RepositoryError};
use crate::DbPool;

pub struct SqlApprovalRecordRepository {
    pool: DbPool,
}

impl SqlApprovalRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ApprovalRecordRepository for SqlApprovalRecordRepository {
    async fn list_for_request(
        &self,
        id: &LeaveRequestId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        list_for_request(&mut conn, id).await
    }
}

/// Appends an approval. A second record for the same request and level is
/// refused by the schema and surfaces as a unique violation.
pub async fn insert(
    conn: &mut SqliteConnection,
    record: &ApprovalRecord,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO approval_record (
            id, leave_request_id, level, approver_id, approver_name, approver_role,
            decision, notes, signature, decided_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id.0)
    .bind(&record.leave_request_id.0)
    .bind(i64::from(record.level))
    .bind(&record.approver_id.0)
    .bind(&record.approver_name)
    .bind(record.approver_role.as_str())
    .bind(record.decision.as_str())
    .bind(record.notes.as_deref())
    .bind(&record.signature)
    .bind(record.decided_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn list_for_request(
    conn: &mut SqliteConnection,
    id: &LeaveRequestId,
) -> Result<Vec<ApprovalRecord>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, leave_request_id, level, approver_id, approver_name, approver_role,
                decision, notes, signature, decided_at
         FROM approval_record
         WHERE leave_request_id = ?
         ORDER BY level ASC",
    )
    .bind(&id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(approval_record_from_row).collect()
}

fn approval_record_from_row(row: SqliteRow) -> Result<ApprovalRecord, RepositoryError> {
    let role_raw = row.try_get::<String, _>("approver_role")?;
    let approver_role = ApproverRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approver role `{role_raw}`")))?;
    let decision_raw = row.try_get::<String, _>("decision")?;
    let decision = ApprovalDecision::parse(&decision_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown approval decision `{decision_raw}`"))
    })?;

    Ok(ApprovalRecord {
        id: ApprovalRecordId(row.try_get("id")?),
        leave_request_id: LeaveRequestId(row.try_get("leave_request_id")?),
        level: parse_u8("level", row.try_get("level")?)?,
        approver_id: EmployeeId(row.try_get("approver_id")?),
        approver_name: row.try_get("approver_name")?,
        approver_role,
        decision,
        notes: row.try_get("notes")?,
        signature: row.try_get("signature")?,
        decided_at: parse_timestamp("decided_at", row.try_get("decided_at")?)?,
    })
}
