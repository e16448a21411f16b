use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leaveflow_core::approvals::HrCandidate;
use leaveflow_core::domain::directory::{
    AccountStatus, DivisionApprover, EmployeeAccount, HrApproverEntry,
};
use leaveflow_core::domain::leave::EmployeeId;

use super::{parse_bool_flag, ApproverDirectory, RepositoryError};
use crate::DbPool;

/// Employee accounts, first-layer division approvers and the HR approver pool.
pub struct SqlApproverDirectory {
    pool: DbPool,
}

impl SqlApproverDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ApproverDirectory for SqlApproverDirectory {
    async fn save_employee(&self, account: EmployeeAccount) -> Result<(), RepositoryError> {
        let timestamp = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO employee_account (employee_id, full_name, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(employee_id) DO UPDATE SET
                full_name = excluded.full_name,
                status = excluded.status,
                updated_at = excluded.updated_at",
        )
        .bind(&account.employee_id.0)
        .bind(&account.full_name)
        .bind(account.status.as_str())
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Option<EmployeeAccount>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        find_employee(&mut conn, employee_id).await
    }

    async fn save_division_approver(
        &self,
        approver: DivisionApprover,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO division_approver (division_code, approver_id, active, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(division_code) DO UPDATE SET
                approver_id = excluded.approver_id,
                active = excluded.active,
                updated_at = excluded.updated_at",
        )
        .bind(&approver.division_code)
        .bind(&approver.approver_id.0)
        .bind(i64::from(approver.active))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn manager_for_division(
        &self,
        division_code: &str,
    ) -> Result<Option<EmployeeId>, RepositoryError> {
        let row = sqlx::query(
            "SELECT division_approver.approver_id
             FROM division_approver
             JOIN employee_account
               ON employee_account.employee_id = division_approver.approver_id
             WHERE division_approver.division_code = ?
               AND division_approver.active = 1
               AND employee_account.status = 'active'",
        )
        .bind(division_code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.try_get::<String, _>("approver_id").map(EmployeeId))
            .transpose()
            .map_err(RepositoryError::from)
    }

    async fn save_hr_approver(&self, entry: HrApproverEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO hr_approver (id, employee_id, division_code, is_generic, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                employee_id = excluded.employee_id,
                division_code = excluded.division_code,
                is_generic = excluded.is_generic,
                active = excluded.active",
        )
        .bind(&entry.id)
        .bind(&entry.employee_id.0)
        .bind(entry.division_code.as_deref())
        .bind(i64::from(entry.is_generic))
        .bind(i64::from(entry.active))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn hr_candidates(&self) -> Result<Vec<HrCandidate>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_hr_candidates(&mut conn).await
    }
}

pub async fn find_employee(
    conn: &mut SqliteConnection,
    employee_id: &EmployeeId,
) -> Result<Option<EmployeeAccount>, RepositoryError> {
    let row = sqlx::query(
        "SELECT employee_id, full_name, status FROM employee_account WHERE employee_id = ?",
    )
    .bind(&employee_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(account_from_row).transpose()
}

/// Every HR pool entry with its account status. An entry whose employee has
/// no account row reads as inactive.
pub async fn load_hr_candidates(
    conn: &mut SqliteConnection,
) -> Result<Vec<HrCandidate>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT hr_approver.id, hr_approver.employee_id, hr_approver.division_code,
                hr_approver.is_generic, hr_approver.active,
                employee_account.status AS account_status
         FROM hr_approver
         LEFT JOIN employee_account
           ON employee_account.employee_id = hr_approver.employee_id
         ORDER BY hr_approver.id ASC",
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(candidate_from_row).collect()
}

fn account_from_row(row: SqliteRow) -> Result<EmployeeAccount, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = AccountStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown account status `{status_raw}`")))?;

    Ok(EmployeeAccount {
        employee_id: EmployeeId(row.try_get("employee_id")?),
        full_name: row.try_get("full_name")?,
        status,
    })
}

fn candidate_from_row(row: SqliteRow) -> Result<HrCandidate, RepositoryError> {
    let account_status = match row.try_get::<Option<String>, _>("account_status")? {
        Some(raw) => AccountStatus::parse(&raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown account status `{raw}`")))?,
        None => AccountStatus::Inactive,
    };

    Ok(HrCandidate {
        entry: HrApproverEntry {
            id: row.try_get("id")?,
            employee_id: EmployeeId(row.try_get("employee_id")?),
            division_code: row.try_get("division_code")?,
            is_generic: parse_bool_flag("is_generic", row.try_get("is_generic")?)?,
            active: parse_bool_flag("active", row.try_get("active")?)?,
        },
        account_status,
    })
}
