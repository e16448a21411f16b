use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leaveflow_core::domain::leave::EmployeeId;
use leaveflow_core::ledger::{QuotaAdjustment, QuotaBalance};

use super::{parse_i32, parse_timestamp, parse_u32, QuotaLedgerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlQuotaLedgerRepository {
    pool: DbPool,
}

impl SqlQuotaLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QuotaLedgerRepository for SqlQuotaLedgerRepository {
    async fn find(
        &self,
        employee_id: &EmployeeId,
        year: i32,
    ) -> Result<Option<QuotaBalance>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, employee_id, year).await
    }

    async fn list_adjustments(
        &self,
        employee_id: &EmployeeId,
        year: i32,
    ) -> Result<Vec<QuotaAdjustment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, employee_id, year, previous_total, new_total, justification, actor_id,
                    adjusted_at
             FROM quota_adjustment
             WHERE employee_id = ? AND year = ?
             ORDER BY adjusted_at ASC, id ASC",
        )
        .bind(&employee_id.0)
        .bind(i64::from(year))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(adjustment_from_row).collect()
    }

    async fn set_year_allotment(
        &self,
        year: i32,
        default_days: u32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO leave_year_allotment (year, default_days, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(year) DO UPDATE SET
                default_days = excluded.default_days,
                updated_at = excluded.updated_at",
        )
        .bind(i64::from(year))
        .bind(i64::from(default_days))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub async fn find(
    conn: &mut SqliteConnection,
    employee_id: &EmployeeId,
    year: i32,
) -> Result<Option<QuotaBalance>, RepositoryError> {
    let row = sqlx::query(
        "SELECT employee_id, year, total, used, pending, remaining, updated_at
         FROM quota_ledger
         WHERE employee_id = ? AND year = ?",
    )
    .bind(&employee_id.0)
    .bind(i64::from(year))
    .fetch_optional(&mut *conn)
    .await?;

    row.map(balance_from_row).transpose()
}

/// Returns the ledger entry for the year, creating it on first use.
///
/// A new entry starts from the year's configured allotment, or from
/// `fallback_days` when the year has none.
pub async fn ensure(
    conn: &mut SqliteConnection,
    employee_id: &EmployeeId,
    year: i32,
    fallback_days: u32,
) -> Result<QuotaBalance, RepositoryError> {
    if let Some(existing) = find(conn, employee_id, year).await? {
        return Ok(existing);
    }

    let allotment = sqlx::query("SELECT default_days FROM leave_year_allotment WHERE year = ?")
        .bind(i64::from(year))
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| parse_u32("default_days", row.try_get("default_days")?))
        .transpose()?;

    let seeded =
        QuotaBalance::seeded(employee_id.clone(), year, allotment.unwrap_or(fallback_days));
    let timestamp = seeded.updated_at.to_rfc3339();
    sqlx::query(
        "INSERT INTO quota_ledger (
            employee_id, year, total, used, pending, remaining, created_at, updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(employee_id, year) DO NOTHING",
    )
    .bind(&seeded.employee_id.0)
    .bind(i64::from(seeded.year))
    .bind(i64::from(seeded.total))
    .bind(i64::from(seeded.used))
    .bind(i64::from(seeded.pending))
    .bind(i64::from(seeded.remaining))
    .bind(&timestamp)
    .bind(&timestamp)
    .execute(&mut *conn)
    .await?;

    find(conn, employee_id, year).await?.ok_or_else(|| {
        RepositoryError::Decode(format!(
            "quota ledger entry for {} in {year} vanished after insert",
            employee_id.0
        ))
    })
}

pub async fn save(
    conn: &mut SqliteConnection,
    balance: &QuotaBalance,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE quota_ledger
         SET total = ?, used = ?, pending = ?, remaining = ?, updated_at = ?
         WHERE employee_id = ? AND year = ?",
    )
    .bind(i64::from(balance.total))
    .bind(i64::from(balance.used))
    .bind(i64::from(balance.pending))
    .bind(i64::from(balance.remaining))
    .bind(balance.updated_at.to_rfc3339())
    .bind(&balance.employee_id.0)
    .bind(i64::from(balance.year))
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Decode(format!(
            "no quota ledger entry for {} in {}",
            balance.employee_id.0, balance.year
        )));
    }
    Ok(())
}

pub async fn insert_adjustment(
    conn: &mut SqliteConnection,
    adjustment: &QuotaAdjustment,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO quota_adjustment (
            id, employee_id, year, previous_total, new_total, justification, actor_id,
            adjusted_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&adjustment.id)
    .bind(&adjustment.employee_id.0)
    .bind(i64::from(adjustment.year))
    .bind(i64::from(adjustment.previous_total))
    .bind(i64::from(adjustment.new_total))
    .bind(&adjustment.justification)
    .bind(&adjustment.actor_id.0)
    .bind(adjustment.adjusted_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn balance_from_row(row: SqliteRow) -> Result<QuotaBalance, RepositoryError> {
    Ok(QuotaBalance {
        employee_id: EmployeeId(row.try_get("employee_id")?),
        year: parse_i32("year", row.try_get("year")?)?,
        total: parse_u32("total", row.try_get("total")?)?,
        used: parse_u32("used", row.try_get("used")?)?,
        pending: parse_u32("pending", row.try_get("pending")?)?,
        remaining: parse_u32("remaining", row.try_get("remaining")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn adjustment_from_row(row: SqliteRow) -> Result<QuotaAdjustment, RepositoryError> {
    Ok(QuotaAdjustment {
        id: row.try_get("id")?,
        employee_id: EmployeeId(row.try_get("employee_id")?),
        year: parse_i32("year", row.try_get("year")?)?,
        previous_total: parse_u32("previous_total", row.try_get("previous_total")?)?,
        new_total: parse_u32("new_total", row.try_get("new_total")?)?,
        justification: row.try_get("justification")?,
        actor_id: EmployeeId(row.try_get("actor_id")?),
        adjusted_at: parse_timestamp("adjusted_at", row.try_get("adjusted_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use leaveflow_core::domain::leave::EmployeeId;

    use super::{ensure, find, save, SqlQuotaLedgerRepository};
    use crate::repositories::QuotaLedgerRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    #[tokio::test]
    async fn ensure_seeds_from_year_allotment_before_fallback() {
        let pool = setup_pool().await;
        SqlQuotaLedgerRepository::new(pool.clone())
            .set_year_allotment(2026, 14)
            .await
            .expect("set allotment");

        let mut conn = pool.acquire().await.expect("acquire");
        let employee = EmployeeId("E-1".to_owned());
        let configured = ensure(&mut conn, &employee, 2026, 12).await.expect("ensure 2026");
        let fallback = ensure(&mut conn, &employee, 2027, 12).await.expect("ensure 2027");

        assert_eq!((configured.total, configured.remaining), (14, 14));
        assert_eq!((fallback.total, fallback.remaining), (12, 12));
    }

    #[tokio::test]
    async fn ensure_returns_existing_entry_untouched() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.expect("acquire");
        let employee = EmployeeId("E-2".to_owned());

        let mut balance = ensure(&mut conn, &employee, 2026, 12).await.expect("ensure");
        balance.reserve(4).expect("reserve");
        save(&mut conn, &balance).await.expect("save");

        let again = ensure(&mut conn, &employee, 2026, 20).await.expect("ensure again");
        assert_eq!((again.total, again.pending, again.remaining), (12, 4, 8));
        assert!(again.is_balanced());
        assert_eq!(find(&mut conn, &employee, 2025).await.expect("find"), None);
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
