use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "employee_account",
        "division_approver",
        "hr_approver",
        "leave_year_allotment",
        "quota_ledger",
        "quota_adjustment",
        "leave_request",
        "approval_record",
        "effect_failure",
        "idx_hr_approver_division_code",
        "idx_quota_adjustment_employee_year",
        "idx_leave_request_current_approver",
        "idx_leave_request_employee",
        "idx_effect_failure_leave_request",
    ];

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in ["leave_request", "approval_record", "quota_ledger", "hr_approver"] {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .expect("check table")
            .get::<i64, _>("count");

            assert_eq!(count, 1, "table `{table}` should exist");
        }
    }

    #[tokio::test]
    async fn approval_records_are_unique_per_level() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO leave_request (
                id, employee_id, employee_name, role_id, role_name, division_code, kind,
                start_date, end_date, duration_days, status, approval_level,
                max_approval_level, current_approver_id, state_version, submitted_at, updated_at
             ) VALUES ('LV-1', 'E-1', 'Sari', 'R-STAFF', 'Staff', 'D01', 'sakit',
                '2026-03-02', '2026-03-02', 1, 'waiting_manager', 1, 2, 'E-MGR', 1,
                '2026-03-01T08:00:00Z', '2026-03-01T08:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert request");

        let insert_record = |id: &'static str| {
            sqlx::query(
                "INSERT INTO approval_record (
                    id, leave_request_id, level, approver_id, approver_name, approver_role,
                    decision, signature, decided_at
                 ) VALUES (?, 'LV-1', 1, 'E-MGR', 'Budi', 'manager', 'approved', 'sig',
                    '2026-03-01T09:00:00Z')",
            )
            .bind(id)
        };

        insert_record("AR-1").execute(&pool).await.expect("first record");
        let duplicate = insert_record("AR-2").execute(&pool).await;

        assert!(duplicate.is_err(), "second record at the same level must be refused");
    }

    #[tokio::test]
    async fn terminal_requests_cannot_keep_an_approver() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let result = sqlx::query(
            "INSERT INTO leave_request (
                id, employee_id, employee_name, role_id, role_name, division_code, kind,
                start_date, end_date, duration_days, status, approval_level,
                max_approval_level, current_approver_id, state_version, submitted_at, updated_at
             ) VALUES ('LV-2', 'E-1', 'Sari', 'R-STAFF', 'Staff', 'D01', 'izin',
                '2026-03-02', '2026-03-02', 1, 'approved', 2, 2, 'E-HR', 3,
                '2026-03-01T08:00:00Z', '2026-03-01T08:00:00Z')",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let leave_count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = 'leave_request'",
        )
        .fetch_one(&pool)
        .await
        .expect("check leave_request table removed")
        .get::<i64, _>("count");

        assert_eq!(leave_count, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
