use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::error;

use leaveflow_core::domain::leave::LeaveRequestId;
use leaveflow_core::effects::{EffectFailure, EffectFailureSink};

use super::{parse_timestamp, EffectFailureRepository, RepositoryError};
use crate::DbPool;

/// Persists captured post-commit failures next to the request they belong to.
#[derive(Clone)]
pub struct SqlEffectFailureSink {
    pool: DbPool,
}

impl SqlEffectFailureSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, failure: &EffectFailure) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO effect_failure (leave_request_id, effect, message, occurred_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&failure.request_id.0)
        .bind(&failure.effect)
        .bind(&failure.message)
        .bind(failure.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EffectFailureSink for SqlEffectFailureSink {
    async fn record(&self, failure: EffectFailure) {
        if let Err(storage_error) = self.insert(&failure).await {
            error!(
                event_name = "effect.failure_not_recorded",
                request_id = %failure.request_id.0,
                effect = %failure.effect,
                error = %storage_error,
                "could not persist effect failure"
            );
        }
    }
}

#[async_trait]
impl EffectFailureRepository for SqlEffectFailureSink {
    async fn list_for_request(
        &self,
        id: &LeaveRequestId,
    ) -> Result<Vec<EffectFailure>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT leave_request_id, effect, message, occurred_at
             FROM effect_failure
             WHERE leave_request_id = ?
             ORDER BY id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(failure_from_row).collect()
    }
}

fn failure_from_row(row: SqliteRow) -> Result<EffectFailure, RepositoryError> {
    Ok(EffectFailure {
        request_id: LeaveRequestId(row.try_get("leave_request_id")?),
        effect: row.try_get("effect")?,
        message: row.try_get("message")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use leaveflow_core::domain::leave::LeaveRequestId;
    use leaveflow_core::effects::{
        DocumentStage, EffectFailure, EffectFailureSink, EffectKind,
    };

    use super::SqlEffectFailureSink;
    use crate::repositories::EffectFailureRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn failure_for_unknown_request_is_swallowed() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        let sink = SqlEffectFailureSink::new(pool);
        let id = LeaveRequestId("LV-missing".to_owned());

        sink.record(EffectFailure::new(
            id.clone(),
            EffectKind::Document(DocumentStage::Final),
            "renderer unavailable",
        ))
        .await;

        assert!(sink.list_for_request(&id).await.expect("list").is_empty());
    }
}
