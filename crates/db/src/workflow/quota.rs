use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use leaveflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use leaveflow_core::domain::leave::EmployeeId;
use leaveflow_core::errors::{DomainError, WorkflowError};
use leaveflow_core::ledger::{QuotaAdjustment, QuotaBalance, QuotaOperation};

use super::{storage, LeaveWorkflow};
use crate::repositories::quota_ledger;

impl LeaveWorkflow {
    /// Resizes an employee's yearly total and records who did it and why.
    ///
    /// Refused when the new total would drop below the days already used or
    /// pending for that year.
    pub async fn adjust_quota(
        &self,
        employee_id: &EmployeeId,
        year: i32,
        new_total: u32,
        justification: &str,
        actor_id: &EmployeeId,
        correlation_id: &str,
    ) -> Result<QuotaBalance, WorkflowError> {
        let result =
            self.adjust_in_transaction(employee_id, year, new_total, justification, actor_id).await;

        match &result {
            Ok((balance, previous_total)) => {
                info!(
                    event_name = "quota.adjusted",
                    employee_id = %employee_id.0,
                    correlation_id = %correlation_id,
                    operation = QuotaOperation::Resize.as_str(),
                    year,
                    previous_total,
                    new_total = balance.total,
                    remaining = balance.remaining,
                    "quota total adjusted"
                );
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        correlation_id,
                        "quota.adjusted",
                        AuditCategory::Quota,
                        actor_id.0.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("employee_id", employee_id.0.clone())
                    .with_metadata("year", year.to_string())
                    .with_metadata("previous_total", previous_total.to_string())
                    .with_metadata("new_total", balance.total.to_string())
                    .with_metadata("justification", justification.trim()),
                );
            }
            Err(error) => {
                warn!(
                    event_name = "quota.adjustment_failed",
                    employee_id = %employee_id.0,
                    correlation_id = %correlation_id,
                    year,
                    new_total,
                    code = error.code(),
                    error = %error,
                    "quota adjustment refused"
                );
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        correlation_id,
                        "quota.adjusted",
                        AuditCategory::Quota,
                        actor_id.0.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("employee_id", employee_id.0.clone())
                    .with_metadata("year", year.to_string())
                    .with_metadata("error", error.to_string()),
                );
            }
        }

        result.map(|(balance, _)| balance)
    }

    async fn adjust_in_transaction(
        &self,
        employee_id: &EmployeeId,
        year: i32,
        new_total: u32,
        justification: &str,
        actor_id: &EmployeeId,
    ) -> Result<(QuotaBalance, u32), WorkflowError> {
        let justification = justification.trim();
        if justification.is_empty() {
            return Err(WorkflowError::Validation(
                "a quota adjustment requires a justification".to_string(),
            ));
        }

        let mut tx = self.begin_write().await?;
        let mut balance =
            quota_ledger::ensure(&mut tx, employee_id, year, self.default_annual_days).await?;
        let previous_total = balance.total;
        balance.resize(new_total).map_err(DomainError::from)?;
        quota_ledger::save(&mut tx, &balance).await?;
        quota_ledger::insert_adjustment(
            &mut tx,
            &QuotaAdjustment {
                id: format!("QA-{}", Uuid::new_v4()),
                employee_id: employee_id.clone(),
                year,
                previous_total,
                new_total,
                justification: justification.to_string(),
                actor_id: actor_id.clone(),
                adjusted_at: Utc::now(),
            },
        )
        .await?;
        tx.commit().await.map_err(storage)?;

        Ok((balance, previous_total))
    }
}
