use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use leaveflow_core::approvals::{HrApproverRouter, HrMatch};
use leaveflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use leaveflow_core::domain::directory::AccountStatus;
use leaveflow_core::domain::leave::{LeaveRequest, LeaveRequestId};
use leaveflow_core::effects::NotificationContext;
use leaveflow_core::errors::{DomainError, WorkflowError};
use leaveflow_core::flows::{LeaveApplication, Opening, QuotaEffect};
use leaveflow_core::ledger::QuotaOperation;

use super::{storage, LeaveWorkflow, SubmissionReceipt};
use crate::repositories::{directory, leave_request, quota_ledger};

impl LeaveWorkflow {
    /// Files a new leave request.
    ///
    /// Quota-bearing requests reserve their days in the same transaction that
    /// inserts the request. The submission document and the approver's
    /// notification are dispatched after commit and never fail the call.
    pub async fn submit(
        &self,
        application: LeaveApplication,
        correlation_id: &str,
    ) -> Result<SubmissionReceipt, WorkflowError> {
        let id = LeaveRequestId(format!("LV-{}", Uuid::new_v4()));
        let employee_id = application.requester.employee_id.clone();

        let opening = match self.open_in_transaction(id.clone(), application).await {
            Ok(opening) => opening,
            Err(error) => {
                warn!(
                    event_name = "leave.submission_failed",
                    request_id = %id.0,
                    correlation_id = %correlation_id,
                    employee_id = %employee_id.0,
                    code = error.code(),
                    error = %error,
                    "leave submission refused"
                );
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        correlation_id,
                        "leave.submitted",
                        AuditCategory::Submission,
                        employee_id.0.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("code", error.code())
                    .with_metadata("error", error.to_string()),
                );
                return Err(error);
            }
        };

        let request = &opening.request;
        info!(
            event_name = "leave.submitted",
            request_id = %request.id.0,
            correlation_id = %correlation_id,
            kind = request.kind.as_str(),
            status = request.status.as_str(),
            duration_days = request.duration_days,
            "leave request submitted"
        );
        let mut event = AuditEvent::new(
            Some(request.id.clone()),
            correlation_id,
            "leave.submitted",
            AuditCategory::Submission,
            employee_id.0.clone(),
            AuditOutcome::Success,
        )
        .with_metadata("kind", request.kind.as_str())
        .with_metadata("status", request.status.as_str())
        .with_metadata("duration_days", request.duration_days.to_string());
        if let Some(matched) = opening.hr_match {
            event = event.with_metadata("hr_match", matched.as_str());
        }
        self.audit.emit(event);

        let context = NotificationContext::for_request(request);
        let mut dispatch = self
            .dispatcher
            .dispatch(request, &[], &opening.effects, &context, correlation_id)
            .await;
        self.record_documents(&request.id, &mut dispatch, correlation_id).await;

        Ok(SubmissionReceipt {
            id: request.id.clone(),
            status: request.status,
            approval_level: request.approval_level,
            max_approval_level: request.max_approval_level,
            current_approver_id: request.current_approver_id.clone(),
            state_version: request.state_version,
            dispatch,
        })
    }

    async fn open_in_transaction(
        &self,
        id: LeaveRequestId,
        application: LeaveApplication,
    ) -> Result<Opening, WorkflowError> {
        let mut tx = self.begin_write().await?;

        let top_level = self.flow.classifier().is_top_level(&application.requester.role_name);
        let router = if top_level {
            HrApproverRouter::new(directory::load_hr_candidates(&mut tx).await?)
        } else {
            if let Some(approver_id) = &application.first_approver_id {
                match directory::find_employee(&mut tx, approver_id).await? {
                    Some(account) if account.status == AccountStatus::Active => {}
                    Some(_) => {
                        return Err(WorkflowError::ApproverResolution(format!(
                            "first-layer approver `{}` is not active",
                            approver_id.0
                        )))
                    }
                    None => {
                        return Err(WorkflowError::ApproverResolution(format!(
                            "first-layer approver `{}` has no account",
                            approver_id.0
                        )))
                    }
                }
            }
            HrApproverRouter::default()
        };

        let opening = self.flow.open(id, application, &router, Utc::now())?;
        let request = &opening.request;
        if opening.hr_match == Some(HrMatch::AnyActive) {
            let approver_id =
                request.current_approver_id.as_ref().map(|id| id.0.as_str()).unwrap_or("-");
            warn!(
                event_name = "leave.hr_fallback_used",
                request_id = %request.id.0,
                division_code = %request.requester.division_code,
                approver_id = %approver_id,
                "no HR approver matched the division; routed to any active HR approver"
            );
        }

        if let QuotaEffect::Reserve { days } = opening.quota {
            self.reserve(&mut tx, request, days).await?;
        }
        leave_request::insert(&mut tx, request).await?;
        tx.commit().await.map_err(storage)?;

        Ok(opening)
    }

    async fn reserve(
        &self,
        conn: &mut sqlx::SqliteConnection,
        request: &LeaveRequest,
        days: u32,
    ) -> Result<(), WorkflowError> {
        let employee_id = &request.requester.employee_id;
        let year = request.quota_year();
        let mut balance =
            quota_ledger::ensure(conn, employee_id, year, self.default_annual_days).await?;
        balance.reserve(days).map_err(DomainError::from)?;
        quota_ledger::save(conn, &balance).await?;

        info!(
            event_name = "quota.updated",
            request_id = %request.id.0,
            employee_id = %employee_id.0,
            operation = QuotaOperation::Reserve.as_str(),
            year,
            days,
            pending = balance.pending,
            remaining = balance.remaining,
            "quota reserved for pending request"
        );
        Ok(())
    }
}
