use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use leaveflow_core::approvals::HrApproverRouter;
use leaveflow_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use leaveflow_core::domain::approval::{ApprovalDecision, ApprovalRecord, ApprovalRecordId};
use leaveflow_core::domain::leave::{LeaveRequest, LeaveRequestId, LeaveStatus};
use leaveflow_core::effects::NotificationContext;
use leaveflow_core::errors::{DomainError, WorkflowError};
use leaveflow_core::flows::{Decision, QuotaEffect, TransitionOutcome};
use leaveflow_core::ledger::QuotaOperation;

use super::{storage, DecisionReceipt, LeaveWorkflow};
use crate::repositories::{approval_record, directory, leave_request, quota_ledger};

/// Everything a committed decision needs for its post-commit effects.
struct CommittedDecision {
    request: LeaveRequest,
    outcome: TransitionOutcome,
    record: Option<ApprovalRecord>,
    actor_name: String,
}

impl LeaveWorkflow {
    /// Applies one approve or reject decision.
    ///
    /// The status change, the ledger movement and the approval record commit
    /// together or not at all. A decision that loses a race against another
    /// decision on the same request fails with a concurrency conflict and
    /// changes nothing. Without an `expected_version`, a request that another
    /// call moved after this one started counts as that same lost race.
    pub async fn decide(
        &self,
        request_id: &LeaveRequestId,
        decision: Decision,
        correlation_id: &str,
    ) -> Result<DecisionReceipt, WorkflowError> {
        let started = Utc::now();
        let audit = AuditContext::new(
            Some(request_id.clone()),
            correlation_id,
            decision.actor_id.0.clone(),
        );

        let committed = match self.decide_in_transaction(request_id, &decision, &audit, started).await
        {
            Ok(committed) => committed,
            Err(error) => {
                warn!(
                    event_name = "leave.decision_failed",
                    request_id = %request_id.0,
                    correlation_id = %correlation_id,
                    actor_id = %decision.actor_id.0,
                    action = decision.action.as_str(),
                    code = error.code(),
                    error = %error,
                    "leave decision refused"
                );
                return Err(error);
            }
        };

        let CommittedDecision { request, outcome, record, actor_name } = committed;
        self.audit.emit(outcome.applied_event(&audit));
        info!(
            event_name = "leave.decided",
            request_id = %request.id.0,
            correlation_id = %correlation_id,
            actor_id = %decision.actor_id.0,
            action = outcome.action.as_str(),
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            level = outcome.to_level,
            state_version = request.state_version,
            "leave decision committed"
        );

        let approvals = self.approvals_for_documents(&request, record, correlation_id).await;
        let mut context = NotificationContext::for_request(&request).with_actor(actor_name);
        if let Some(rejection) = &request.rejection {
            context = context.with_reason(rejection.reason.clone());
        }
        let mut dispatch = self
            .dispatcher
            .dispatch(&request, &approvals, &outcome.effects, &context, correlation_id)
            .await;
        self.record_documents(&request.id, &mut dispatch, correlation_id).await;

        Ok(DecisionReceipt {
            id: request.id.clone(),
            status: request.status,
            approval_level: request.approval_level,
            next_approver_id: request.current_approver_id.clone(),
            state_version: request.state_version,
            dispatch,
        })
    }

    async fn decide_in_transaction(
        &self,
        request_id: &LeaveRequestId,
        decision: &Decision,
        audit: &AuditContext,
        started: DateTime<Utc>,
    ) -> Result<CommittedDecision, WorkflowError> {
        let mut tx = self.begin_write().await?;

        let current = leave_request::find(&mut tx, request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("leave request `{}`", request_id.0)))?;
        current.check_invariants().map_err(DomainError::InvariantViolation)?;

        if decision.expected_version.is_none() && current.updated_at >= started {
            let error = WorkflowError::ConcurrencyConflict(format!(
                "leave request `{}` moved to {} (version {}) while this decision was in flight",
                current.id.0,
                current.status.as_str(),
                current.state_version
            ));
            self.audit.emit(refused_event(audit, decision, &current, &error));
            return Err(error);
        }

        let router = if current.status == LeaveStatus::WaitingManager {
            HrApproverRouter::new(directory::load_hr_candidates(&mut tx).await?)
        } else {
            HrApproverRouter::default()
        };

        let now = Utc::now();
        let outcome = self.flow.decide_with_audit(
            &current,
            decision,
            &router,
            now,
            self.audit.as_ref(),
            audit,
        )?;

        match self.persist(tx, &current, &outcome, decision).await {
            Ok(committed) => Ok(committed),
            Err(error) => {
                self.audit.emit(refused_event(audit, decision, &current, &error));
                Err(error)
            }
        }
    }

    async fn persist(
        &self,
        mut tx: Transaction<'_, Sqlite>,
        current: &LeaveRequest,
        outcome: &TransitionOutcome,
        decision: &Decision,
    ) -> Result<CommittedDecision, WorkflowError> {
        let next = outcome.apply_to(current);
        next.check_invariants().map_err(DomainError::InvariantViolation)?;

        if !leave_request::apply_transition(&mut tx, current, &next).await? {
            return Err(WorkflowError::ConcurrencyConflict(format!(
                "leave request `{}` changed before the decision could be applied",
                current.id.0
            )));
        }

        let actor_name = directory::find_employee(&mut tx, &decision.actor_id)
            .await?
            .map(|account| account.full_name)
            .unwrap_or_else(|| decision.actor_id.0.clone());

        let record = match &outcome.approval {
            Some(stamp) => {
                let record = ApprovalRecord {
                    id: ApprovalRecordId(format!("AR-{}", Uuid::new_v4())),
                    leave_request_id: current.id.clone(),
                    level: stamp.level,
                    approver_id: stamp.approver_id.clone(),
                    approver_name: actor_name.clone(),
                    approver_role: stamp.approver_role,
                    decision: ApprovalDecision::Approved,
                    notes: stamp.notes.clone(),
                    signature: self.signer.sign(
                        &current.id,
                        stamp.level,
                        &stamp.approver_id,
                        stamp.approver_role,
                        stamp.decided_at,
                    ),
                    decided_at: stamp.decided_at,
                };
                if let Err(error) = approval_record::insert(&mut tx, &record).await {
                    if error.is_unique_violation() {
                        return Err(WorkflowError::ConcurrencyConflict(format!(
                            "level {} of leave request `{}` was already approved",
                            stamp.level, current.id.0
                        )));
                    }
                    return Err(error.into());
                }
                Some(record)
            }
            None => None,
        };

        self.apply_quota(&mut tx, current, outcome.quota).await?;
        tx.commit().await.map_err(storage)?;

        Ok(CommittedDecision {
            request: next,
            outcome: outcome.clone(),
            record,
            actor_name,
        })
    }

    async fn apply_quota(
        &self,
        conn: &mut sqlx::SqliteConnection,
        request: &LeaveRequest,
        effect: QuotaEffect,
    ) -> Result<(), WorkflowError> {
        if effect == QuotaEffect::None {
            return Ok(());
        }

        let employee_id = &request.requester.employee_id;
        let year = request.quota_year();
        let mut balance =
            quota_ledger::ensure(conn, employee_id, year, self.default_annual_days).await?;
        let (operation, days) = match effect {
            QuotaEffect::Settle { days } => {
                balance.settle(days);
                (QuotaOperation::Settle, days)
            }
            QuotaEffect::Release { days } => {
                balance.release(days);
                (QuotaOperation::Release, days)
            }
            QuotaEffect::Reserve { days } => {
                balance.reserve(days).map_err(DomainError::from)?;
                (QuotaOperation::Reserve, days)
            }
            QuotaEffect::None => return Ok(()),
        };
        if !balance.is_balanced() {
            warn!(
                event_name = "quota.unbalanced",
                request_id = %request.id.0,
                employee_id = %employee_id.0,
                operation = operation.as_str(),
                year,
                days,
                total = balance.total,
                used = balance.used,
                pending = balance.pending,
                remaining = balance.remaining,
                "ledger no longer sums to its total; pending was below the decided days"
            );
        }
        quota_ledger::save(conn, &balance).await?;

        info!(
            event_name = "quota.updated",
            request_id = %request.id.0,
            employee_id = %employee_id.0,
            operation = operation.as_str(),
            year,
            days,
            used = balance.used,
            pending = balance.pending,
            remaining = balance.remaining,
            "quota ledger updated by decision"
        );
        Ok(())
    }

    /// Approval records handed to the document generator: the new record for
    /// the level-one document, the full trail for the final one.
    async fn approvals_for_documents(
        &self,
        request: &LeaveRequest,
        record: Option<ApprovalRecord>,
        correlation_id: &str,
    ) -> Vec<ApprovalRecord> {
        if request.status != LeaveStatus::Approved {
            return record.into_iter().collect();
        }

        let trail = match self.pool.acquire().await {
            Ok(mut conn) => approval_record::list_for_request(&mut conn, &request.id).await,
            Err(error) => Err(error.into()),
        };
        match trail {
            Ok(trail) => trail,
            Err(error) => {
                warn!(
                    event_name = "leave.approval_trail_unavailable",
                    request_id = %request.id.0,
                    correlation_id = %correlation_id,
                    error = %error,
                    "falling back to the final approval only"
                );
                record.into_iter().collect()
            }
        }
    }
}

fn refused_event(
    audit: &AuditContext,
    decision: &Decision,
    current: &LeaveRequest,
    error: &WorkflowError,
) -> AuditEvent {
    AuditEvent::from_context(
        audit,
        "leave.transition_rejected",
        AuditCategory::Decision,
        AuditOutcome::Failed,
    )
    .with_metadata("action", decision.action.as_str())
    .with_metadata("status", current.status.as_str())
    .with_metadata("code", error.code())
    .with_metadata("error", error.to_string())
}
