use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::approvals::{HrApproverRouter, ResolutionMode, RoleClassifier};
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::ApproverRole;
use crate::domain::leave::{
    DocumentRefs, LeaveKind, LeavePeriod, LeaveRequest, LeaveRequestId, LeaveStatus, Rejection,
};
use crate::effects::{DocumentStage, NotificationKind, SideEffect};
use crate::errors::DomainError;
use crate::flows::states::{
    ApprovalStamp, Decision, DecisionAction, LeaveApplication, Opening, QuotaEffect,
    TransitionOutcome,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("leave request `{request_id}` is already {}", .status.as_str())]
    AlreadyDecided { request_id: String, status: LeaveStatus },
    #[error("`{actor_id}` is not the current approver of leave request `{request_id}`")]
    NotCurrentApprover { request_id: String, actor_id: String },
    #[error("rejecting leave request `{request_id}` requires a non-empty reason")]
    MissingRejectionReason { request_id: String },
    #[error("leave request `{request_id}` is at version {actual}, decision expected {expected}")]
    StaleVersion { request_id: String, expected: u32, actual: u32 },
}

/// The leave approval state machine.
///
/// Pure: it decides what a submission or decision does, and the caller
/// applies the result (request row, ledger, approval record) in one
/// transaction before dispatching the planned side effects.
#[derive(Clone, Debug, Default)]
pub struct ApprovalFlow {
    classifier: RoleClassifier,
}

impl ApprovalFlow {
    pub fn new(classifier: RoleClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &RoleClassifier {
        &self.classifier
    }

    pub fn open(
        &self,
        id: LeaveRequestId,
        application: LeaveApplication,
        hr: &HrApproverRouter,
        now: DateTime<Utc>,
    ) -> Result<Opening, DomainError> {
        validate_requester(&application)?;
        let period = resolve_period(&application)?;
        let duration_days = if application.kind.is_quota_bearing() { period.days() } else { 1 };

        let top_level = self.classifier.is_top_level(&application.requester.role_name);
        let (status, max_approval_level, approver_id, hr_match) = if top_level {
            let routed = hr.resolve(
                &application.requester.division_code,
                ResolutionMode::AnyActiveFallback,
            )?;
            (LeaveStatus::WaitingHrd, 1, routed.approver_id, Some(routed.matched))
        } else {
            let approver_id = application
                .first_approver_id
                .clone()
                .filter(|approver| !approver.0.trim().is_empty())
                .ok_or_else(|| {
                    DomainError::Validation(format!(
                        "a first-layer approver is required for division `{}`",
                        application.requester.division_code
                    ))
                })?;
            (LeaveStatus::WaitingManager, 2, approver_id, None)
        };

        let quota = if application.kind.is_quota_bearing() {
            QuotaEffect::Reserve { days: duration_days }
        } else {
            QuotaEffect::None
        };

        let request = LeaveRequest {
            id,
            requester: application.requester,
            kind: application.kind,
            period,
            duration_days,
            description: non_empty(application.description.as_deref()),
            status,
            approval_level: 1,
            max_approval_level,
            current_approver_id: Some(approver_id.clone()),
            rejection: None,
            documents: DocumentRefs::default(),
            state_version: 1,
            submitted_at: now,
            updated_at: now,
        };
        request.check_invariants().map_err(DomainError::InvariantViolation)?;

        Ok(Opening {
            request,
            quota,
            top_level,
            hr_match,
            effects: vec![
                SideEffect::GenerateDocument { stage: DocumentStage::Submission },
                SideEffect::Notify { recipient: approver_id, kind: NotificationKind::NewRequest },
            ],
        })
    }

    pub fn decide(
        &self,
        request: &LeaveRequest,
        decision: &Decision,
        hr: &HrApproverRouter,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, DomainError> {
        // A caller deciding from an outdated read learns that first, whatever
        // the request has become since.
        if let Some(expected) = decision.expected_version {
            if expected != request.state_version {
                return Err(TransitionError::StaleVersion {
                    request_id: request.id.0.clone(),
                    expected,
                    actual: request.state_version,
                }
                .into());
            }
        }
        if request.is_terminal() {
            return Err(TransitionError::AlreadyDecided {
                request_id: request.id.0.clone(),
                status: request.status,
            }
            .into());
        }

        let current = request.current_approver_id.as_ref().ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "non-terminal leave request `{}` has no current approver",
                request.id.0
            ))
        })?;
        if *current != decision.actor_id {
            return Err(TransitionError::NotCurrentApprover {
                request_id: request.id.0.clone(),
                actor_id: decision.actor_id.0.clone(),
            }
            .into());
        }

        match decision.action {
            DecisionAction::Reject => reject(request, decision, now),
            DecisionAction::Approve => approve(request, decision, hr, now),
        }
    }

    /// Runs [`ApprovalFlow::decide`] and records a refused decision on `sink`.
    ///
    /// An accepted outcome is not yet durable, so its event comes from
    /// [`TransitionOutcome::applied_event`] once the caller has committed it.
    pub fn decide_with_audit<S>(
        &self,
        request: &LeaveRequest,
        decision: &Decision,
        hr: &HrApproverRouter,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.decide(request, decision, hr, now);
        if let Err(error) = &result {
            sink.emit(
                AuditEvent::from_context(
                    audit,
                    "leave.transition_rejected",
                    AuditCategory::Decision,
                    AuditOutcome::Rejected,
                )
                .with_metadata("action", decision.action.as_str())
                .with_metadata("status", request.status.as_str())
                .with_metadata("error", error.to_string()),
            );
        }
        result
    }
}

impl TransitionOutcome {
    pub fn applied_event(&self, audit: &AuditContext) -> AuditEvent {
        let mut event = AuditEvent::from_context(
            audit,
            "leave.transition_applied",
            AuditCategory::Decision,
            AuditOutcome::Success,
        )
        .with_metadata("action", self.action.as_str())
        .with_metadata("from", self.from.as_str())
        .with_metadata("to", self.to.as_str())
        .with_metadata("level", self.to_level.to_string());
        if let Some(next) = &self.next_approver_id {
            event = event.with_metadata("next_approver", next.0.clone());
        }
        event
    }
}

fn reject(
    request: &LeaveRequest,
    decision: &Decision,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, DomainError> {
    let reason = non_empty(decision.notes.as_deref()).ok_or_else(|| {
        TransitionError::MissingRejectionReason { request_id: request.id.0.clone() }
    })?;
    let to = match request.status {
        LeaveStatus::WaitingManager => LeaveStatus::RejectedManager,
        _ => LeaveStatus::RejectedHrd,
    };
    let quota = match request.quota_days() {
        0 => QuotaEffect::None,
        days => QuotaEffect::Release { days },
    };

    Ok(TransitionOutcome {
        action: DecisionAction::Reject,
        from: request.status,
        to,
        from_level: request.approval_level,
        to_level: request.approval_level,
        next_approver_id: None,
        hr_match: None,
        approval: None,
        rejection: Some(Rejection {
            reason,
            rejected_by: decision.actor_id.clone(),
            rejected_at: now,
        }),
        quota,
        effects: vec![SideEffect::Notify {
            recipient: request.requester.employee_id.clone(),
            kind: NotificationKind::Rejected,
        }],
        decided_at: now,
    })
}

fn approve(
    request: &LeaveRequest,
    decision: &Decision,
    hr: &HrApproverRouter,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, DomainError> {
    let approver_role = match request.status {
        LeaveStatus::WaitingManager => ApproverRole::Manager,
        _ => ApproverRole::Hrd,
    };
    let approval = ApprovalStamp {
        level: request.approval_level,
        approver_id: decision.actor_id.clone(),
        approver_role,
        notes: non_empty(decision.notes.as_deref()),
        decided_at: now,
    };
    let requester = request.requester.employee_id.clone();

    match (request.status, request.is_final_level()) {
        (LeaveStatus::WaitingHrd, true) => {
            let quota = match request.quota_days() {
                0 => QuotaEffect::None,
                days => QuotaEffect::Settle { days },
            };
            Ok(TransitionOutcome {
                action: DecisionAction::Approve,
                from: request.status,
                to: LeaveStatus::Approved,
                from_level: request.approval_level,
                to_level: request.approval_level,
                next_approver_id: None,
                hr_match: None,
                approval: Some(approval),
                rejection: None,
                quota,
                effects: vec![
                    SideEffect::GenerateDocument { stage: DocumentStage::Final },
                    SideEffect::Notify { recipient: requester, kind: NotificationKind::Approved },
                ],
                decided_at: now,
            })
        }
        (LeaveStatus::WaitingManager, false) => {
            let routed =
                hr.resolve(&request.requester.division_code, ResolutionMode::Strict)?;
            Ok(TransitionOutcome {
                action: DecisionAction::Approve,
                from: request.status,
                to: LeaveStatus::WaitingHrd,
                from_level: request.approval_level,
                to_level: request.approval_level + 1,
                next_approver_id: Some(routed.approver_id.clone()),
                hr_match: Some(routed.matched),
                approval: Some(approval),
                rejection: None,
                quota: QuotaEffect::None,
                effects: vec![
                    SideEffect::GenerateDocument { stage: DocumentStage::Level1 },
                    SideEffect::Notify {
                        recipient: requester,
                        kind: NotificationKind::ForwardedToHrd,
                    },
                    SideEffect::Notify {
                        recipient: routed.approver_id,
                        kind: NotificationKind::NewRequest,
                    },
                ],
                decided_at: now,
            })
        }
        (status, _) => Err(DomainError::InvariantViolation(format!(
            "leave request `{}` is `{}` at level {} of {}",
            request.id.0,
            status.as_str(),
            request.approval_level,
            request.max_approval_level
        ))),
    }
}

fn validate_requester(application: &LeaveApplication) -> Result<(), DomainError> {
    let requester = &application.requester;
    let missing: Vec<&str> = [
        ("employee_id", requester.employee_id.0.as_str()),
        ("full_name", requester.full_name.as_str()),
        ("role_id", requester.role_id.as_str()),
        ("role_name", requester.role_name.as_str()),
        ("division_code", requester.division_code.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| field)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DomainError::Validation(format!("missing required fields: {}", missing.join(", "))))
    }
}

fn resolve_period(application: &LeaveApplication) -> Result<LeavePeriod, DomainError> {
    match (application.kind, application.end_date) {
        (LeaveKind::Cuti, None) => {
            Err(DomainError::Validation("cuti requires both a start and an end date".to_string()))
        }
        (LeaveKind::Cuti, Some(end)) => LeavePeriod::range(application.start_date, end)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "end date {end} is before start date {}",
                    application.start_date
                ))
            }),
        (kind, Some(end)) if end != application.start_date => Err(DomainError::Validation(
            format!("`{}` covers a single date; only cuti accepts a range", kind.as_str()),
        )),
        (_, _) => Ok(LeavePeriod::single(application.start_date)),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}
