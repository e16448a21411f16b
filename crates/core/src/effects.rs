//! Post-commit side effects: document generation and notifications.
//!
//! Nothing here runs inside a decision transaction. The dispatcher makes one
//! attempt per effect and routes every failure to a single [`EffectFailureSink`]
//! keyed by request id and effect kind, so the caller's operation still succeeds.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::ApprovalRecord;
use crate::domain::leave::{EmployeeId, LeaveRequest, LeaveRequestId};
use crate::errors::EffectError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStage {
    Submission,
    Level1,
    Final,
}

impl DocumentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Level1 => "level1",
            Self::Final => "final",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submission" => Some(Self::Submission),
            "level1" => Some(Self::Level1),
            "final" => Some(Self::Final),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewRequest,
    ForwardedToHrd,
    Approved,
    Rejected,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewRequest => "new_request",
            Self::ForwardedToHrd => "forwarded_to_hrd",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// One unit of post-commit work planned by a submission or transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideEffect {
    GenerateDocument { stage: DocumentStage },
    Notify { recipient: EmployeeId, kind: NotificationKind },
}

/// Effect kinds as recorded on failure rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    Document(DocumentStage),
    DocumentReference(DocumentStage),
    Notification(NotificationKind),
}

impl EffectKind {
    pub fn label(&self) -> String {
        match self {
            Self::Document(stage) => format!("document.{}", stage.as_str()),
            Self::DocumentReference(stage) => format!("document_ref.{}", stage.as_str()),
            Self::Notification(kind) => format!("notification.{}", kind.as_str()),
        }
    }
}

/// What a notifier needs beyond the recipient: the committed request and,
/// for rejections, who rejected it and why.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContext {
    pub request: LeaveRequest,
    pub actor_name: Option<String>,
    pub reason: Option<String>,
}

impl NotificationContext {
    pub fn for_request(request: &LeaveRequest) -> Self {
        Self { request: request.clone(), actor_name: None, reason: None }
    }

    pub fn with_actor(mut self, actor_name: impl Into<String>) -> Self {
        self.actor_name = Some(actor_name.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    /// Renders a document for `stage` and returns a reference to the artifact.
    /// `approvals` holds one record for `level1` and the full, level-ordered
    /// trail for `final`.
    async fn generate(
        &self,
        request: &LeaveRequest,
        approvals: &[ApprovalRecord],
        stage: DocumentStage,
    ) -> Result<String, EffectError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: &EmployeeId,
        kind: NotificationKind,
        context: &NotificationContext,
    ) -> Result<(), EffectError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectFailure {
    pub request_id: LeaveRequestId,
    pub effect: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl EffectFailure {
    pub fn new(request_id: LeaveRequestId, kind: EffectKind, message: impl Into<String>) -> Self {
        Self { request_id, effect: kind.label(), message: message.into(), occurred_at: Utc::now() }
    }
}

/// Destination for captured effect failures. Recording must not fail the
/// caller; implementations log their own storage problems.
#[async_trait]
pub trait EffectFailureSink: Send + Sync {
    async fn record(&self, failure: EffectFailure);
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub documents: Vec<(DocumentStage, String)>,
    pub notifications_sent: usize,
    pub failures: Vec<EffectFailure>,
}

impl DispatchReport {
    pub fn document(&self, stage: DocumentStage) -> Option<&str> {
        self.documents
            .iter()
            .find(|(candidate, _)| *candidate == stage)
            .map(|(_, reference)| reference.as_str())
    }
}

#[derive(Clone)]
pub struct EffectDispatcher {
    documents: Arc<dyn DocumentGenerator>,
    notifier: Arc<dyn Notifier>,
    failures: Arc<dyn EffectFailureSink>,
    audit: Arc<dyn AuditSink>,
}

impl EffectDispatcher {
    pub fn new(
        documents: Arc<dyn DocumentGenerator>,
        notifier: Arc<dyn Notifier>,
        failures: Arc<dyn EffectFailureSink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { documents, notifier, failures, audit }
    }

    /// Runs each effect once, in order. Failures are captured, never returned.
    pub async fn dispatch(
        &self,
        request: &LeaveRequest,
        approvals: &[ApprovalRecord],
        effects: &[SideEffect],
        context: &NotificationContext,
        correlation_id: &str,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for effect in effects {
            match effect {
                SideEffect::GenerateDocument { stage } => {
                    match self.documents.generate(request, approvals, *stage).await {
                        Ok(reference) => {
                            info!(
                                event_name = "effect.document_generated",
                                request_id = %request.id.0,
                                correlation_id = %correlation_id,
                                stage = stage.as_str(),
                                reference = %reference,
                                "leave document generated"
                            );
                            report.documents.push((*stage, reference));
                        }
                        Err(error) => {
                            let failure = EffectFailure::new(
                                request.id.clone(),
                                EffectKind::Document(*stage),
                                error.to_string(),
                            );
                            self.capture(failure.clone(), correlation_id).await;
                            report.failures.push(failure);
                        }
                    }
                }
                SideEffect::Notify { recipient, kind } => {
                    match self.notifier.notify(recipient, *kind, context).await {
                        Ok(()) => report.notifications_sent += 1,
                        Err(error) => {
                            let failure = EffectFailure::new(
                                request.id.clone(),
                                EffectKind::Notification(*kind),
                                error.to_string(),
                            );
                            self.capture(failure.clone(), correlation_id).await;
                            report.failures.push(failure);
                        }
                    }
                }
            }
        }

        report
    }

    /// Single capture path for every post-commit failure: log, audit, persist.
    pub async fn capture(&self, failure: EffectFailure, correlation_id: &str) {
        error!(
            event_name = "effect.failed",
            request_id = %failure.request_id.0,
            correlation_id = %correlation_id,
            effect = %failure.effect,
            error = %failure.message,
            "post-commit side effect failed"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(failure.request_id.clone()),
                correlation_id,
                "effect.failed",
                AuditCategory::Effect,
                "effect-dispatcher",
                AuditOutcome::Failed,
            )
            .with_metadata("effect", failure.effect.clone())
            .with_metadata("error", failure.message.clone()),
        );
        self.failures.record(failure).await;
    }
}

#[derive(Clone, Default)]
pub struct InMemoryEffectFailureSink {
    failures: Arc<Mutex<Vec<EffectFailure>>>,
}

impl InMemoryEffectFailureSink {
    pub fn failures(&self) -> Vec<EffectFailure> {
        match self.failures.lock() {
            Ok(failures) => failures.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl EffectFailureSink for InMemoryEffectFailureSink {
    async fn record(&self, failure: EffectFailure) {
        match self.failures.lock() {
            Ok(mut failures) => failures.push(failure),
            Err(poisoned) => poisoned.into_inner().push(failure),
        }
    }
}

/// Records every notification it is asked to send; can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(EmployeeId, NotificationKind)>>>,
    fail_with: Option<String>,
}

impl RecordingNotifier {
    pub fn failing(message: impl Into<String>) -> Self {
        Self { sent: Arc::default(), fail_with: Some(message.into()) }
    }

    pub fn sent(&self) -> Vec<(EmployeeId, NotificationKind)> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipient: &EmployeeId,
        kind: NotificationKind,
        _context: &NotificationContext,
    ) -> Result<(), EffectError> {
        if let Some(message) = &self.fail_with {
            return Err(EffectError::Notification {
                kind: kind.as_str().to_string(),
                message: message.clone(),
            });
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push((recipient.clone(), kind)),
            Err(poisoned) => poisoned.into_inner().push((recipient.clone(), kind)),
        }
        Ok(())
    }
}

/// Returns `memory://<request>/<stage>` references without rendering anything.
#[derive(Clone, Default)]
pub struct InMemoryDocumentGenerator {
    generated: Arc<Mutex<Vec<(DocumentStage, usize)>>>,
    failing_stage: Option<DocumentStage>,
}

impl InMemoryDocumentGenerator {
    pub fn failing_on(stage: DocumentStage) -> Self {
        Self { generated: Arc::default(), failing_stage: Some(stage) }
    }

    /// Stage and number of approval records passed for each generated document.
    pub fn generated(&self) -> Vec<(DocumentStage, usize)> {
        match self.generated.lock() {
            Ok(generated) => generated.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl DocumentGenerator for InMemoryDocumentGenerator {
    async fn generate(
        &self,
        request: &LeaveRequest,
        approvals: &[ApprovalRecord],
        stage: DocumentStage,
    ) -> Result<String, EffectError> {
        if self.failing_stage == Some(stage) {
            return Err(EffectError::Document {
                stage: stage.as_str().to_string(),
                message: "renderer unavailable".to_string(),
            });
        }
        match self.generated.lock() {
            Ok(mut generated) => generated.push((stage, approvals.len())),
            Err(poisoned) => poisoned.into_inner().push((stage, approvals.len())),
        }
        Ok(format!("memory://{}/{}", request.id.0, stage.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};

    use super::{
        DocumentStage, EffectDispatcher, InMemoryDocumentGenerator, InMemoryEffectFailureSink,
        NotificationContext, NotificationKind, RecordingNotifier, SideEffect,
    };
    use crate::audit::InMemoryAuditSink;
    use crate::domain::leave::{
        DocumentRefs, EmployeeId, LeaveKind, LeavePeriod, LeaveRequest, LeaveRequestId,
        LeaveStatus, Requester,
    };

    fn request() -> LeaveRequest {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date");
        LeaveRequest {
            id: LeaveRequestId("LV-1".to_owned()),
            requester: Requester {
                employee_id: EmployeeId("E-100".to_owned()),
                full_name: "Rina Staff".to_owned(),
                role_id: "R-STAFF".to_owned(),
                role_name: "Staff".to_owned(),
                division_code: "FIN".to_owned(),
            },
            kind: LeaveKind::Sakit,
            period: LeavePeriod::single(date),
            duration_days: 1,
            description: None,
            status: LeaveStatus::WaitingManager,
            approval_level: 1,
            max_approval_level: 2,
            current_approver_id: Some(EmployeeId("E-MGR".to_owned())),
            rejection: None,
            documents: DocumentRefs::default(),
            state_version: 1,
            submitted_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn effects() -> Vec<SideEffect> {
        vec![
            SideEffect::GenerateDocument { stage: DocumentStage::Submission },
            SideEffect::Notify {
                recipient: EmployeeId("E-MGR".to_owned()),
                kind: NotificationKind::NewRequest,
            },
        ]
    }

    #[tokio::test]
    async fn successful_effects_report_documents_and_notifications() {
        let documents = InMemoryDocumentGenerator::default();
        let notifier = RecordingNotifier::default();
        let failures = InMemoryEffectFailureSink::default();
        let dispatcher = EffectDispatcher::new(
            Arc::new(documents.clone()),
            Arc::new(notifier.clone()),
            Arc::new(failures.clone()),
            Arc::new(InMemoryAuditSink::default()),
        );
        let request = request();

        let context = NotificationContext::for_request(&request);

        let report = dispatcher.dispatch(&request, &[], &effects(), &context, "req-1").await;

        assert_eq!(report.document(DocumentStage::Submission), Some("memory://LV-1/submission"));
        assert_eq!(report.notifications_sent, 1);
        assert!(report.failures.is_empty());
        assert_eq!(
            notifier.sent(),
            vec![(EmployeeId("E-MGR".to_owned()), NotificationKind::NewRequest)]
        );
        assert!(failures.failures().is_empty());
    }

    #[tokio::test]
    async fn failures_are_captured_per_effect_and_do_not_stop_later_effects() {
        let notifier = RecordingNotifier::failing("smtp down");
        let failures = InMemoryEffectFailureSink::default();
        let audit = InMemoryAuditSink::default();
        let dispatcher = EffectDispatcher::new(
            Arc::new(InMemoryDocumentGenerator::failing_on(DocumentStage::Submission)),
            Arc::new(notifier),
            Arc::new(failures.clone()),
            Arc::new(audit.clone()),
        );
        let request = request();

        let context = NotificationContext::for_request(&request);

        let report = dispatcher.dispatch(&request, &[], &effects(), &context, "req-2").await;

        assert!(report.documents.is_empty());
        assert_eq!(report.failures.len(), 2);

        let recorded = failures.failures();
        let kinds: Vec<&str> = recorded.iter().map(|failure| failure.effect.as_str()).collect();
        assert_eq!(kinds, vec!["document.submission", "notification.new_request"]);
        assert!(recorded.iter().all(|failure| failure.request_id.0 == "LV-1"));

        let events = audit.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.event_type == "effect.failed"));
        assert_eq!(events[0].correlation_id, "req-2");
    }
}
