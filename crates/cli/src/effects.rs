//! Runtime side-effect collaborators used by the CLI.
//!
//! Documents are rendered from an embedded tera template into
//! `<output_dir>/<request id>/<stage>.html`; notifications are written to the
//! tracing log rather than delivered anywhere.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tera::{Context, Tera};
use tracing::info;

use leaveflow_core::domain::approval::ApprovalRecord;
use leaveflow_core::domain::leave::{EmployeeId, LeaveRequest};
use leaveflow_core::effects::{
    DocumentGenerator, DocumentStage, NotificationContext, NotificationKind, Notifier,
};
use leaveflow_core::errors::EffectError;

const TEMPLATE_NAME: &str = "leave_document.html.tera";

#[derive(Debug, Serialize)]
struct ApprovalView {
    level: u8,
    approver_id: String,
    approver_name: String,
    approver_role: &'static str,
    decided_at: String,
    notes: String,
    signature: String,
}

impl From<&ApprovalRecord> for ApprovalView {
    fn from(record: &ApprovalRecord) -> Self {
        Self {
            level: record.level,
            approver_id: record.approver_id.0.clone(),
            approver_name: record.approver_name.clone(),
            approver_role: record.approver_role.as_str(),
            decided_at: record.decided_at.to_rfc3339(),
            notes: record.notes.clone().unwrap_or_else(|| "-".to_string()),
            signature: record.signature.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HtmlDocumentGenerator {
    tera: Tera,
    output_dir: PathBuf,
}

impl HtmlDocumentGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".html.tera", ".html"]);
        tera.add_raw_template(
            TEMPLATE_NAME,
            include_str!("../../../templates/leave/leave_document.html.tera"),
        )?;
        Ok(Self { tera, output_dir: output_dir.into() })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn render(
        &self,
        request: &LeaveRequest,
        approvals: &[ApprovalRecord],
        stage: DocumentStage,
    ) -> Result<String, tera::Error> {
        let approvals: Vec<ApprovalView> = approvals.iter().map(ApprovalView::from).collect();

        let mut context = Context::new();
        context.insert("title", stage_title(stage));
        context.insert("request_id", &request.id.0);
        context.insert("generated_at", &Utc::now().to_rfc3339());
        context.insert("employee_id", &request.requester.employee_id.0);
        context.insert("employee_name", &request.requester.full_name);
        context.insert("role_name", &request.requester.role_name);
        context.insert("division_code", &request.requester.division_code);
        context.insert("kind", request.kind.as_str());
        context.insert("start_date", &request.period.start.to_string());
        context.insert("end_date", &request.period.end.to_string());
        context.insert("duration_days", &request.duration_days);
        context.insert("status", request.status.as_str());
        context.insert("description", request.description.as_deref().unwrap_or_default());
        context.insert("approvals", &approvals);

        self.tera.render(TEMPLATE_NAME, &context)
    }
}

#[async_trait]
impl DocumentGenerator for HtmlDocumentGenerator {
    async fn generate(
        &self,
        request: &LeaveRequest,
        approvals: &[ApprovalRecord],
        stage: DocumentStage,
    ) -> Result<String, EffectError> {
        let failed = |message: String| EffectError::Document {
            stage: stage.as_str().to_string(),
            message,
        };

        let html =
            self.render(request, approvals, stage).map_err(|error| failed(error.to_string()))?;
        let dir = self.output_dir.join(&request.id.0);
        tokio::fs::create_dir_all(&dir).await.map_err(|error| failed(error.to_string()))?;
        let path = dir.join(format!("{}.html", stage.as_str()));
        tokio::fs::write(&path, html).await.map_err(|error| failed(error.to_string()))?;

        Ok(path.display().to_string())
    }
}

fn stage_title(stage: DocumentStage) -> &'static str {
    match stage {
        DocumentStage::Submission => "Leave Request Form",
        DocumentStage::Level1 => "Leave Request: Manager Approval",
        DocumentStage::Final => "Leave Approval Certificate",
    }
}

/// Writes each notification to the log as a `notification.sent` event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(
        &self,
        recipient: &EmployeeId,
        kind: NotificationKind,
        context: &NotificationContext,
    ) -> Result<(), EffectError> {
        info!(
            event_name = "notification.sent",
            request_id = %context.request.id.0,
            recipient = %recipient.0,
            kind = kind.as_str(),
            "{}",
            notification_text(kind, context)
        );
        Ok(())
    }
}

fn notification_text(kind: NotificationKind, context: &NotificationContext) -> String {
    let request = &context.request;
    let actor = context.actor_name.as_deref().unwrap_or("an approver");
    match kind {
        NotificationKind::NewRequest => format!(
            "{} requested {} day(s) of {} starting {}",
            request.requester.full_name,
            request.duration_days,
            request.kind.as_str(),
            request.period.start
        ),
        NotificationKind::ForwardedToHrd => {
            format!("{actor} approved your request; it is now waiting for HR")
        }
        NotificationKind::Approved => "your leave request was approved".to_string(),
        NotificationKind::Rejected => format!(
            "{actor} rejected your leave request: {}",
            context.reason.as_deref().unwrap_or("no reason given")
        ),
    }
}
