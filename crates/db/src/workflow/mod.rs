//! Transactional leave workflow.
//!
//! Each operation runs the pure state machine against rows read inside one
//! SQLite transaction, writes the request, ledger and approval changes in
//! that same transaction, and only after commit dispatches documents and
//! notifications.

use std::sync::Arc;

use serde::Serialize;
use sqlx::{Sqlite, Transaction};
use tracing::warn;

use leaveflow_core::audit::{AuditSink, TracingAuditSink};
use leaveflow_core::config::AppConfig;
use leaveflow_core::domain::leave::{EmployeeId, LeaveRequestId, LeaveStatus};
use leaveflow_core::effects::{
    DispatchReport, DocumentGenerator, EffectDispatcher, EffectFailure, EffectKind, Notifier,
};
use leaveflow_core::errors::WorkflowError;
use leaveflow_core::flows::ApprovalFlow;
use leaveflow_core::signature::ApprovalSigner;

use crate::repositories::{leave_request, RepositoryError, SqlEffectFailureSink};
use crate::DbPool;

mod decision;
mod quota;
mod submission;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub id: LeaveRequestId,
    pub status: LeaveStatus,
    pub approval_level: u8,
    pub max_approval_level: u8,
    pub current_approver_id: Option<EmployeeId>,
    pub state_version: u32,
    pub dispatch: DispatchReport,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecisionReceipt {
    pub id: LeaveRequestId,
    pub status: LeaveStatus,
    pub approval_level: u8,
    pub next_approver_id: Option<EmployeeId>,
    pub state_version: u32,
    pub dispatch: DispatchReport,
}

pub struct LeaveWorkflow {
    pool: DbPool,
    flow: ApprovalFlow,
    signer: ApprovalSigner,
    dispatcher: EffectDispatcher,
    audit: Arc<dyn AuditSink>,
    default_annual_days: u32,
}

impl LeaveWorkflow {
    pub fn new(
        pool: DbPool,
        flow: ApprovalFlow,
        signer: ApprovalSigner,
        dispatcher: EffectDispatcher,
        audit: Arc<dyn AuditSink>,
        default_annual_days: u32,
    ) -> Self {
        Self { pool, flow, signer, dispatcher, audit, default_annual_days }
    }

    /// Wires the runtime collaborators: tracing audit sink and SQL-backed
    /// effect failure capture.
    pub fn from_config(
        pool: DbPool,
        config: &AppConfig,
        documents: Arc<dyn DocumentGenerator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        let failures = Arc::new(SqlEffectFailureSink::new(pool.clone()));
        let dispatcher = EffectDispatcher::new(documents, notifier, failures, audit.clone());

        Self::new(
            pool,
            ApprovalFlow::new(config.role_classifier()),
            ApprovalSigner::new(config.signing.secret.clone()),
            dispatcher,
            audit,
            config.quota.default_annual_days,
        )
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn signer(&self) -> &ApprovalSigner {
        &self.signer
    }

    /// Opens a transaction that holds the database write lock from its first
    /// statement. Concurrent writers queue behind the busy timeout instead of
    /// failing on a stale read snapshot at their first write.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, WorkflowError> {
        self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(storage)
    }

    /// Writes each generated document's reference onto the request. These
    /// writes happen after commit; a failed one is captured like any other
    /// effect failure.
    async fn record_documents(
        &self,
        request_id: &LeaveRequestId,
        report: &mut DispatchReport,
        correlation_id: &str,
    ) {
        let documents = report.documents.clone();
        for (stage, reference) in documents {
            let written = match self.pool.acquire().await {
                Ok(mut conn) => {
                    leave_request::set_document(&mut conn, request_id, stage, &reference).await
                }
                Err(error) => Err(RepositoryError::from(error)),
            };

            let message = match written {
                Ok(true) => continue,
                Ok(false) => format!("leave request `{}` no longer exists", request_id.0),
                Err(error) => error.to_string(),
            };
            let failure = EffectFailure::new(
                request_id.clone(),
                EffectKind::DocumentReference(stage),
                message,
            );
            self.dispatcher.capture(failure.clone(), correlation_id).await;
            report.failures.push(failure);
        }
    }
}

impl From<RepositoryError> for WorkflowError {
    fn from(error: RepositoryError) -> Self {
        if error.is_contention() {
            warn!(
                event_name = "db.write_contention",
                error = %error,
                "write lost to a concurrent transaction"
            );
            return Self::ConcurrencyConflict(format!("concurrent write detected: {error}"));
        }
        Self::Persistence(error.to_string())
    }
}

fn storage(error: sqlx::Error) -> WorkflowError {
    WorkflowError::from(RepositoryError::from(error))
}
