use thiserror::Error;

use crate::approvals::RoutingError;
use crate::flows::TransitionError;
use crate::ledger::QuotaError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures surfaced by `submit`, `decide` and `adjust_quota`. Every variant
/// leaves the request row and ledger exactly as they were before the call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not authorized: {0}")]
    Authorization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("approver resolution failed: {0}")]
    ApproverResolution(String),
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),
    #[error("leave request `{request_id}` is already decided with status `{status}`")]
    AlreadyDecided { request_id: String, status: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl WorkflowError {
    /// Stable machine-readable code used in logs and command outcomes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authorization(_) => "authorization",
            Self::NotFound(_) => "not_found",
            Self::ApproverResolution(_) => "approver_resolution",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::AlreadyDecided { .. } => "already_decided",
            Self::Persistence(_) => "persistence",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(message) => Self::Validation(message),
            DomainError::Transition(TransitionError::AlreadyDecided { request_id, status }) => {
                Self::AlreadyDecided { request_id, status: status.as_str().to_string() }
            }
            DomainError::Transition(error @ TransitionError::NotCurrentApprover { .. }) => {
                Self::Authorization(error.to_string())
            }
            DomainError::Transition(error @ TransitionError::MissingRejectionReason { .. }) => {
                Self::Validation(error.to_string())
            }
            DomainError::Transition(error @ TransitionError::StaleVersion { .. }) => {
                Self::ConcurrencyConflict(error.to_string())
            }
            DomainError::Quota(error) => Self::Validation(error.to_string()),
            DomainError::Routing(error) => Self::ApproverResolution(error.to_string()),
            DomainError::InvariantViolation(message) => {
                Self::Persistence(format!("stored state violates invariant: {message}"))
            }
        }
    }
}

/// Document generation or notification failure. Always captured after
/// commit, never returned from a workflow operation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EffectError {
    #[error("document generation for stage `{stage}` failed: {message}")]
    Document { stage: String, message: String },
    #[error("notification `{kind}` failed: {message}")]
    Notification { kind: String, message: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not the approver assigned to this request.",
            Self::NotFound { .. } => "The requested leave record does not exist.",
            Self::Conflict { .. } => {
                "The request changed while you were deciding. Reload it before retrying."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<WorkflowError> for InterfaceError {
    fn from(value: WorkflowError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            WorkflowError::Validation(message) => Self::BadRequest { message, correlation_id },
            WorkflowError::Authorization(message) => Self::Forbidden { message, correlation_id },
            WorkflowError::NotFound(message) => Self::NotFound { message, correlation_id },
            error @ WorkflowError::AlreadyDecided { .. } => {
                Self::Conflict { message: error.to_string(), correlation_id }
            }
            WorkflowError::ConcurrencyConflict(message) => {
                Self::Conflict { message, correlation_id }
            }
            WorkflowError::ApproverResolution(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            WorkflowError::Persistence(message) => Self::Internal { message, correlation_id },
        }
    }
}
