pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod effects;
pub mod errors;
pub mod flows;
pub mod ledger;
pub mod signature;

pub use approvals::{
    HrApproverRouter, HrCandidate, HrMatch, HrRoutingDecision, ResolutionMode, RoleClassifier,
    RoutingError,
};
pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::approval::{ApprovalDecision, ApprovalRecord, ApprovalRecordId, ApproverRole};
pub use domain::directory::{AccountStatus, DivisionApprover, EmployeeAccount, HrApproverEntry};
pub use domain::leave::{
    DocumentRefs, EmployeeId, LeaveKind, LeavePeriod, LeaveRequest, LeaveRequestId, LeaveStatus,
    Rejection, Requester,
};
pub use effects::{
    DocumentGenerator, DocumentStage, EffectDispatcher, EffectFailure, EffectFailureSink,
    EffectKind, NotificationContext, NotificationKind, Notifier, SideEffect,
};
pub use errors::{DomainError, EffectError, InterfaceError, WorkflowError};
pub use flows::{
    ApprovalFlow, Decision, DecisionAction, LeaveApplication, Opening, QuotaEffect,
    TransitionError, TransitionOutcome,
};
pub use ledger::{QuotaAdjustment, QuotaBalance, QuotaError, QuotaOperation};
pub use signature::ApprovalSigner;
