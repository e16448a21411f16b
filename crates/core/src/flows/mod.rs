pub mod engine;
pub mod states;

pub use engine::{ApprovalFlow, TransitionError};
pub use states::{
    ApprovalStamp, Decision, DecisionAction, LeaveApplication, Opening, QuotaEffect,
    TransitionOutcome,
};
