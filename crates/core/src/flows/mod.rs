pub mod authorization;
pub mod completeness;
pub mod engine;
pub mod rules;
pub mod states;
pub mod validator;

pub use authorization::{ApprovalPolicy, ApprovalRequirement};
pub use completeness::{derive_completeness, Completeness};
pub use engine::{QuoteStateMachine, TransitionRejection};
pub use rules::{is_backward, is_reachable, reachable_from};
pub use states::{
    AppliedTransition, AuditFields, Milestone, MilestoneStamp, PendingApproval, TransitionResult,
};
pub use validator::{validate, TransitionValidation, UnmetCondition};
