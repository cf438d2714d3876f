pub mod audit;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod expiration;
pub mod flows;
pub mod notify;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::actor::{ActingUser, UserRole};
pub use domain::quote::{LineItem, PatientInfo, Quote, QuoteId, QuoteStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use expiration::{ExpirationDecision, ExpirationPolicy};
pub use flows::{
    ApprovalPolicy, Completeness, QuoteStateMachine, TransitionRejection, TransitionResult,
};
pub use notify::{ExpirationWarning, NotificationDispatcher, NotificationError};
