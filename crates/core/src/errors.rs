use thiserror::Error;

use crate::{
    domain::{actor::UserRole, quote::QuoteStatus},
    flows::{TransitionRejection, UnmetCondition},
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("no-op transition not allowed: quote is already {status}")]
    NoOpTransition { status: QuoteStatus },
    #[error("illegal quote transition from {from} to {to}")]
    IllegalTransition { from: QuoteStatus, to: QuoteStatus },
    #[error("quote transition from {from} to {to} blocked: {reason}")]
    PreconditionFailed {
        from: QuoteStatus,
        to: QuoteStatus,
        reason: String,
        unmet: Vec<UnmetCondition>,
    },
}

impl From<TransitionRejection> for DomainError {
    fn from(value: TransitionRejection) -> Self {
        match value {
            TransitionRejection::NoOp { status } => Self::NoOpTransition { status },
            TransitionRejection::IllegalTransition { from, to } => {
                Self::IllegalTransition { from, to }
            }
            TransitionRejection::PreconditionFailed { from, to, reason, unmet } => {
                Self::PreconditionFailed { from, to, reason, unmet }
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("quote `{0}` was not found")]
    QuoteNotFound(String),
    #[error("quote `{0}` already exists")]
    QuoteAlreadyExists(String),
    #[error("quote `{quote_id}` changed since it was read (expected version {expected_version})")]
    ConcurrencyConflict { quote_id: String, expected_version: u32 },
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<TransitionRejection> for ApplicationError {
    fn from(value: TransitionRejection) -> Self {
        Self::Domain(DomainError::from(value))
    }
}

/// Every 409 variant is distinct so callers can tell a stale read, which a
/// refresh fixes, from a move or id the quote will never accept.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("transition not allowed: {message}")]
    TransitionNotAllowed { message: String, correlation_id: String },
    #[error("already exists: {message}")]
    AlreadyExists { message: String, correlation_id: String },
    #[error("unprocessable: {message}")]
    Unprocessable { message: String, unmet: Vec<String>, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested quote does not exist.",
            Self::Conflict { .. } => {
                "The quote was changed by someone else. Refresh the quote and try again."
            }
            Self::TransitionNotAllowed { .. } => {
                "That status change is not allowed from the quote's current status."
            }
            Self::AlreadyExists { .. } => "A quote with that id already exists.",
            Self::Unprocessable { .. } => {
                "The quote is missing information required for that step."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::TransitionNotAllowed { correlation_id, .. }
            | Self::AlreadyExists { correlation_id, .. }
            | Self::Unprocessable { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::TransitionNotAllowed { correlation_id: id, .. }
            | InterfaceError::AlreadyExists { correlation_id: id, .. }
            | InterfaceError::Unprocessable { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

const UNASSIGNED: &str = "unassigned";

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = UNASSIGNED.to_owned();
        match value {
            ApplicationError::Domain(error @ DomainError::IllegalTransition { .. })
            | ApplicationError::Domain(error @ DomainError::NoOpTransition { .. }) => {
                Self::TransitionNotAllowed { message: error.to_string(), correlation_id }
            }
            ApplicationError::Domain(DomainError::PreconditionFailed { reason, unmet, .. }) => {
                Self::Unprocessable {
                    message: reason,
                    unmet: unmet.iter().map(|condition| condition.message().to_owned()).collect(),
                    correlation_id,
                }
            }
            ApplicationError::QuoteNotFound(quote_id) => {
                Self::NotFound { message: format!("quote `{quote_id}` not found"), correlation_id }
            }
            error @ ApplicationError::QuoteAlreadyExists(_) => {
                Self::AlreadyExists { message: error.to_string(), correlation_id }
            }
            error @ ApplicationError::ConcurrencyConflict { .. } => {
                Self::Conflict { message: error.to_string(), correlation_id }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}

/// Human-readable role name for approval prompts.
pub fn approval_prompt(required_role: UserRole, reason: &str) -> String {
    format!("{} approval required: {reason}", required_role.as_str().replace('_', " "))
}
