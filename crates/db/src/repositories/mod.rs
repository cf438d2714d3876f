use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use optiquote_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use optiquote_core::flows::AppliedTransition;

pub mod memory;
pub mod quote;

pub use memory::InMemoryQuoteRepository;
pub use quote::SqlQuoteRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("quote `{0}` does not exist")]
    NotFound(String),
    #[error("quote `{0}` already exists")]
    AlreadyExists(String),
    #[error("quote `{quote_id}` no longer at version {expected_version}")]
    VersionConflict { quote_id: String, expected_version: u32 },
}

impl RepositoryError {
    /// Lock contention and pool exhaustion clear up on their own; everything
    /// else (including version conflicts) needs a fresh decision.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::PoolTimedOut) | Self::Database(sqlx::Error::Io(_)) => true,
            Self::Database(sqlx::Error::Database(error)) => {
                let message = error.message().to_ascii_lowercase();
                message.contains("database is locked") || message.contains("busy")
            }
            _ => false,
        }
    }
}

/// One row of `quote_status_history`, written with every applied transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub quote_id: QuoteId,
    pub from_status: QuoteStatus,
    pub to_status: QuoteStatus,
    pub changed_by: String,
    pub reason: Option<String>,
    pub quote_version: u32,
    pub changed_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn from_applied(quote_id: &QuoteId, applied: &AppliedTransition, version: u32) -> Self {
        Self {
            quote_id: quote_id.clone(),
            from_status: applied.from,
            to_status: applied.to,
            changed_by: applied.audit.status_changed_by.clone(),
            reason: applied.audit.status_reason.clone(),
            quote_version: version,
            changed_at: applied.audit.status_changed_at,
        }
    }
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError>;

    async fn insert(&self, quote: &Quote) -> Result<(), RepositoryError>;

    /// Persists `applied` against `snapshot` if the stored row is still at
    /// `snapshot.version`. Status, audit triple, milestones and the history
    /// row commit together; the returned quote carries the bumped version.
    async fn apply_transition(
        &self,
        snapshot: &Quote,
        applied: &AppliedTransition,
    ) -> Result<Quote, RepositoryError>;

    /// Records that the expiration warning went out. Does not touch status.
    async fn mark_expiration_warning_sent(
        &self,
        snapshot: &Quote,
        sent_at: DateTime<Utc>,
    ) -> Result<Quote, RepositoryError>;

    async fn list_by_statuses(
        &self,
        statuses: &[QuoteStatus],
    ) -> Result<Vec<Quote>, RepositoryError>;

    async fn status_history(&self, id: &QuoteId)
        -> Result<Vec<StatusHistoryEntry>, RepositoryError>;
}

pub(crate) fn transitioned(snapshot: &Quote, applied: &AppliedTransition) -> Quote {
    let mut next = snapshot.clone();
    applied.apply_to(&mut next);
    next.version = snapshot.version.saturating_add(1);
    next
}

pub(crate) fn warning_marked(snapshot: &Quote, sent_at: DateTime<Utc>) -> Quote {
    let mut next = snapshot.clone();
    next.expire_notification_sent = true;
    next.expire_notification_sent_at = Some(sent_at);
    next.updated_at = sent_at;
    next.version = snapshot.version.saturating_add(1);
    next
}
