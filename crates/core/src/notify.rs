use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::quote::{Quote, QuoteId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationWarning {
    pub quote_id: QuoteId,
    pub customer_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub expiration_date: DateTime<Utc>,
    pub days_remaining: u32,
}

impl ExpirationWarning {
    pub fn for_quote(quote: &Quote, expiration_date: DateTime<Utc>, days_remaining: u32) -> Self {
        Self {
            quote_id: quote.id.clone(),
            customer_name: quote.customer_display_name(),
            email: quote.patient.email.clone(),
            phone: quote.patient.phone.clone(),
            expiration_date,
            days_remaining,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification endpoint rejected the request with status {status}")]
    Rejected { status: u16 },
    #[error("notification template failed to render: {0}")]
    Template(String),
}

impl NotificationError {
    /// Transport failures and 5xx responses are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status } => *status >= 500,
            Self::Template(_) => false,
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch_expiration_warning(
        &self,
        warning: &ExpirationWarning,
    ) -> Result<(), NotificationError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopNotificationDispatcher {
    async fn dispatch_expiration_warning(
        &self,
        _warning: &ExpirationWarning,
    ) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// Records warnings instead of sending them. Can be told to fail.
#[derive(Clone, Default)]
pub struct InMemoryNotificationDispatcher {
    sent: Arc<Mutex<Vec<ExpirationWarning>>>,
    failure: Arc<Mutex<Option<NotificationError>>>,
}

impl InMemoryNotificationDispatcher {
    pub fn sent(&self) -> Vec<ExpirationWarning> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn fail_with(&self, error: Option<NotificationError>) {
        match self.failure.lock() {
            Ok(mut failure) => *failure = error,
            Err(poisoned) => *poisoned.into_inner() = error,
        }
    }

    fn configured_failure(&self) -> Option<NotificationError> {
        match self.failure.lock() {
            Ok(failure) => failure.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotificationDispatcher {
    async fn dispatch_expiration_warning(
        &self,
        warning: &ExpirationWarning,
    ) -> Result<(), NotificationError> {
        if let Some(error) = self.configured_failure() {
            return Err(error);
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push(warning.clone()),
            Err(poisoned) => poisoned.into_inner().push(warning.clone()),
        }
        Ok(())
    }
}
