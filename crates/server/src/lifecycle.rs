//! Quote lifecycle service: the read-decide-write loop around the pure state
//! machine.
//!
//! Every write is conditional on the snapshot version the decision was made
//! against. Transient database failures are retried with backoff; a version
//! conflict is surfaced so the caller re-reads and decides again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use optiquote_core::audit::{AuditContext, AuditSink};
use optiquote_core::clock::Clock;
use optiquote_core::config::AppConfig;
use optiquote_core::domain::actor::{ActingUser, UserRole};
use optiquote_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use optiquote_core::errors::ApplicationError;
use optiquote_core::expiration::ExpirationPolicy;
use optiquote_core::flows::{
    derive_completeness, reachable_from, validate, ApprovalPolicy, Completeness,
    QuoteStateMachine, TransitionResult,
};
use optiquote_db::{QuoteRepository, RepositoryError, StatusHistoryEntry};

use crate::retry::RetryPolicy;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatusChange {
    Applied {
        quote_id: QuoteId,
        new_status: QuoteStatus,
        previous_status: QuoteStatus,
        version: u32,
        changed_at: DateTime<Utc>,
    },
    PendingApproval {
        quote_id: QuoteId,
        current_status: QuoteStatus,
        requested_status: QuoteStatus,
        required_role: UserRole,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuoteStatusView {
    pub quote_id: QuoteId,
    pub status: QuoteStatus,
    pub previous_status: Option<QuoteStatus>,
    /// Targets the rule table allows that the quote's data currently satisfies.
    /// Some may still need manager approval.
    pub next_valid_states: Vec<QuoteStatus>,
    /// Only set while the quote can still auto-expire.
    pub expiration_date: Option<DateTime<Utc>>,
    pub days_until_expiration: Option<u32>,
    pub completeness: Completeness,
    pub version: u32,
}

#[derive(Clone)]
pub struct QuoteLifecycleService {
    repository: Arc<dyn QuoteRepository>,
    machine: QuoteStateMachine<Arc<dyn Clock>>,
    audit: Arc<dyn AuditSink>,
    expiration: ExpirationPolicy,
    retry: RetryPolicy,
    default_auto_expire_days: u32,
}

impl QuoteLifecycleService {
    pub fn new(
        repository: Arc<dyn QuoteRepository>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            repository,
            machine: QuoteStateMachine::new(ApprovalPolicy::default(), clock),
            audit,
            expiration: ExpirationPolicy::default(),
            retry: RetryPolicy::default(),
            default_auto_expire_days: Quote::DEFAULT_AUTO_EXPIRE_DAYS,
        }
    }

    pub fn from_config(
        repository: Arc<dyn QuoteRepository>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        config: &AppConfig,
    ) -> Self {
        let mut service = Self::new(repository, clock, audit)
            .with_approval_policy(config.lifecycle.approval_policy())
            .with_retry_policy(RetryPolicy::from(&config.persistence));
        service.expiration = config.lifecycle.expiration_policy();
        service.default_auto_expire_days = config.lifecycle.default_auto_expire_days;
        service
    }

    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        let clock = self.machine.clock().clone();
        self.machine = QuoteStateMachine::new(policy, clock);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn expiration_policy(&self) -> ExpirationPolicy {
        self.expiration
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        Arc::clone(&self.audit)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.machine.clock().now()
    }

    pub async fn create_quote(
        &self,
        quote_id: Option<QuoteId>,
        correlation_id: &str,
    ) -> Result<Quote, ApplicationError> {
        let id = quote_id.unwrap_or_else(|| QuoteId(format!("Q-{}", Uuid::new_v4())));
        let quote = Quote::new(id, self.now(), self.default_auto_expire_days);

        self.retry
            .run("quote.insert", RepositoryError::is_transient, || self.repository.insert(&quote))
            .await
            .map_err(map_repository_error)?;

        info!(
            event_name = "quote.created",
            correlation_id,
            quote_id = %quote.id,
            auto_expire_after_days = quote.auto_expire_after_days,
            "quote created in building"
        );
        Ok(quote)
    }

    /// Loads the quote and runs one transition decision against it.
    pub async fn change_quote_status(
        &self,
        quote_id: &QuoteId,
        target: QuoteStatus,
        actor: &ActingUser,
        reason: Option<String>,
        correlation_id: &str,
    ) -> Result<StatusChange, ApplicationError> {
        let snapshot = self.load(quote_id).await?;
        self.transition_snapshot(&snapshot, target, actor, reason, correlation_id).await
    }

    /// Decides and persists a transition against a snapshot the caller
    /// already holds. Fails with `ConcurrencyConflict` if the stored quote
    /// has moved past `snapshot.version`.
    pub async fn transition_snapshot(
        &self,
        snapshot: &Quote,
        target: QuoteStatus,
        actor: &ActingUser,
        reason: Option<String>,
        correlation_id: &str,
    ) -> Result<StatusChange, ApplicationError> {
        let context =
            AuditContext::new(Some(snapshot.id.clone()), correlation_id, actor.id.clone());
        let result = self.machine.request_transition_with_audit(
            snapshot,
            target,
            actor,
            reason,
            self.audit.as_ref(),
            &context,
        );

        let applied = match result {
            TransitionResult::Applied(applied) => applied,
            TransitionResult::Rejected(rejection) => {
                info!(
                    event_name = "quote.status.rejected",
                    correlation_id,
                    quote_id = %snapshot.id,
                    from = %snapshot.status,
                    to = %target,
                    error = %rejection,
                    "quote status change rejected"
                );
                return Err(ApplicationError::from(rejection));
            }
            TransitionResult::PendingApproval(pending) => {
                info!(
                    event_name = "quote.status.pending_approval",
                    correlation_id,
                    quote_id = %snapshot.id,
                    from = %pending.from,
                    to = %pending.to,
                    required_role = %pending.required_role,
                    "quote status change needs approval"
                );
                return Ok(StatusChange::PendingApproval {
                    quote_id: snapshot.id.clone(),
                    current_status: pending.from,
                    requested_status: pending.to,
                    required_role: pending.required_role,
                    reason: pending.reason,
                });
            }
        };

        let saved = self
            .retry
            .run("quote.apply_transition", RepositoryError::is_transient, || {
                self.repository.apply_transition(snapshot, &applied)
            })
            .await
            .map_err(|error| {
                warn!(
                    event_name = "quote.status.persist_failed",
                    correlation_id,
                    quote_id = %snapshot.id,
                    from = %applied.from,
                    to = %applied.to,
                    error = %error,
                    "quote status change not persisted"
                );
                map_repository_error(error)
            })?;

        info!(
            event_name = "quote.status.applied",
            correlation_id,
            quote_id = %saved.id,
            from = %applied.from,
            to = %applied.to,
            actor = %applied.audit.status_changed_by,
            version = saved.version,
            "quote status changed"
        );

        Ok(StatusChange::Applied {
            quote_id: saved.id,
            new_status: applied.to,
            previous_status: applied.from,
            version: saved.version,
            changed_at: applied.audit.status_changed_at,
        })
    }

    pub async fn get_quote_status(
        &self,
        quote_id: &QuoteId,
    ) -> Result<QuoteStatusView, ApplicationError> {
        let quote = self.load(quote_id).await?;
        Ok(self.status_view(&quote))
    }

    pub fn status_view(&self, quote: &Quote) -> QuoteStatusView {
        let next_valid_states = reachable_from(quote.status)
            .iter()
            .copied()
            .filter(|target| validate(quote, quote.status, *target).valid)
            .collect();

        let (expiration_date, days_until_expiration) = if quote.status.is_expirable() {
            let decision = self.expiration.evaluate(quote, self.now());
            (Some(decision.expiration_date), Some(decision.days_remaining(quote)))
        } else {
            (None, None)
        };

        QuoteStatusView {
            quote_id: quote.id.clone(),
            status: quote.status,
            previous_status: quote.previous_status,
            next_valid_states,
            expiration_date,
            days_until_expiration,
            completeness: derive_completeness(quote),
            version: quote.version,
        }
    }

    pub async fn status_history(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<StatusHistoryEntry>, ApplicationError> {
        self.load(quote_id).await?;
        self.retry
            .run("quote.status_history", RepositoryError::is_transient, || {
                self.repository.status_history(quote_id)
            })
            .await
            .map_err(map_repository_error)
    }

    /// Quotes the expiration sweeper should evaluate, oldest activity first.
    pub async fn sweep_candidates(&self) -> Result<Vec<Quote>, ApplicationError> {
        const EXPIRABLE: [QuoteStatus; 2] = [QuoteStatus::Draft, QuoteStatus::Presented];
        self.retry
            .run("quote.list_expirable", RepositoryError::is_transient, || {
                self.repository.list_by_statuses(&EXPIRABLE)
            })
            .await
            .map_err(map_repository_error)
    }

    /// Versioned flag write that bypasses the state machine; status is untouched.
    pub async fn mark_expiration_warning_sent(
        &self,
        snapshot: &Quote,
        correlation_id: &str,
    ) -> Result<Quote, ApplicationError> {
        let sent_at = self.now();
        let saved = self
            .retry
            .run("quote.mark_warning_sent", RepositoryError::is_transient, || {
                self.repository.mark_expiration_warning_sent(snapshot, sent_at)
            })
            .await
            .map_err(map_repository_error)?;

        info!(
            event_name = "quote.expiration.warning_recorded",
            correlation_id,
            quote_id = %saved.id,
            version = saved.version,
            "expiration warning recorded"
        );
        Ok(saved)
    }

    async fn load(&self, quote_id: &QuoteId) -> Result<Quote, ApplicationError> {
        self.retry
            .run("quote.find", RepositoryError::is_transient, || {
                self.repository.find_by_id(quote_id)
            })
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| ApplicationError::QuoteNotFound(quote_id.0.clone()))
    }
}

pub fn map_repository_error(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::NotFound(quote_id) => ApplicationError::QuoteNotFound(quote_id),
        RepositoryError::AlreadyExists(quote_id) => ApplicationError::QuoteAlreadyExists(quote_id),
        RepositoryError::VersionConflict { quote_id, expected_version } => {
            ApplicationError::ConcurrencyConflict { quote_id, expected_version }
        }
        other => ApplicationError::Persistence(other.to_string()),
    }
}
