use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

use optiquote_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use optiquote_core::domain::actor::ActingUser;
use optiquote_core::domain::quote::{Quote, QuoteStatus};
use optiquote_core::errors::ApplicationError;
use optiquote_core::expiration::AUTO_EXPIRE_REASON;
use optiquote_core::notify::{ExpirationWarning, NotificationDispatcher, NotificationError};

use crate::lifecycle::{QuoteLifecycleService, StatusChange};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub warned: usize,
    pub expired: usize,
    /// Quotes skipped because another writer moved them mid-sweep.
    pub conflicts: usize,
    pub failures: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SweepOutcome {
    Untouched,
    Warned,
    Expired,
    Conflict,
    Failed,
}

#[derive(Clone)]
pub struct ExpirationSweeper {
    service: QuoteLifecycleService,
    notifier: Arc<dyn NotificationDispatcher>,
    max_concurrency: usize,
}

impl ExpirationSweeper {
    pub fn new(
        service: QuoteLifecycleService,
        notifier: Arc<dyn NotificationDispatcher>,
        max_concurrency: usize,
    ) -> Self {
        Self { service, notifier, max_concurrency: max_concurrency.max(1) }
    }

    /// One pass over every DRAFT/PRESENTED quote. Per-quote failures are
    /// counted, not propagated; only failing to list candidates aborts.
    pub async fn run_once(&self) -> Result<SweepReport, ApplicationError> {
        let correlation_id = format!("sweep-{}", Uuid::new_v4());
        let now = self.service.now();
        let candidates = self.service.sweep_candidates().await?;

        info!(
            event_name = "sweeper.pass.started",
            correlation_id = %correlation_id,
            quote_id = "batch",
            candidates = candidates.len(),
            "expiration sweep started"
        );

        let mut report = SweepReport { scanned: candidates.len(), ..SweepReport::default() };
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for quote in candidates {
            let sweeper = self.clone();
            let permits = Arc::clone(&permits);
            let correlation_id = correlation_id.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return SweepOutcome::Failed;
                };
                sweeper.sweep_quote(quote, now, &correlation_id).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(SweepOutcome::Untouched) => {}
                Ok(SweepOutcome::Warned) => report.warned += 1,
                Ok(SweepOutcome::Expired) => report.expired += 1,
                Ok(SweepOutcome::Conflict) => report.conflicts += 1,
                Ok(SweepOutcome::Failed) => report.failures += 1,
                Err(join_error) => {
                    error!(
                        event_name = "sweeper.task.panicked",
                        correlation_id = %correlation_id,
                        quote_id = "unknown",
                        error = %join_error,
                        "sweep task did not complete"
                    );
                    report.failures += 1;
                }
            }
        }

        info!(
            event_name = "sweeper.pass.completed",
            correlation_id = %correlation_id,
            quote_id = "batch",
            scanned = report.scanned,
            warned = report.warned,
            expired = report.expired,
            conflicts = report.conflicts,
            failures = report.failures,
            "expiration sweep completed"
        );
        self.service.audit_sink().emit(
            AuditEvent::new(
                None,
                correlation_id,
                "expiration.sweep_completed",
                AuditCategory::Expiration,
                ActingUser::SYSTEM_ID,
                if report.failures == 0 { AuditOutcome::Success } else { AuditOutcome::Failed },
                now,
            )
            .with_metadata("scanned", report.scanned.to_string())
            .with_metadata("warned", report.warned.to_string())
            .with_metadata("expired", report.expired.to_string())
            .with_metadata("conflicts", report.conflicts.to_string())
            .with_metadata("failures", report.failures.to_string()),
        );
        Ok(report)
    }

    async fn sweep_quote(
        &self,
        quote: Quote,
        now: DateTime<Utc>,
        correlation_id: &str,
    ) -> SweepOutcome {
        let decision = self.service.expiration_policy().evaluate(&quote, now);

        // Expiring makes the warning moot, so a quote never gets both in one pass.
        if decision.should_expire {
            return self.expire(&quote, decision.days_since_activity, correlation_id).await;
        }
        if decision.should_warn {
            let warning = ExpirationWarning::for_quote(
                &quote,
                decision.expiration_date,
                decision.days_remaining(&quote),
            );
            return self.warn(&quote, &warning, correlation_id).await;
        }
        SweepOutcome::Untouched
    }

    async fn expire(&self, quote: &Quote, idle_days: i64, correlation_id: &str) -> SweepOutcome {
        let result = self
            .service
            .transition_snapshot(
                quote,
                QuoteStatus::Expired,
                &ActingUser::system(),
                Some(AUTO_EXPIRE_REASON.to_string()),
                correlation_id,
            )
            .await;

        match result {
            Ok(StatusChange::Applied { .. }) => {
                info!(
                    event_name = "sweeper.quote.expired",
                    correlation_id,
                    quote_id = %quote.id,
                    idle_days,
                    "quote auto-expired"
                );
                SweepOutcome::Expired
            }
            Ok(StatusChange::PendingApproval { reason, .. }) => {
                error!(
                    event_name = "sweeper.quote.expire_blocked",
                    correlation_id,
                    quote_id = %quote.id,
                    reason = %reason,
                    "system actor was asked for approval"
                );
                SweepOutcome::Failed
            }
            Err(ApplicationError::ConcurrencyConflict { .. }) => {
                info!(
                    event_name = "sweeper.quote.conflict",
                    correlation_id,
                    quote_id = %quote.id,
                    "quote changed during sweep, skipping until next pass"
                );
                SweepOutcome::Conflict
            }
            Err(error) => {
                warn!(
                    event_name = "sweeper.quote.expire_failed",
                    correlation_id,
                    quote_id = %quote.id,
                    error = %error,
                    "auto-expiration failed"
                );
                SweepOutcome::Failed
            }
        }
    }

    async fn warn(
        &self,
        quote: &Quote,
        warning: &ExpirationWarning,
        correlation_id: &str,
    ) -> SweepOutcome {
        let delivered = self
            .service
            .retry_policy()
            .run("notification.expiration_warning", NotificationError::is_transient, || {
                self.notifier.dispatch_expiration_warning(warning)
            })
            .await;

        let audit = AuditEvent::new(
            Some(quote.id.clone()),
            correlation_id,
            "quote.expiration_warning",
            AuditCategory::Notification,
            ActingUser::SYSTEM_ID,
            if delivered.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failed },
            self.service.now(),
        )
        .with_metadata("days_remaining", warning.days_remaining.to_string())
        .with_metadata("expiration_date", warning.expiration_date.to_rfc3339());

        if let Err(error) = delivered {
            self.service.audit_sink().emit(audit.with_metadata("error", error.to_string()));
            warn!(
                event_name = "sweeper.quote.warning_failed",
                correlation_id,
                quote_id = %quote.id,
                error = %error,
                "expiration warning not delivered; will retry next pass"
            );
            return SweepOutcome::Failed;
        }
        self.service.audit_sink().emit(audit);

        match self.service.mark_expiration_warning_sent(quote, correlation_id).await {
            Ok(_) => SweepOutcome::Warned,
            Err(ApplicationError::ConcurrencyConflict { .. }) => SweepOutcome::Conflict,
            Err(error) => {
                warn!(
                    event_name = "sweeper.quote.warning_flag_failed",
                    correlation_id,
                    quote_id = %quote.id,
                    error = %error,
                    "warning delivered but flag not recorded"
                );
                SweepOutcome::Failed
            }
        }
    }

    /// Runs a sweep every `interval` until `shutdown` flips to true. Ticks
    /// missed while a slow pass runs are skipped rather than queued.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = self.run_once().await {
                            error!(
                                event_name = "sweeper.pass.failed",
                                correlation_id = "sweeper",
                                quote_id = "batch",
                                error = %error,
                                "expiration sweep aborted"
                            );
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!(
                                event_name = "sweeper.stopped",
                                correlation_id = "shutdown",
                                quote_id = "batch",
                                "expiration sweeper stopped"
                            );
                            break;
                        }
                    }
                }
            }
        })
    }
}
