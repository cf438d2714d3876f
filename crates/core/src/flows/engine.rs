use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::clock::{Clock, SystemClock};
use crate::domain::actor::ActingUser;
use crate::domain::quote::{Quote, QuoteStatus};
use crate::flows::authorization::{ApprovalPolicy, ApprovalRequirement};
use crate::flows::rules::is_reachable;
use crate::flows::states::{
    AppliedTransition, AuditFields, Milestone, MilestoneStamp, PendingApproval, TransitionResult,
};
use crate::flows::validator::{validate, UnmetCondition};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionRejection {
    #[error("no-op transition not allowed: quote is already {status:?}")]
    NoOp { status: QuoteStatus },
    #[error("structurally illegal transition from {from:?} to {to:?}")]
    IllegalTransition { from: QuoteStatus, to: QuoteStatus },
    #[error("transition from {from:?} to {to:?} blocked: {reason}")]
    PreconditionFailed {
        from: QuoteStatus,
        to: QuoteStatus,
        reason: String,
        unmet: Vec<UnmetCondition>,
    },
}

/// Stateless orchestrator for quote status changes.
///
/// Every call is a total function of the quote snapshot, target, actor and
/// reason; the only ambient input is the injected clock. Callers persist the
/// returned [`AppliedTransition`] under their own concurrency guard.
#[derive(Clone, Debug)]
pub struct QuoteStateMachine<C = SystemClock> {
    policy: ApprovalPolicy,
    clock: C,
}

impl Default for QuoteStateMachine<SystemClock> {
    fn default() -> Self {
        Self::new(ApprovalPolicy::default(), SystemClock)
    }
}

impl<C> QuoteStateMachine<C>
where
    C: Clock,
{
    pub fn new(policy: ApprovalPolicy, clock: C) -> Self {
        Self { policy, clock }
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn request_transition(
        &self,
        quote: &Quote,
        target: QuoteStatus,
        actor: &ActingUser,
        reason: Option<String>,
    ) -> TransitionResult {
        let from = quote.status;

        if target == from {
            return TransitionResult::Rejected(TransitionRejection::NoOp { status: from });
        }

        if !is_reachable(from, target) {
            return TransitionResult::Rejected(TransitionRejection::IllegalTransition {
                from,
                to: target,
            });
        }

        let validation = validate(quote, from, target);
        if !validation.valid {
            return TransitionResult::Rejected(TransitionRejection::PreconditionFailed {
                from,
                to: target,
                reason: validation.reason.unwrap_or_default(),
                unmet: validation.unmet,
            });
        }

        if let ApprovalRequirement::Required { required_role, reason } =
            self.policy.requires_approval(from, target, actor.role, quote.total)
        {
            return TransitionResult::PendingApproval(PendingApproval {
                from,
                to: target,
                required_role,
                reason,
            });
        }

        let now = self.clock.now();
        let mut milestones = Vec::new();
        if from == QuoteStatus::Building
            && matches!(target, QuoteStatus::Draft | QuoteStatus::Presented)
            && !Milestone::BuildingCompleted.is_set(quote)
        {
            milestones.push(MilestoneStamp { milestone: Milestone::BuildingCompleted, at: now });
        }
        if let Some(milestone) = Milestone::for_status(target) {
            if !milestone.is_set(quote) {
                milestones.push(MilestoneStamp { milestone, at: now });
            }
        }

        TransitionResult::Applied(AppliedTransition {
            from,
            to: target,
            audit: AuditFields {
                previous_status: from,
                status_changed_at: now,
                status_changed_by: actor.id.clone(),
                status_reason: reason,
            },
            milestones,
        })
    }

    pub fn request_transition_with_audit<S>(
        &self,
        quote: &Quote,
        target: QuoteStatus,
        actor: &ActingUser,
        reason: Option<String>,
        sink: &S,
        audit: &AuditContext,
    ) -> TransitionResult
    where
        S: AuditSink + ?Sized,
    {
        let result = self.request_transition(quote, target, actor, reason);
        let (event_type, outcome) = match &result {
            TransitionResult::Applied(_) => ("quote.transition_applied", AuditOutcome::Success),
            TransitionResult::Rejected(_) => ("quote.transition_rejected", AuditOutcome::Rejected),
            TransitionResult::PendingApproval(_) => {
                ("quote.transition_pending_approval", AuditOutcome::Deferred)
            }
        };

        let occurred_at = match &result {
            TransitionResult::Applied(applied) => applied.audit.status_changed_at,
            _ => self.clock.now(),
        };

        let mut event = AuditEvent::new(
            Some(quote.id.clone()),
            audit.correlation_id.clone(),
            event_type,
            AuditCategory::Lifecycle,
            actor.id.clone(),
            outcome,
            occurred_at,
        )
        .with_metadata("from", quote.status.as_str())
        .with_metadata("to", target.as_str())
        .with_metadata("role", actor.role.as_str());

        match &result {
            TransitionResult::Applied(applied) => {
                for stamp in &applied.milestones {
                    event = event.with_metadata(
                        format!("milestone.{}", milestone_key(stamp.milestone)),
                        stamp.at.to_rfc3339(),
                    );
                }
            }
            TransitionResult::Rejected(rejection) => {
                event = event.with_metadata("error", rejection.to_string());
            }
            TransitionResult::PendingApproval(pending) => {
                event = event
                    .with_metadata("required_role", pending.required_role.as_str())
                    .with_metadata("reason", pending.reason.clone());
            }
        }

        sink.emit(event);
        result
    }
}

fn milestone_key(milestone: Milestone) -> &'static str {
    match milestone {
        Milestone::BuildingCompleted => "building_completed_at",
        Milestone::DraftCreated => "draft_created_at",
        Milestone::Presented => "presented_at",
        Milestone::Signed => "signed_at",
        Milestone::Completed => "completed_at",
        Milestone::Cancelled => "cancelled_at",
        Milestone::Expired => "expired_at",
    }
}
