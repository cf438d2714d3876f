use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserRole;
use crate::domain::quote::{Quote, QuoteStatus};
use crate::flows::engine::TransitionRejection;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    BuildingCompleted,
    DraftCreated,
    Presented,
    Signed,
    Completed,
    Cancelled,
    Expired,
}

impl Milestone {
    /// Milestone stamped the first time `status` is entered, if any.
    pub fn for_status(status: QuoteStatus) -> Option<Self> {
        match status {
            QuoteStatus::Building => None,
            QuoteStatus::Draft => Some(Self::DraftCreated),
            QuoteStatus::Presented => Some(Self::Presented),
            QuoteStatus::Signed => Some(Self::Signed),
            QuoteStatus::Completed => Some(Self::Completed),
            QuoteStatus::Cancelled => Some(Self::Cancelled),
            QuoteStatus::Expired => Some(Self::Expired),
        }
    }

    pub fn is_set(&self, quote: &Quote) -> bool {
        self.slot(quote).is_some()
    }

    fn slot(&self, quote: &Quote) -> Option<DateTime<Utc>> {
        match self {
            Self::BuildingCompleted => quote.building_completed_at,
            Self::DraftCreated => quote.draft_created_at,
            Self::Presented => quote.presented_at,
            Self::Signed => quote.signed_at,
            Self::Completed => quote.completed_at,
            Self::Cancelled => quote.cancelled_at,
            Self::Expired => quote.expired_at,
        }
    }

    fn slot_mut<'a>(&self, quote: &'a mut Quote) -> &'a mut Option<DateTime<Utc>> {
        match self {
            Self::BuildingCompleted => &mut quote.building_completed_at,
            Self::DraftCreated => &mut quote.draft_created_at,
            Self::Presented => &mut quote.presented_at,
            Self::Signed => &mut quote.signed_at,
            Self::Completed => &mut quote.completed_at,
            Self::Cancelled => &mut quote.cancelled_at,
            Self::Expired => &mut quote.expired_at,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneStamp {
    pub milestone: Milestone,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFields {
    pub previous_status: QuoteStatus,
    pub status_changed_at: DateTime<Utc>,
    pub status_changed_by: String,
    pub status_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedTransition {
    pub from: QuoteStatus,
    pub to: QuoteStatus,
    pub audit: AuditFields,
    pub milestones: Vec<MilestoneStamp>,
}

impl AppliedTransition {
    /// Writes the new status, audit triple, and unset milestones onto `quote`.
    ///
    /// Milestones already present on `quote` are left untouched. The
    /// transition also counts as quote activity, which restarts the
    /// inactivity window and re-arms the expiration warning.
    pub fn apply_to(&self, quote: &mut Quote) {
        quote.previous_status = Some(self.audit.previous_status);
        quote.status = self.to;
        quote.status_changed_at = Some(self.audit.status_changed_at);
        quote.status_changed_by = Some(self.audit.status_changed_by.clone());
        quote.status_reason = self.audit.status_reason.clone();

        for stamp in &self.milestones {
            let slot = stamp.milestone.slot_mut(quote);
            if slot.is_none() {
                *slot = Some(stamp.at);
            }
        }

        quote.last_activity_at = self.audit.status_changed_at;
        quote.expire_notification_sent = false;
        quote.expire_notification_sent_at = None;
        quote.updated_at = self.audit.status_changed_at;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub from: QuoteStatus,
    pub to: QuoteStatus,
    pub required_role: UserRole,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionResult {
    Applied(AppliedTransition),
    Rejected(TransitionRejection),
    PendingApproval(PendingApproval),
}

impl TransitionResult {
    pub fn applied(&self) -> Option<&AppliedTransition> {
        match self {
            Self::Applied(applied) => Some(applied),
            _ => None,
        }
    }

    pub fn rejection(&self) -> Option<&TransitionRejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    pub fn is_pending_approval(&self) -> bool {
        matches!(self, Self::PendingApproval(_))
    }
}
