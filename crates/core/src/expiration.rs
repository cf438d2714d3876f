use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::quote::Quote;

pub const AUTO_EXPIRE_REASON: &str = "auto-expired";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationPolicy {
    /// Days before the expiration threshold at which a warning is due.
    pub warning_lead_days: u32,
}

impl ExpirationPolicy {
    pub const DEFAULT_WARNING_LEAD_DAYS: u32 = 3;

    pub fn new(warning_lead_days: u32) -> Self {
        Self { warning_lead_days }
    }

    /// Pure sweep decision for one quote at `now`.
    ///
    /// Statuses outside DRAFT/PRESENTED never expire or warn, but still report
    /// their elapsed inactivity and projected expiration date.
    pub fn evaluate(&self, quote: &Quote, now: DateTime<Utc>) -> ExpirationDecision {
        let days_since_activity = days_since_activity(quote, now);
        let expiration_date = expiration_date(quote);

        if !quote.status.is_expirable() {
            return ExpirationDecision {
                days_since_activity,
                should_expire: false,
                should_warn: false,
                expiration_date,
            };
        }

        let threshold = i64::from(quote.auto_expire_after_days);
        let warn_at = threshold - i64::from(self.warning_lead_days);

        ExpirationDecision {
            days_since_activity,
            should_expire: days_since_activity >= threshold,
            should_warn: days_since_activity >= warn_at && !quote.expire_notification_sent,
            expiration_date,
        }
    }
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WARNING_LEAD_DAYS)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationDecision {
    pub days_since_activity: i64,
    pub should_expire: bool,
    pub should_warn: bool,
    pub expiration_date: DateTime<Utc>,
}

impl ExpirationDecision {
    /// Whole days left before the quote expires; zero once it is due.
    pub fn days_remaining(&self, quote: &Quote) -> u32 {
        let remaining = i64::from(quote.auto_expire_after_days) - self.days_since_activity;
        u32::try_from(remaining.max(0)).unwrap_or(0)
    }
}

/// Whole elapsed days since the last activity, clamped at zero for clock skew.
pub fn days_since_activity(quote: &Quote, now: DateTime<Utc>) -> i64 {
    (now - quote.last_activity_at).num_days().max(0)
}

pub fn expiration_date(quote: &Quote) -> DateTime<Utc> {
    quote.last_activity_at + Duration::days(i64::from(quote.auto_expire_after_days))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{days_since_activity, expiration_date, ExpirationPolicy};
    use crate::domain::quote::{Quote, QuoteId, QuoteStatus};

    fn draft_idle_for(days: i64) -> (Quote, chrono::DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 5, 20, 6, 0, 0).unwrap();
        let mut quote = Quote::new(QuoteId("Q-EXP".to_string()), now - Duration::days(days), 30);
        quote.status = QuoteStatus::Draft;
        (quote, now)
    }

    #[test]
    fn quote_idle_past_threshold_expires() {
        let (quote, now) = draft_idle_for(35);
        let decision = ExpirationPolicy::default().evaluate(&quote, now);
        assert_eq!(decision.days_since_activity, 35);
        assert!(decision.should_expire);
    }

    #[test]
    fn recently_active_quote_is_left_alone() {
        let (quote, now) = draft_idle_for(5);
        let decision = ExpirationPolicy::default().evaluate(&quote, now);
        assert!(!decision.should_expire);
        assert!(!decision.should_warn);
        assert_eq!(decision.days_remaining(&quote), 25);
    }

    #[test]
    fn warning_window_opens_before_expiry() {
        let (quote, now) = draft_idle_for(28);
        let decision = ExpirationPolicy::default().evaluate(&quote, now);
        assert!(decision.should_warn);
        assert!(!decision.should_expire);

        let (quote, now) = draft_idle_for(27);
        assert!(ExpirationPolicy::default().evaluate(&quote, now).should_warn, "warn-at is 27");

        let (quote, now) = draft_idle_for(26);
        assert!(!ExpirationPolicy::default().evaluate(&quote, now).should_warn);
    }

    #[test]
    fn warning_is_sent_once() {
        let (mut quote, now) = draft_idle_for(28);
        quote.expire_notification_sent = true;
        let decision = ExpirationPolicy::default().evaluate(&quote, now);
        assert!(!decision.should_warn);
    }

    #[test]
    fn partial_days_round_down() {
        let (quote, now) = draft_idle_for(29);
        let decision = ExpirationPolicy::default().evaluate(&quote, now - Duration::hours(1));
        assert_eq!(decision.days_since_activity, 28);
        assert!(!decision.should_expire);
    }

    #[test]
    fn non_expirable_statuses_never_expire() {
        for status in [
            QuoteStatus::Building,
            QuoteStatus::Signed,
            QuoteStatus::Completed,
            QuoteStatus::Cancelled,
            QuoteStatus::Expired,
        ] {
            let (mut quote, now) = draft_idle_for(90);
            quote.status = status;
            let decision = ExpirationPolicy::default().evaluate(&quote, now);
            assert!(!decision.should_expire, "{status:?}");
            assert!(!decision.should_warn, "{status:?}");
        }
    }

    #[test]
    fn activity_in_the_future_clamps_to_zero() {
        let (quote, now) = draft_idle_for(0);
        assert_eq!(days_since_activity(&quote, now - Duration::days(2)), 0);
    }

    #[test]
    fn expiration_date_projects_from_last_activity() {
        let (quote, _) = draft_idle_for(10);
        assert_eq!(expiration_date(&quote), quote.last_activity_at + Duration::days(30));
    }
}
