//! Static adjacency table for quote statuses.
//!
//! The table only rules out transitions that are impossible regardless of
//! quote content; data gates live in the validator.

use crate::domain::quote::QuoteStatus;

const FROM_BUILDING: &[QuoteStatus] =
    &[QuoteStatus::Draft, QuoteStatus::Presented, QuoteStatus::Cancelled];
const FROM_DRAFT: &[QuoteStatus] = &[
    QuoteStatus::Building,
    QuoteStatus::Presented,
    QuoteStatus::Cancelled,
    QuoteStatus::Expired,
];
const FROM_PRESENTED: &[QuoteStatus] = &[
    QuoteStatus::Building,
    QuoteStatus::Draft,
    QuoteStatus::Signed,
    QuoteStatus::Cancelled,
    QuoteStatus::Expired,
];
const FROM_SIGNED: &[QuoteStatus] = &[QuoteStatus::Completed, QuoteStatus::Cancelled];
const FROM_EXPIRED: &[QuoteStatus] = &[QuoteStatus::Building, QuoteStatus::Draft];

pub fn reachable_from(from: QuoteStatus) -> &'static [QuoteStatus] {
    match from {
        QuoteStatus::Building => FROM_BUILDING,
        QuoteStatus::Draft => FROM_DRAFT,
        QuoteStatus::Presented => FROM_PRESENTED,
        QuoteStatus::Signed => FROM_SIGNED,
        QuoteStatus::Completed | QuoteStatus::Cancelled => &[],
        QuoteStatus::Expired => FROM_EXPIRED,
    }
}

pub fn is_reachable(from: QuoteStatus, to: QuoteStatus) -> bool {
    reachable_from(from).contains(&to)
}

fn progression_rank(status: QuoteStatus) -> Option<u8> {
    match status {
        QuoteStatus::Building => Some(0),
        QuoteStatus::Draft => Some(1),
        QuoteStatus::Presented => Some(2),
        QuoteStatus::Signed => Some(3),
        QuoteStatus::Completed => Some(4),
        QuoteStatus::Cancelled | QuoteStatus::Expired => None,
    }
}

/// True when both statuses sit on the main progression and `to` ranks lower.
/// Revivals out of `Expired` are not backward moves.
pub fn is_backward(from: QuoteStatus, to: QuoteStatus) -> bool {
    match (progression_rank(from), progression_rank(to)) {
        (Some(from_rank), Some(to_rank)) => to_rank < from_rank,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{is_backward, is_reachable, reachable_from};
    use crate::domain::quote::QuoteStatus;

    #[test]
    fn table_matches_documented_adjacency() {
        use QuoteStatus::*;
        let expected: [(QuoteStatus, &[QuoteStatus]); 7] = [
            (Building, &[Draft, Presented, Cancelled]),
            (Draft, &[Building, Presented, Cancelled, Expired]),
            (Presented, &[Building, Draft, Signed, Cancelled, Expired]),
            (Signed, &[Completed, Cancelled]),
            (Completed, &[]),
            (Cancelled, &[]),
            (Expired, &[Building, Draft]),
        ];

        let mut reachable_pairs = 0;
        for (from, targets) in expected {
            for to in QuoteStatus::ALL {
                assert_eq!(
                    is_reachable(from, to),
                    targets.contains(&to),
                    "unexpected reachability for {from:?} -> {to:?}"
                );
                if is_reachable(from, to) {
                    reachable_pairs += 1;
                }
            }
        }
        assert_eq!(reachable_pairs, 16);
    }

    #[test]
    fn no_status_reaches_itself() {
        for status in QuoteStatus::ALL {
            assert!(!is_reachable(status, status));
        }
    }

    #[test]
    fn terminal_statuses_have_no_outbound_edges() {
        for status in QuoteStatus::ALL.into_iter().filter(QuoteStatus::is_terminal) {
            assert!(reachable_from(status).is_empty());
        }
    }

    #[test]
    fn expired_revives_only_into_building_or_draft() {
        assert!(is_reachable(QuoteStatus::Expired, QuoteStatus::Draft));
        assert!(is_reachable(QuoteStatus::Expired, QuoteStatus::Building));
        assert!(!is_reachable(QuoteStatus::Expired, QuoteStatus::Presented));
    }

    #[test]
    fn backward_moves_are_detected_along_the_progression() {
        assert!(is_backward(QuoteStatus::Presented, QuoteStatus::Draft));
        assert!(is_backward(QuoteStatus::Draft, QuoteStatus::Building));
        assert!(!is_backward(QuoteStatus::Building, QuoteStatus::Draft));
        assert!(!is_backward(QuoteStatus::Expired, QuoteStatus::Draft));
        assert!(!is_backward(QuoteStatus::Signed, QuoteStatus::Cancelled));
    }
}
