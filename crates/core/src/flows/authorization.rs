use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserRole;
use crate::domain::quote::QuoteStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Signing above this total needs more than a sales associate.
    pub high_value_threshold: Decimal,
}

impl ApprovalPolicy {
    pub const DEFAULT_HIGH_VALUE_THRESHOLD: i64 = 10_000;

    pub fn new(high_value_threshold: Decimal) -> Self {
        Self { high_value_threshold }
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::new(Decimal::from(Self::DEFAULT_HIGH_VALUE_THRESHOLD))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalRequirement {
    NotRequired,
    Required { required_role: UserRole, reason: String },
}

impl ApprovalRequirement {
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required { .. })
    }
}

impl ApprovalPolicy {
    /// Role gate applied after the data validator. Independent of completeness.
    pub fn requires_approval(
        &self,
        from: QuoteStatus,
        to: QuoteStatus,
        role: UserRole,
        total: Decimal,
    ) -> ApprovalRequirement {
        if from == QuoteStatus::Signed
            && to == QuoteStatus::Cancelled
            && !role.satisfies(UserRole::Manager)
        {
            return ApprovalRequirement::Required {
                required_role: UserRole::Manager,
                reason: format!(
                    "cancelling a signed quote requires manager approval (role `{role}`)"
                ),
            };
        }

        if to == QuoteStatus::Signed
            && role == UserRole::SalesAssociate
            && total > self.high_value_threshold
        {
            return ApprovalRequirement::Required {
                required_role: UserRole::Manager,
                reason: format!(
                    "quote total {total} exceeds the high-value threshold {}",
                    self.high_value_threshold
                ),
            };
        }

        ApprovalRequirement::NotRequired
    }
}
