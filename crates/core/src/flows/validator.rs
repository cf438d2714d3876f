use serde::{Deserialize, Serialize};

use crate::domain::quote::{Quote, QuoteStatus};
use crate::flows::completeness::derive_completeness;
use crate::flows::rules::{is_backward, is_reachable};

pub const ILLEGAL_TRANSITION_REASON: &str = "illegal transition";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmetCondition {
    MissingItems,
    MissingCustomerName,
    NonPositiveTotal,
    MissingExamSignature,
    MissingMaterialsSignature,
    MissingPofInspection,
    MissingPofWaiver,
    NotSigned,
    FulfillmentIncomplete,
}

impl UnmetCondition {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingItems => {
                "quote has no exam services, eyeglasses items, or contact lens items"
            }
            Self::MissingCustomerName => "customer first and last name are required",
            Self::NonPositiveTotal => "quote total must be greater than zero",
            Self::MissingExamSignature => "exam signature has not been captured",
            Self::MissingMaterialsSignature => "materials signature has not been captured",
            Self::MissingPofInspection => "patient-owned frame inspection is not completed",
            Self::MissingPofWaiver => "patient-owned frame waiver has not been signed",
            Self::NotSigned => "only signed quotes can be completed",
            Self::FulfillmentIncomplete => "fulfillment has not been completed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionValidation {
    pub valid: bool,
    pub reason: Option<String>,
    pub unmet: Vec<UnmetCondition>,
}

impl TransitionValidation {
    fn pass() -> Self {
        Self { valid: true, reason: None, unmet: Vec::new() }
    }

    fn illegal() -> Self {
        Self {
            valid: false,
            reason: Some(ILLEGAL_TRANSITION_REASON.to_string()),
            unmet: Vec::new(),
        }
    }

    fn from_unmet(unmet: Vec<UnmetCondition>) -> Self {
        if unmet.is_empty() {
            return Self::pass();
        }
        let reason = unmet.iter().map(UnmetCondition::message).collect::<Vec<_>>().join("; ");
        Self { valid: false, reason: Some(reason), unmet }
    }
}

/// Decides whether the quote's data permits `from -> to`.
///
/// Pure and deterministic. Backward moves along the progression
/// (e.g. `Presented -> Draft`) are not re-validated because they shed
/// obligations rather than add them.
pub fn validate(quote: &Quote, from: QuoteStatus, to: QuoteStatus) -> TransitionValidation {
    if !is_reachable(from, to) {
        return TransitionValidation::illegal();
    }
    if is_backward(from, to) {
        return TransitionValidation::pass();
    }

    let completeness = derive_completeness(quote);
    let mut unmet = Vec::new();

    match to {
        QuoteStatus::Draft => {
            if !completeness.has_items {
                unmet.push(UnmetCondition::MissingItems);
            }
        }
        QuoteStatus::Presented => {
            if !completeness.has_customer_info {
                unmet.push(UnmetCondition::MissingCustomerName);
            }
            if !completeness.has_positive_total {
                unmet.push(UnmetCondition::NonPositiveTotal);
            }
        }
        QuoteStatus::Signed => {
            if !completeness.exam_signed {
                unmet.push(UnmetCondition::MissingExamSignature);
            }
            if !completeness.materials_signed {
                unmet.push(UnmetCondition::MissingMaterialsSignature);
            }
            // Patient-owned frames add to the signature gate, never replace it.
            if quote.is_patient_owned_frame {
                if !quote.pof_inspection_completed {
                    unmet.push(UnmetCondition::MissingPofInspection);
                }
                if !quote.pof_waiver_signed {
                    unmet.push(UnmetCondition::MissingPofWaiver);
                }
            }
        }
        QuoteStatus::Completed => {
            if from != QuoteStatus::Signed {
                unmet.push(UnmetCondition::NotSigned);
            }
            if !completeness.is_fulfilled {
                unmet.push(UnmetCondition::FulfillmentIncomplete);
            }
        }
        QuoteStatus::Building | QuoteStatus::Cancelled | QuoteStatus::Expired => {}
    }

    TransitionValidation::from_unmet(unmet)
}
