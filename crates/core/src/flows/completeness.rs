use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::Quote;

/// Completion flags derived on demand from a quote snapshot.
///
/// The validator and the status read model share this projection so the UI
/// and the state machine never disagree about what is missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completeness {
    pub has_items: bool,
    pub has_customer_info: bool,
    pub has_positive_total: bool,
    pub exam_signed: bool,
    pub materials_signed: bool,
    pub is_signed: bool,
    pub is_fulfilled: bool,
    pub is_pof_ready: bool,
}

pub fn derive_completeness(quote: &Quote) -> Completeness {
    let exam_signed = quote.exam_signature_completed;
    let materials_signed = quote.materials_signature_completed;
    let is_pof_ready = !quote.is_patient_owned_frame
        || (quote.pof_inspection_completed && quote.pof_waiver_signed);

    Completeness {
        has_items: quote.has_items(),
        has_customer_info: quote.patient.has_full_name(),
        has_positive_total: quote.total > Decimal::ZERO,
        exam_signed,
        materials_signed,
        is_signed: exam_signed && materials_signed,
        is_fulfilled: quote.fulfillment_completed,
        is_pof_ready,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::derive_completeness;
    use crate::domain::quote::{LineItem, PatientInfo, Quote, QuoteId};

    fn quote() -> Quote {
        Quote::new(QuoteId("Q-C-1".to_string()), Utc::now(), 30)
    }

    #[test]
    fn empty_quote_is_incomplete_but_pof_ready() {
        let completeness = derive_completeness(&quote());
        assert!(!completeness.has_items);
        assert!(!completeness.has_customer_info);
        assert!(!completeness.has_positive_total);
        assert!(!completeness.is_signed);
        assert!(!completeness.is_fulfilled);
        assert!(completeness.is_pof_ready, "non-POF quotes have nothing to inspect");
    }

    #[test]
    fn signed_requires_both_signatures() {
        let mut quote = quote();
        quote.exam_signature_completed = true;
        assert!(!derive_completeness(&quote).is_signed);

        quote.materials_signature_completed = true;
        let completeness = derive_completeness(&quote);
        assert!(completeness.exam_signed && completeness.materials_signed);
        assert!(completeness.is_signed);
    }

    #[test]
    fn pof_readiness_needs_inspection_and_waiver() {
        let mut quote = quote();
        quote.is_patient_owned_frame = true;
        assert!(!derive_completeness(&quote).is_pof_ready);

        quote.pof_inspection_completed = true;
        assert!(!derive_completeness(&quote).is_pof_ready);

        quote.pof_waiver_signed = true;
        assert!(derive_completeness(&quote).is_pof_ready);
    }

    #[test]
    fn content_and_customer_flags_follow_quote_fields() {
        let mut quote = quote();
        quote.eyeglasses.push(LineItem {
            sku: "FR-ACETATE-01".to_string(),
            description: "Acetate frame".to_string(),
            quantity: 1,
            unit_price: Decimal::new(14900, 2),
        });
        quote.patient = PatientInfo {
            first_name: Some("Grace".to_string()),
            last_name: Some("Hopper".to_string()),
            ..PatientInfo::default()
        };
        quote.total = Decimal::new(14900, 2);

        let completeness = derive_completeness(&quote);
        assert!(completeness.has_items);
        assert!(completeness.has_customer_info);
        assert!(completeness.has_positive_total);
    }
}
