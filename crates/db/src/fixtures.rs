use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use optiquote_core::domain::quote::{LineItem, PatientInfo, Quote, QuoteId, QuoteStatus};

use crate::connection::DbPool;
use crate::repositories::{QuoteRepository, RepositoryError, SqlQuoteRepository};

/// Deterministic demo quotes covering each lifecycle situation an operator
/// wants to see locally: a fresh build, a stale draft the sweeper will expire,
/// a presented quote inside the warning window, a high-value signing that
/// needs a manager, a patient-owned frame missing its waiver, and a signed
/// order awaiting fulfillment.
const SEED_QUOTES: &[SeedQuoteContract] = &[
    SeedQuoteContract {
        quote_id: "Q-DEMO-BUILDING",
        status: QuoteStatus::Building,
        idle_days: 0,
        total_cents: 0,
        signatures: false,
        patient_owned_frame: false,
        description: "New quote still in the builder",
    },
    SeedQuoteContract {
        quote_id: "Q-DEMO-DRAFT",
        status: QuoteStatus::Draft,
        idle_days: 6,
        total_cents: 38_900,
        signatures: false,
        patient_owned_frame: false,
        description: "Draft ready to present",
    },
    SeedQuoteContract {
        quote_id: "Q-DEMO-WARN",
        status: QuoteStatus::Presented,
        idle_days: 28,
        total_cents: 61_250,
        signatures: false,
        patient_owned_frame: false,
        description: "Presented quote inside the expiration warning window",
    },
    SeedQuoteContract {
        quote_id: "Q-DEMO-STALE",
        status: QuoteStatus::Draft,
        idle_days: 41,
        total_cents: 21_500,
        signatures: false,
        patient_owned_frame: false,
        description: "Abandoned draft past its expiration threshold",
    },
    SeedQuoteContract {
        quote_id: "Q-DEMO-HIGH-VALUE",
        status: QuoteStatus::Presented,
        idle_days: 2,
        total_cents: 1_245_000,
        signatures: true,
        patient_owned_frame: false,
        description: "High-value quote; associates need manager approval to sign",
    },
    SeedQuoteContract {
        quote_id: "Q-DEMO-POF",
        status: QuoteStatus::Presented,
        idle_days: 1,
        total_cents: 29_900,
        signatures: true,
        patient_owned_frame: true,
        description: "Patient-owned frame inspected but waiver unsigned",
    },
    SeedQuoteContract {
        quote_id: "Q-DEMO-SIGNED",
        status: QuoteStatus::Signed,
        idle_days: 3,
        total_cents: 47_400,
        signatures: true,
        patient_owned_frame: false,
        description: "Signed order awaiting lab fulfillment",
    },
];

pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub fn quotes(now: DateTime<Utc>) -> Vec<Quote> {
        SEED_QUOTES.iter().map(|contract| contract.build(now)).collect()
    }

    /// Inserts any demo quote not already present. Existing rows are left
    /// untouched, so reloading never rewinds a quote someone has moved.
    pub async fn load(pool: &DbPool, now: DateTime<Utc>) -> Result<SeedResult, RepositoryError> {
        let repo = SqlQuoteRepository::new(pool.clone());
        let mut quotes_seeded = Vec::new();

        for contract in SEED_QUOTES {
            let quote = contract.build(now);
            let inserted = if repo.find_by_id(&quote.id).await?.is_none() {
                repo.insert(&quote).await?;
                true
            } else {
                false
            };
            quotes_seeded.push(SeedQuoteInfo {
                quote_id: contract.quote_id,
                status: contract.status,
                description: contract.description,
                inserted,
            });
        }

        Ok(SeedResult { quotes_seeded })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let repo = SqlQuoteRepository::new(pool.clone());
        let mut checks = Vec::new();

        for contract in SEED_QUOTES {
            let present = repo.find_by_id(&QuoteId(contract.quote_id.to_string())).await?.is_some();
            checks.push((contract.quote_id, present));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let repo = SqlQuoteRepository::new(pool.clone());
        for contract in SEED_QUOTES {
            repo.delete(&QuoteId(contract.quote_id.to_string())).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedQuoteContract {
    quote_id: &'static str,
    status: QuoteStatus,
    idle_days: i64,
    total_cents: i64,
    signatures: bool,
    patient_owned_frame: bool,
    description: &'static str,
}

impl SeedQuoteContract {
    fn build(&self, now: DateTime<Utc>) -> Quote {
        let created_at = now - Duration::days(self.idle_days + 1);
        let mut quote = Quote::new(
            QuoteId(self.quote_id.to_string()),
            created_at,
            Quote::DEFAULT_AUTO_EXPIRE_DAYS,
        );
        quote.status = self.status;
        quote.last_activity_at = now - Duration::days(self.idle_days);
        quote.updated_at = quote.last_activity_at;

        if self.total_cents > 0 {
            quote.patient = PatientInfo {
                first_name: Some("Mary".to_string()),
                last_name: Some("Jackson".to_string()),
                email: Some(format!("{}@patients.example.com", self.quote_id.to_lowercase())),
                phone: Some("555-0199".to_string()),
            };
            quote.exam_services.push(LineItem {
                sku: "EXAM-COMP".to_string(),
                description: "Comprehensive eye exam".to_string(),
                quantity: 1,
                unit_price: Decimal::new(9_500, 2),
            });
            quote.eyeglasses.push(LineItem {
                sku: "LENS-PROG-AR".to_string(),
                description: "Progressive lenses with anti-reflective coating".to_string(),
                quantity: 1,
                unit_price: Decimal::new(self.total_cents - 9_500, 2),
            });
            quote.total = Decimal::new(self.total_cents, 2);
            quote.building_completed = true;
            quote.presentation_completed = true;
        }

        quote.exam_signature_completed = self.signatures;
        quote.materials_signature_completed = self.signatures;
        quote.is_patient_owned_frame = self.patient_owned_frame;
        quote.pof_inspection_completed = self.patient_owned_frame;

        let entered_at = Some(quote.last_activity_at);
        match self.status {
            QuoteStatus::Draft => {
                quote.building_completed_at = entered_at;
                quote.draft_created_at = entered_at;
            }
            QuoteStatus::Presented => {
                quote.building_completed_at = entered_at;
                quote.presented_at = entered_at;
            }
            QuoteStatus::Signed => {
                quote.building_completed_at = entered_at;
                quote.presented_at = entered_at;
                quote.signed_at = entered_at;
            }
            _ => {}
        }
        quote
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub quotes_seeded: Vec<SeedQuoteInfo>,
}

#[derive(Debug)]
pub struct SeedQuoteInfo {
    pub quote_id: &'static str,
    pub status: QuoteStatus,
    pub description: &'static str,
    pub inserted: bool,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
