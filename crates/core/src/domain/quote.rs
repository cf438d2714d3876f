use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Building,
    Draft,
    Presented,
    Signed,
    Completed,
    Cancelled,
    Expired,
}

impl QuoteStatus {
    pub const ALL: [QuoteStatus; 7] = [
        Self::Building,
        Self::Draft,
        Self::Presented,
        Self::Signed,
        Self::Completed,
        Self::Cancelled,
        Self::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Draft => "draft",
            Self::Presented => "presented",
            Self::Signed => "signed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "building" => Some(Self::Building),
            "draft" => Some(Self::Draft),
            "presented" => Some(Self::Presented),
            "signed" => Some(Self::Signed),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// No outbound transitions exist from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses the expiration sweeper scans.
    pub fn is_expirable(&self) -> bool {
        matches!(self, Self::Draft | Self::Presented)
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn extended_price(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl PatientInfo {
    pub fn has_full_name(&self) -> bool {
        present(&self.first_name) && present(&self.last_name)
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map(|value| !value.trim().is_empty()).unwrap_or(false)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub version: u32,
    pub status: QuoteStatus,
    pub previous_status: Option<QuoteStatus>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub status_changed_by: Option<String>,
    pub status_reason: Option<String>,

    pub patient: PatientInfo,
    pub exam_services: Vec<LineItem>,
    pub eyeglasses: Vec<LineItem>,
    pub contacts: Vec<LineItem>,

    pub building_completed: bool,
    pub presentation_completed: bool,
    pub exam_signature_completed: bool,
    pub materials_signature_completed: bool,
    pub fulfillment_completed: bool,

    pub building_completed_at: Option<DateTime<Utc>>,
    pub draft_created_at: Option<DateTime<Utc>>,
    pub presented_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,

    pub auto_expire_after_days: u32,
    pub last_activity_at: DateTime<Utc>,
    pub expire_notification_sent: bool,
    pub expire_notification_sent_at: Option<DateTime<Utc>>,

    pub total: Decimal,
    pub is_patient_owned_frame: bool,
    pub pof_inspection_completed: bool,
    pub pof_waiver_signed: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub const DEFAULT_AUTO_EXPIRE_DAYS: u32 = 30;

    /// A fresh quote in `Building` with no content, flags, or milestones.
    pub fn new(id: QuoteId, now: DateTime<Utc>, auto_expire_after_days: u32) -> Self {
        Self {
            id,
            version: 1,
            status: QuoteStatus::Building,
            previous_status: None,
            status_changed_at: None,
            status_changed_by: None,
            status_reason: None,
            patient: PatientInfo::default(),
            exam_services: Vec::new(),
            eyeglasses: Vec::new(),
            contacts: Vec::new(),
            building_completed: false,
            presentation_completed: false,
            exam_signature_completed: false,
            materials_signature_completed: false,
            fulfillment_completed: false,
            building_completed_at: None,
            draft_created_at: None,
            presented_at: None,
            signed_at: None,
            completed_at: None,
            cancelled_at: None,
            expired_at: None,
            auto_expire_after_days,
            last_activity_at: now,
            expire_notification_sent: false,
            expire_notification_sent_at: None,
            total: Decimal::ZERO,
            is_patient_owned_frame: false,
            pof_inspection_completed: false,
            pof_waiver_signed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_items(&self) -> bool {
        !self.exam_services.is_empty() || !self.eyeglasses.is_empty() || !self.contacts.is_empty()
    }

    pub fn line_items(&self) -> impl Iterator<Item = &LineItem> {
        self.exam_services.iter().chain(self.eyeglasses.iter()).chain(self.contacts.iter())
    }

    /// Sum of extended line prices; `total` itself is owned by the pricing screen.
    pub fn items_subtotal(&self) -> Decimal {
        self.line_items().map(LineItem::extended_price).sum()
    }

    pub fn customer_display_name(&self) -> Option<String> {
        if !self.patient.has_full_name() {
            return None;
        }
        let first = self.patient.first_name.as_deref().unwrap_or_default().trim();
        let last = self.patient.last_name.as_deref().unwrap_or_default().trim();
        Some(format!("{first} {last}"))
    }
}
