use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    SalesAssociate,
    Manager,
    Admin,
    /// Identity used by scheduled jobs such as the expiration sweeper.
    System,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SalesAssociate => "sales_associate",
            Self::Manager => "manager",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sales_associate" | "associate" => Some(Self::SalesAssociate),
            "manager" => Some(Self::Manager),
            "admin" => Some(Self::Admin),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn authority_rank(&self) -> u8 {
        match self {
            Self::SalesAssociate => 1,
            Self::Manager => 2,
            Self::Admin | Self::System => 3,
        }
    }

    pub fn satisfies(&self, required: UserRole) -> bool {
        self.authority_rank() >= required.authority_rank()
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingUser {
    pub id: String,
    pub role: UserRole,
}

impl ActingUser {
    pub const SYSTEM_ID: &'static str = "system:expiration-sweeper";

    pub fn new(id: impl Into<String>, role: UserRole) -> Self {
        Self { id: id.into(), role }
    }

    pub fn system() -> Self {
        Self::new(Self::SYSTEM_ID, UserRole::System)
    }
}
