//! Tenant — the root of isolation. Every persistent row and bus subject
//! carries a tenant id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription/service tier, used to shape quota defaults downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantTier {
    Free,
    Standard,
    Enterprise,
}

impl std::fmt::Display for TenantTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Standard => write!(f, "standard"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// A tenant — the isolation boundary. Created administratively; never
/// deleted while any dependent row exists except as a deliberate, audited
/// cascade operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub tier: TenantTier,
    pub settings: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Lowercase UUID string as used in bus subjects (`af.<tenant_id>.…`).
pub fn tenant_subject_segment(id: &Uuid) -> String {
    id.as_hyphenated().to_string().to_lowercase()
}
