//! Token claims — the signed payload carried by issued tokens.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims embedded in a signed JWT, and kept in-memory as the parsed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    /// Unique token identifier, used for revocation.
    pub jti: Uuid,
}

impl TokenClaims {
    /// `expires_at > issued_at` is a hard invariant enforced at issuance.
    pub fn is_well_formed(&self) -> bool {
        self.expires_at > self.issued_at
    }

    /// Whether the token is expired as of `now`, honoring a clock skew
    /// tolerance applied by the caller (not baked in here since the
    /// tolerance is a validation-time configuration value, not a claim).
    pub fn is_expired_at(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at <= now
    }
}
