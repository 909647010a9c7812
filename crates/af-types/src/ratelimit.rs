//! Rate counter key shape shared between the limiter and the KV port.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key identifying one sliding-window counter: `(tenant, endpoint,
/// window_bucket)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateCounterKey {
    pub tenant_id: Uuid,
    pub endpoint: String,
    /// Which fixed sub-bucket of the sliding window this counter belongs to.
    pub window_bucket: u64,
}

impl RateCounterKey {
    /// The string form stored as the KV key, e.g.
    /// `ratelimit:<tenant>:<endpoint>:<bucket>`.
    pub fn kv_key(&self) -> String {
        format!(
            "ratelimit:{}:{}:{}",
            self.tenant_id, self.endpoint, self.window_bucket
        )
    }
}

/// Admission decision returned to the HTTP layer for response headers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateDecision {
    pub admitted: bool,
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: chrono::DateTime<chrono::Utc>,
}
