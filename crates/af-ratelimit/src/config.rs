//! Tunables for the sliding-window limiter, overridable per endpoint
//! (`AF_RATE_LIMIT_<endpoint>` at the composition root).

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Total window covered by the sub-buckets. Default 60s.
    pub window: Duration,
    /// Fixed sub-bucket count the window is divided into. Default 10.
    pub sub_buckets: u32,
    /// Requests admitted per window when no endpoint-specific override
    /// applies.
    pub default_limit: u32,
    /// Per-endpoint overrides, keyed by request path.
    pub overrides: HashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            sub_buckets: 10,
            default_limit: 120,
            overrides: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    pub fn limit_for(&self, endpoint: &str) -> u32 {
        self.overrides.get(endpoint).copied().unwrap_or(self.default_limit)
    }

    /// Width of a single sub-bucket, at least one second.
    pub fn bucket_width_secs(&self) -> u64 {
        (self.window.as_secs() / self.sub_buckets.max(1) as u64).max(1)
    }
}
