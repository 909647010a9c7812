//! Tunables for the Auth & RBAC Gate. Secrets and endpoint URLs are not
//! modeled here — they're supplied to the verifier constructors directly by
//! the composition root, which is where environment variables are read.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Upper bound on a requested token TTL; `issue_token` rejects anything
    /// longer. Default 24h.
    pub max_ttl: Duration,
    /// Clock skew tolerance applied when checking token expiry. Default 30s.
    pub clock_skew: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_ttl: Duration::from_secs(24 * 3600),
            clock_skew: Duration::from_secs(30),
        }
    }
}
