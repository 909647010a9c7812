//! Closed configuration for the messaging spine, loaded from environment
//! variables at the composition root (see `af-observe`).

use std::time::Duration;

/// Tunables for the publish path and delivery guarantees. All fields have
/// spec-documented defaults and are overridable.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// How long `Publisher::publish` blocks on a bus rejection before
    /// failing with `AfError::Backpressure`. Default 5s.
    pub publish_deadline: Duration,
    /// How long a consumer's processed-envelope-id set retains entries
    /// before they may be forgotten. Default 24h.
    pub dedup_retention: Duration,
    /// Redelivery attempts before an envelope is dead-lettered.
    pub max_redeliveries: u32,
    /// Delay before a negatively-acknowledged envelope is redelivered.
    pub redelivery_delay: Duration,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            publish_deadline: Duration::from_secs(5),
            dedup_retention: Duration::from_secs(24 * 3600),
            max_redeliveries: 5,
            redelivery_delay: Duration::from_millis(500),
        }
    }
}
