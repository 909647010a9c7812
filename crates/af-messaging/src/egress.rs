//! Egress policy hook: an injection point on the publish path for
//! deployments that need to gate outbound messages (e.g. data-residency
//! rules) without baking that policy into the core spine.

use af_types::{AfResult, MessageEnvelope};
use async_trait::async_trait;

/// Invoked immediately before an envelope is published to the bus. The
/// default implementation allows everything; a residency-strict deployment
/// supplies its own.
#[async_trait]
pub trait EgressPolicy: Send + Sync {
    async fn check(&self, envelope: &MessageEnvelope) -> AfResult<()>;
}

/// Allow-all default, used when no policy is configured.
pub struct AllowAllEgressPolicy;

#[async_trait]
impl EgressPolicy for AllowAllEgressPolicy {
    async fn check(&self, _envelope: &MessageEnvelope) -> AfResult<()> {
        Ok(())
    }
}
