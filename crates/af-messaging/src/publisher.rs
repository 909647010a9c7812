//! Envelope construction and the publish path.

use crate::bus::Bus;
use crate::config::MessagingConfig;
use crate::egress::EgressPolicy;
use af_audit::{AppendParams, AuditEngine};
use af_storage::StoragePort;
use af_types::identity::ActorType;
use af_types::{AfError, AfResult, EnvelopeKind, MessageEnvelope};
use rand::RngCore;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Caller-supplied fields for a new envelope; everything else is filled in
/// by the publish path.
#[derive(Debug, Clone)]
pub struct PublishParams {
    pub tenant_id: Uuid,
    pub from_agent: String,
    pub to_agent: String,
    pub kind: EnvelopeKind,
    pub payload: Vec<u8>,
    pub metadata: serde_json::Value,
    pub cost: serde_json::Value,
    /// Ambient trace context to continue, if this publish happens inside an
    /// existing trace. `None` starts a new root trace.
    pub trace_context: Option<(String, String)>,
}

/// Owns the publish path: constructs, persists, publishes, and audits
/// envelopes. Parameterized over any `Bus`/`StoragePort` pair so tests can
/// swap in in-memory collaborators.
pub struct Publisher {
    storage: Arc<dyn StoragePort>,
    bus: Arc<dyn Bus>,
    audit: Arc<AuditEngine>,
    egress: Arc<dyn EgressPolicy>,
    config: MessagingConfig,
}

impl Publisher {
    pub fn new(
        storage: Arc<dyn StoragePort>,
        bus: Arc<dyn Bus>,
        audit: Arc<AuditEngine>,
        egress: Arc<dyn EgressPolicy>,
        config: MessagingConfig,
    ) -> Self {
        Self {
            storage,
            bus,
            audit,
            egress,
            config,
        }
    }

    /// Run the full publish pipeline and return the constructed envelope.
    ///
    /// The audit record for the publish attempt is written only after the
    /// bus has durably accepted the envelope — a backpressure rejection
    /// must leave no audit trail of the attempt, which requires the bus
    /// publish to happen before the audit append even though envelope
    /// persistence happens first.
    pub async fn publish(&self, params: PublishParams) -> AfResult<MessageEnvelope> {
        let id = Self::assign_id();
        let ts = Self::stamp_timestamp();
        let (trace_id, span_id) = Self::inject_trace_context(params.trace_context.as_ref());
        let envelope_hash = Self::compute_hash(
            &id,
            &params.tenant_id,
            &trace_id,
            &span_id,
            &params.from_agent,
            &params.to_agent,
            params.kind,
            &params.payload,
            &params.metadata,
            &params.cost,
            &ts,
        );

        let envelope = MessageEnvelope {
            id,
            tenant_id: params.tenant_id,
            trace_id,
            span_id,
            from_agent: params.from_agent,
            to_agent: params.to_agent,
            kind: params.kind,
            payload: params.payload,
            metadata: params.metadata,
            cost: params.cost,
            timestamp: ts,
            envelope_hash,
        };

        self.persist_envelope(&envelope).await?;
        self.egress.check(&envelope).await?;
        self.publish_to_bus(&envelope).await?;
        self.append_publish_audit(&envelope).await?;

        info!(
            tenant_id = %envelope.tenant_id,
            envelope_id = %envelope.id,
            subject = %envelope.subject(),
            "envelope published"
        );
        Ok(envelope)
    }

    fn assign_id() -> Uuid {
        Uuid::new_v4()
    }

    fn stamp_timestamp() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }

    /// Continue an existing trace context if one was supplied, else mint a
    /// fresh root trace/span id pair (16 and 8 random bytes, hex-encoded,
    /// matching W3C traceparent field widths).
    fn inject_trace_context(context: Option<&(String, String)>) -> (String, String) {
        match context {
            Some((trace_id, _parent_span_id)) => (trace_id.clone(), Self::new_span_id()),
            None => (Self::new_trace_id(), Self::new_span_id()),
        }
    }

    fn new_trace_id() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn new_span_id() -> String {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    #[allow(clippy::too_many_arguments)]
    fn compute_hash(
        id: &Uuid,
        tenant_id: &Uuid,
        trace_id: &str,
        span_id: &str,
        from_agent: &str,
        to_agent: &str,
        kind: EnvelopeKind,
        payload: &[u8],
        metadata: &serde_json::Value,
        cost: &serde_json::Value,
        ts: &chrono::DateTime<chrono::Utc>,
    ) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let body = MessageEnvelope::canonical_body(
            id, tenant_id, trace_id, span_id, from_agent, to_agent, kind, payload, metadata, cost, ts,
        );
        let mut hasher = Sha256::new();
        hasher.update(&body);
        hasher.finalize().into()
    }

    async fn persist_envelope(&self, envelope: &MessageEnvelope) -> AfResult<()> {
        self.storage.insert_envelope(envelope).await?;
        Ok(())
    }

    async fn publish_to_bus(&self, envelope: &MessageEnvelope) -> AfResult<()> {
        let subject = envelope.subject();
        match tokio::time::timeout(self.config.publish_deadline, self.bus.publish(&subject, envelope.clone())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(envelope_id = %envelope.id, subject = %subject, "publish deadline exceeded");
                Err(AfError::Backpressure)
            }
        }
    }

    async fn append_publish_audit(&self, envelope: &MessageEnvelope) -> AfResult<()> {
        self.audit
            .append(
                envelope.tenant_id,
                AppendParams {
                    actor_type: ActorType::Agent,
                    actor_id: envelope.from_agent.clone(),
                    action: "message.publish".into(),
                    resource_type: "envelope".into(),
                    resource_id: Some(envelope.id.to_string()),
                    details: serde_json::json!({ "subject": envelope.subject() }),
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use crate::egress::AllowAllEgressPolicy;
    use af_storage::SqliteStorage;

    fn publisher() -> (Publisher, Arc<InProcessBus>, Arc<AuditEngine>) {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let bus = Arc::new(InProcessBus::default());
        let audit = Arc::new(AuditEngine::new(storage.clone()));
        let egress = Arc::new(AllowAllEgressPolicy);
        (
            Publisher::new(storage, bus.clone(), audit.clone(), egress, MessagingConfig::default()),
            bus,
            audit,
        )
    }

    fn params(to_agent: &str) -> PublishParams {
        PublishParams {
            tenant_id: Uuid::new_v4(),
            from_agent: "planner".into(),
            to_agent: to_agent.into(),
            kind: EnvelopeKind::Request,
            payload: b"do the thing".to_vec(),
            metadata: serde_json::json!({}),
            cost: serde_json::json!({}),
            trace_context: None,
        }
    }

    #[tokio::test]
    async fn publish_assigns_hash_and_reaches_the_bus() {
        let (publisher, bus, _audit) = publisher();
        let mut sub = bus.subscribe("af.*.request.executor");

        let envelope = publisher.publish(params("executor")).await.unwrap();
        assert_eq!(envelope.trace_id.len(), 32);
        assert_eq!(envelope.span_id.len(), 16);

        let received = sub.recv().await.unwrap();
        assert_eq!(received.id, envelope.id);
        assert_eq!(received.envelope_hash, envelope.envelope_hash);
    }

    #[tokio::test]
    async fn publish_writes_an_audit_record() {
        let (publisher, _bus, audit) = publisher();
        let envelope = publisher.publish(params("executor")).await.unwrap();

        let result = audit.verify(envelope.tenant_id).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.total_records, 1);
    }
}
