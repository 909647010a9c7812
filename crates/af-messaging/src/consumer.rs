//! Subscription handling: hash verification, trace continuation, the
//! consumer callback, and the acknowledge/redeliver/dead-letter lifecycle.

use crate::bus::{Bus, Subscription};
use crate::config::MessagingConfig;
use af_audit::{AppendParams, AuditEngine};
use af_types::identity::ActorType;
use af_types::{EnvelopeKind, MessageEnvelope};
use dashmap::DashMap;
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// The callback a consumer hands each delivered envelope to. Returning `Err`
/// triggers negative-ack and redelivery.
pub type ConsumerCallback = Arc<dyn Fn(MessageEnvelope) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Binds a subject pattern, runs the receive pipeline for every matching
/// envelope, and drives the redelivery/dead-letter state machine.
pub struct Consumer {
    subscription: Subscription,
    bus: Arc<dyn Bus>,
    audit: Arc<AuditEngine>,
    callback: ConsumerCallback,
    config: MessagingConfig,
    subject: String,
    /// Redelivery attempts so far, per envelope id.
    attempts: DashMap<Uuid, u32>,
    /// Envelope ids already acknowledged, with the instant they were
    /// acknowledged. A redelivered or bus-duplicated envelope that lands
    /// here within `config.dedup_retention` is acknowledged again without
    /// re-invoking the callback; entries older than the retention horizon
    /// are evicted lazily on the next lookup.
    processed: DashMap<Uuid, Instant>,
}

impl Consumer {
    pub fn new(
        bus: Arc<dyn Bus>,
        audit: Arc<AuditEngine>,
        subject: impl Into<String>,
        callback: ConsumerCallback,
        config: MessagingConfig,
    ) -> Self {
        let subject = subject.into();
        let subscription = bus.subscribe(&subject);
        Self {
            subscription,
            bus,
            audit,
            callback,
            config,
            subject,
            attempts: DashMap::new(),
            processed: DashMap::new(),
        }
    }

    /// Run the receive loop until the underlying subscription closes.
    pub async fn run(mut self) {
        loop {
            match self.subscription.recv().await {
                Ok(envelope) => self.handle(envelope).await,
                Err(e) => {
                    warn!(error = %e, "consumer subscription ended");
                    break;
                }
            }
        }
    }

    async fn handle(&self, envelope: MessageEnvelope) {
        if !Self::hash_matches(&envelope) {
            self.audit_hash_mismatch(&envelope).await;
            return;
        }

        if self.already_processed(envelope.id) {
            info!(envelope_id = %envelope.id, "duplicate delivery, acknowledging without re-invoking callback");
            return;
        }

        let span = info_span!(
            "messaging.consume",
            af.tenant = %envelope.tenant_id,
            af.from_agent = %envelope.from_agent,
            af.to_agent = %envelope.to_agent,
            af.message.type = %envelope.kind,
            af.message.id = %envelope.id,
            trace_id = %envelope.trace_id,
        );

        let outcome = (self.callback)(envelope.clone()).instrument(span).await;
        match outcome {
            Ok(()) => {
                self.attempts.remove(&envelope.id);
                self.processed.insert(envelope.id, Instant::now());
                info!(envelope_id = %envelope.id, "envelope acknowledged");
            }
            Err(reason) => self.negative_ack(envelope, reason).await,
        }
    }

    /// Checks whether `id` was acknowledged within `dedup_retention`,
    /// evicting it (and any other now-stale entry) along the way so the map
    /// doesn't grow unbounded for a long-lived consumer.
    fn already_processed(&self, id: Uuid) -> bool {
        self.processed
            .retain(|_, acked_at| acked_at.elapsed() < self.config.dedup_retention);
        self.processed.contains_key(&id)
    }

    fn hash_matches(envelope: &MessageEnvelope) -> bool {
        let body = MessageEnvelope::canonical_body(
            &envelope.id,
            &envelope.tenant_id,
            &envelope.trace_id,
            &envelope.span_id,
            &envelope.from_agent,
            &envelope.to_agent,
            envelope.kind,
            &envelope.payload,
            &envelope.metadata,
            &envelope.cost,
            &envelope.timestamp,
        );
        let mut hasher = Sha256::new();
        hasher.update(&body);
        let recomputed: [u8; 32] = hasher.finalize().into();
        recomputed == envelope.envelope_hash
    }

    async fn audit_hash_mismatch(&self, envelope: &MessageEnvelope) {
        warn!(envelope_id = %envelope.id, "envelope hash mismatch, dropping");
        if let Err(e) = self
            .audit
            .append(
                envelope.tenant_id,
                AppendParams {
                    actor_type: ActorType::System,
                    actor_id: "messaging-spine".into(),
                    action: "message.hash_mismatch".into(),
                    resource_type: "envelope".into(),
                    resource_id: Some(envelope.id.to_string()),
                    details: serde_json::json!({ "subject": envelope.subject() }),
                },
            )
            .await
        {
            error!(error = %e, "failed to audit hash mismatch");
        }
    }

    async fn negative_ack(&self, envelope: MessageEnvelope, reason: String) {
        let attempt = {
            let mut entry = self.attempts.entry(envelope.id).or_insert(0);
            *entry += 1;
            *entry
        };

        if attempt > self.config.max_redeliveries {
            self.dead_letter(&envelope, &reason).await;
            return;
        }

        warn!(
            envelope_id = %envelope.id,
            attempt,
            reason = %reason,
            "callback failed, scheduling redelivery"
        );
        let bus = self.bus.clone();
        let subject = self.subject_for(&envelope);
        let delay = self.config.redelivery_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Redelivery reuses the same id and hash; envelopes are
            // immutable once published.
            let _ = bus.publish(&subject, envelope).await;
        });
    }

    fn subject_for(&self, envelope: &MessageEnvelope) -> String {
        if self.subject.contains('*') {
            envelope.subject()
        } else {
            self.subject.clone()
        }
    }

    async fn dead_letter(&self, envelope: &MessageEnvelope, reason: &str) {
        error!(envelope_id = %envelope.id, reason, "envelope dead-lettered");
        self.attempts.remove(&envelope.id);
        if let Err(e) = self
            .audit
            .append(
                envelope.tenant_id,
                AppendParams {
                    actor_type: ActorType::System,
                    actor_id: "messaging-spine".into(),
                    action: "message.dead_lettered".into(),
                    resource_type: "envelope".into(),
                    resource_id: Some(envelope.id.to_string()),
                    details: serde_json::json!({ "reason": reason }),
                },
            )
            .await
        {
            error!(error = %e, "failed to audit dead-letter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use crate::publisher::{PublishParams, Publisher};
    use af_storage::SqliteStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn envelope_with_bad_hash() -> MessageEnvelope {
        MessageEnvelope {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            trace_id: "a".repeat(32),
            span_id: "b".repeat(16),
            from_agent: "planner".into(),
            to_agent: "executor".into(),
            kind: EnvelopeKind::Request,
            payload: b"hello".to_vec(),
            metadata: serde_json::json!({}),
            cost: serde_json::json!({}),
            timestamp: chrono::Utc::now(),
            envelope_hash: [0xAAu8; 32],
        }
    }

    #[tokio::test]
    async fn tampered_envelope_is_dropped_and_audited() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let bus = Arc::new(InProcessBus::default());
        let audit = Arc::new(AuditEngine::new(storage.clone()));

        let bad = envelope_with_bad_hash();
        let tenant = bad.tenant_id;
        let subject = bad.subject();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let callback: ConsumerCallback = Arc::new(move |_env| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let consumer = Consumer::new(bus.clone(), audit.clone(), subject.clone(), callback, MessagingConfig::default());
        bus.publish(&subject, bad).await.unwrap();

        // Drive one receive cycle directly rather than spawning `run` so the
        // test doesn't need to race a background task.
        let mut sub = bus.subscribe(&subject);
        let envelope = sub.recv().await.unwrap();
        consumer.handle(envelope).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let result = audit.verify(tenant).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.total_records, 1);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_acknowledged_without_reinvoking_callback() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let bus = Arc::new(InProcessBus::default());
        let audit = Arc::new(AuditEngine::new(storage.clone()));
        let egress = Arc::new(crate::egress::AllowAllEgressPolicy);

        let publisher = Publisher::new(storage.clone(), bus.clone(), audit.clone(), egress, MessagingConfig::default());
        let envelope = publisher
            .publish(PublishParams {
                tenant_id: Uuid::new_v4(),
                from_agent: "planner".into(),
                to_agent: "executor".into(),
                kind: EnvelopeKind::Request,
                payload: b"task".to_vec(),
                metadata: serde_json::json!({}),
                cost: serde_json::json!({}),
                trace_context: None,
            })
            .await
            .unwrap();
        let subject = envelope.subject();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let callback: ConsumerCallback = Arc::new(move |_env| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let consumer = Consumer::new(bus.clone(), audit.clone(), subject, callback, MessagingConfig::default());
        // The same envelope delivered twice (a bus redelivering after a
        // transient ack failure on its own side, independent of our
        // negative-ack path) must only run the callback once.
        consumer.handle(envelope.clone()).await;
        consumer.handle(envelope).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_callback_redelivers_until_dead_lettered() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let bus = Arc::new(InProcessBus::default());
        let audit = Arc::new(AuditEngine::new(storage.clone()));
        let egress = Arc::new(crate::egress::AllowAllEgressPolicy);

        let publisher = Publisher::new(
            storage.clone(),
            bus.clone(),
            audit.clone(),
            egress,
            MessagingConfig::default(),
        );
        let envelope = publisher
            .publish(PublishParams {
                tenant_id: Uuid::new_v4(),
                from_agent: "planner".into(),
                to_agent: "executor".into(),
                kind: EnvelopeKind::Request,
                payload: b"task".to_vec(),
                metadata: serde_json::json!({}),
                cost: serde_json::json!({}),
                trace_context: None,
            })
            .await
            .unwrap();
        let tenant = envelope.tenant_id;
        let subject = envelope.subject();

        let callback: ConsumerCallback = Arc::new(|_env| Box::pin(async move { Err("boom".to_string()) }));
        let mut config = MessagingConfig::default();
        config.max_redeliveries = 1;
        config.redelivery_delay = Duration::from_millis(5);

        let consumer = Arc::new(Consumer::new(bus.clone(), audit.clone(), subject.clone(), callback, config));
        let mut sub = bus.subscribe(&subject);

        // First delivery: nack, redeliver.
        let env1 = sub.recv().await.unwrap();
        consumer.handle(env1).await;

        // Second delivery (after redelivery delay): nack again, exceeds
        // max_redeliveries, dead-lettered.
        let env2 = sub.recv().await.unwrap();
        consumer.handle(env2).await;

        let result = audit.verify(tenant).await.unwrap();
        assert!(result.valid);
        // message.publish + message.dead_lettered
        assert_eq!(result.total_records, 2);
    }
}
