//! Bus port: the durable pub/sub collaborator the spine publishes onto and
//! consumes from, plus an in-process reference implementation built on a
//! single broadcast channel.

use crate::subject::SubjectPattern;
use af_types::{AfError, AfResult, MessageEnvelope};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

/// The minimal interface a durable message bus must provide. A production
/// deployment would back this with NATS, Kafka, or similar; wiring an actual
/// broker client is infrastructure, not core logic, and stays out of scope
/// here.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish `envelope` on `subject`. Returns `AfError::BusUnavailable` if
    /// the bus cannot accept publishes at all (not merely congested —
    /// congestion is the caller's `publish_deadline` timeout to detect).
    async fn publish(&self, subject: &str, envelope: MessageEnvelope) -> AfResult<()>;

    /// Bind to a subject pattern; `*` matches exactly one segment.
    fn subscribe(&self, pattern: &str) -> Subscription;
}

/// A live binding to a subject pattern, filtering the underlying broadcast
/// stream down to subjects the pattern matches.
pub struct Subscription {
    pattern: SubjectPattern,
    rx: broadcast::Receiver<(String, MessageEnvelope)>,
}

impl Subscription {
    /// Wait for the next envelope whose subject matches this subscription's
    /// pattern, skipping everything else on the shared stream.
    pub async fn recv(&mut self) -> AfResult<MessageEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok((subject, envelope)) if self.pattern.matches(&subject) => return Ok(envelope),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "bus subscriber lagged, dropped messages");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(AfError::BusUnavailable("subscription channel closed".into()));
                }
            }
        }
    }
}

/// Single-process reference implementation of the Bus port: one broadcast
/// channel shared by all subjects, filtered per-subscriber. Suitable for
/// tests and small single-node deployments; not a production broker client.
pub struct InProcessBus {
    sender: broadcast::Sender<(String, MessageEnvelope)>,
}

impl InProcessBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Bus for InProcessBus {
    async fn publish(&self, subject: &str, envelope: MessageEnvelope) -> AfResult<()> {
        // `send` only errors when there are zero receivers; that is not a
        // publish failure (fire-and-forget broadcast semantics are fine for
        // a bus with no subscribers yet).
        let _ = self.sender.send((subject.to_string(), envelope));
        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> Subscription {
        Subscription {
            pattern: SubjectPattern::parse(pattern),
            rx: self.sender.subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_types::EnvelopeKind;
    use uuid::Uuid;

    fn envelope(to_agent: &str) -> MessageEnvelope {
        MessageEnvelope {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            trace_id: "a".repeat(32),
            span_id: "b".repeat(16),
            from_agent: "planner".into(),
            to_agent: to_agent.into(),
            kind: EnvelopeKind::Request,
            payload: vec![],
            metadata: serde_json::json!({}),
            cost: serde_json::json!({}),
            timestamp: chrono::Utc::now(),
            envelope_hash: [0u8; 32],
        }
    }

    #[tokio::test]
    async fn subscriber_only_receives_matching_subjects() {
        let bus = InProcessBus::default();
        let mut sub = bus.subscribe("af.t1.request.executor");

        bus.publish("af.t1.request.planner", envelope("planner")).await.unwrap();
        bus.publish("af.t1.request.executor", envelope("executor")).await.unwrap();

        let received = sub.recv().await.unwrap();
        assert_eq!(received.to_agent, "executor");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = InProcessBus::default();
        bus.publish("af.t1.event.executor", envelope("executor")).await.unwrap();
    }
}
