//! Message envelope — the self-describing unit exchanged on the bus.

use crate::canonical::canonical_json_bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of message carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Request,
    Response,
    Event,
    Control,
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Response => write!(f, "response"),
            Self::Event => write!(f, "event"),
            Self::Control => write!(f, "control"),
        }
    }
}

/// Lifecycle state of an envelope from construction through terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeState {
    Drafting,
    Hashed,
    Persisted,
    Published,
    Redelivering,
    Ack,
    DeadLettered,
}

/// Cost accounting bag attached to an envelope (tokens, dollars, etc. — the
/// unit is caller-defined; the spine treats it as opaque structured data).
pub type CostBag = serde_json::Value;

/// The agent-to-agent message unit published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// 16-byte trace id, hex-encoded (32 hex chars).
    pub trace_id: String,
    /// 8-byte span id, hex-encoded (16 hex chars).
    pub span_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub kind: EnvelopeKind,
    /// Opaque payload bytes. Base64-encoded on the wire when non-UTF-8.
    pub payload: Vec<u8>,
    pub metadata: serde_json::Value,
    pub cost: CostBag,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub envelope_hash: [u8; 32],
}

impl MessageEnvelope {
    /// The canonical byte body hashed to produce `envelope_hash`: every
    /// field except `envelope_hash` itself, in a fixed key order, with the
    /// payload canonicalized as base64 so the hash is well-defined over
    /// arbitrary bytes.
    pub fn canonical_body(
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
        timestamp: &chrono::DateTime<chrono::Utc>,
    ) -> Vec<u8> {
        use base64::Engine;
        let payload_b64 = base64::engine::general_purpose::STANDARD.encode(payload);
        let fields: [(&str, serde_json::Value); 11] = [
            ("id", serde_json::json!(id.to_string())),
            ("tenant_id", serde_json::json!(tenant_id.to_string())),
            ("trace_id", serde_json::json!(trace_id)),
            ("span_id", serde_json::json!(span_id)),
            ("from_agent", serde_json::json!(from_agent)),
            ("to_agent", serde_json::json!(to_agent)),
            ("kind", serde_json::json!(kind)),
            ("payload", serde_json::json!(payload_b64)),
            ("metadata", metadata.clone()),
            ("cost", cost.clone()),
            (
                "timestamp",
                serde_json::json!(crate::canonical::rfc3339_nanos(timestamp)),
            ),
        ];
        let mut out = Vec::new();
        out.push(b'{');
        for (i, (key, val)) in fields.iter().enumerate() {
            if i > 0 {
                out.push(b',');
            }
            out.extend_from_slice(format!("{key:?}").as_bytes());
            out.push(b':');
            out.extend_from_slice(&canonical_json_bytes(val));
        }
        out.push(b'}');
        out
    }

    /// The bus subject this envelope is published/consumed under:
    /// `af.<tenant_id>.<kind>.<to_agent>`.
    pub fn subject(&self) -> String {
        format!(
            "af.{}.{}.{}",
            crate::tenant::tenant_subject_segment(&self.tenant_id),
            self.kind,
            self.to_agent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_is_lowercase_tenant_dot_kind_dot_agent() {
        let env = MessageEnvelope {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            trace_id: "a".repeat(32),
            span_id: "b".repeat(16),
            from_agent: "planner".into(),
            to_agent: "executor".into(),
            kind: EnvelopeKind::Request,
            payload: vec![],
            metadata: serde_json::json!({}),
            cost: serde_json::json!({}),
            timestamp: chrono::Utc::now(),
            envelope_hash: [0u8; 32],
        };
        assert_eq!(
            env.subject(),
            format!("af.{}.request.executor", Uuid::nil())
        );
    }

    #[test]
    fn canonical_body_is_deterministic() {
        let ts = chrono::Utc::now();
        let b1 = MessageEnvelope::canonical_body(
            &Uuid::nil(),
            &Uuid::nil(),
            "t",
            "s",
            "a",
            "b",
            EnvelopeKind::Event,
            b"hello",
            &serde_json::json!({}),
            &serde_json::json!({}),
            &ts,
        );
        let b2 = MessageEnvelope::canonical_body(
            &Uuid::nil(),
            &Uuid::nil(),
            "t",
            "s",
            "a",
            "b",
            EnvelopeKind::Event,
            b"hello",
            &serde_json::json!({}),
            &serde_json::json!({}),
            &ts,
        );
        assert_eq!(b1, b2);
    }
}
