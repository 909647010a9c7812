//! Audit record — one tamper-evident log entry in a tenant's hash chain.

use crate::canonical::{canonical_json_bytes, rfc3339_nanos};
use crate::identity::ActorType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry in a tenant's append-only, SHA-256-linked audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Opaque record id. Excluded from the canonical hash body.
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    /// UTC, monotonic-per-tenant at write time.
    pub ts: chrono::DateTime<chrono::Utc>,
    /// Insertion sequence, used to break timestamp ties stably.
    pub seq: i64,
    /// Nil for the genesis record.
    pub prev_hash: Option<[u8; 32]>,
    pub hash: [u8; 32],
}

impl AuditRecord {
    /// The canonical byte body hashed to produce `hash`:
    /// keys in fixed order (tenant_id, actor_type, actor_id, action,
    /// resource_type, resource_id, details, ts), `id` and `hash` excluded,
    /// `resource_id` emitted as explicit null when absent, `details`
    /// recursively key-sorted, timestamp RFC3339-nanosecond UTC with `Z`.
    pub fn canonical_body(
        tenant_id: &Uuid,
        actor_type: ActorType,
        actor_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: Option<&str>,
        details: &serde_json::Value,
        ts: &chrono::DateTime<chrono::Utc>,
    ) -> Vec<u8> {
        let value = serde_json::json!({
            "tenant_id": tenant_id.to_string(),
            "actor_type": actor_type,
            "actor_id": actor_id,
            "action": action,
            "resource_type": resource_type,
            "resource_id": resource_id,
            "details": details,
            "ts": rfc3339_nanos(ts),
        });
        // Object key order in `value` above already matches the fixed order
        // spec'd; only `details` needs recursive sorting, which
        // canonical_json_bytes applies uniformly (harmless for the already-
        // ordered outer keys since serde_json preserves insertion order with
        // the `preserve_order` feature disabled — so we serialize the outer
        // keys manually to guarantee order regardless of that feature).
        canonical_body_bytes(&value)
    }

    /// The byte string that is actually hashed: `prev_hash || body`, with
    /// the empty byte string used (not a sentinel) when `prev_hash` is nil.
    pub fn hash_input(prev_hash: Option<&[u8; 32]>, body: &[u8]) -> Vec<u8> {
        let mut input = Vec::with_capacity(32 + body.len());
        if let Some(prev) = prev_hash {
            input.extend_from_slice(prev);
        }
        input.extend_from_slice(body);
        input
    }
}

/// Serialize the fixed-order outer object manually so that field order is
/// guaranteed independent of `serde_json`'s map feature flags, while still
/// recursively sorting the `details` value's own keys.
fn canonical_body_bytes(value: &serde_json::Value) -> Vec<u8> {
    let obj = value.as_object().expect("canonical body is always an object");
    let fields = [
        "tenant_id",
        "actor_type",
        "actor_id",
        "action",
        "resource_type",
        "resource_id",
        "details",
        "ts",
    ];
    let mut out = Vec::new();
    out.push(b'{');
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(format!("{field:?}").as_bytes());
        out.push(b':');
        let v = obj.get(*field).unwrap_or(&serde_json::Value::Null);
        out.extend_from_slice(&canonical_json_bytes(v));
    }
    out.push(b'}');
    out
}

/// Result of running `Verify` over a tenant's chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub total_records: usize,
    pub verified_records: usize,
    pub first_tampered_index: Option<usize>,
    /// Index of the genesis record (always 0 when `total_records > 0`),
    /// surfaced explicitly since genesis tampering needs an external anchor
    /// to detect and callers should know whether they even reached it.
    pub genesis_index: Option<usize>,
    pub error_message: Option<String>,
    pub duration: std::time::Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_body_field_order_is_fixed() {
        let tenant = Uuid::nil();
        let ts = chrono::DateTime::parse_from_rfc3339("2025-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let body = AuditRecord::canonical_body(
            &tenant,
            ActorType::User,
            "u1",
            "create",
            "workflow",
            None,
            &serde_json::json!({}),
            &ts,
        );
        let s = String::from_utf8(body).unwrap();
        assert!(s.starts_with(r#"{"tenant_id""#));
        assert!(s.contains(r#""resource_id":null"#));
        assert!(s.ends_with(r#""ts":"2025-01-01T12:00:00.000000000Z"}"#));
    }

    #[test]
    fn hash_input_uses_empty_bytes_for_nil_prev_hash() {
        let body = b"abc".to_vec();
        let input = AuditRecord::hash_input(None, &body);
        assert_eq!(input, body);
    }
}
