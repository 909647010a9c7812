//! The Storage Port: the minimal interface the core requires from any
//! backing relational + KV store.

use af_types::{AfResult, AuditRecord, MessageEnvelope, Role};
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// The tenant's current chain tail, read before computing the next
/// record's `prev_hash`.
#[derive(Debug, Clone, Copy)]
pub struct AuditTail {
    pub hash: [u8; 32],
    pub seq: i64,
}

#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Read the tenant's current tail hash/sequence, or `None` if the
    /// tenant has no records yet (the next append will be genesis).
    async fn get_audit_tail(&self, tenant_id: Uuid) -> AfResult<Option<AuditTail>>;

    /// Persist `record` and advance the tail, but only if the tail's
    /// sequence still equals `expected_tail_seq` (CAS). Returns
    /// `AfError::Conflict` if a concurrent appender already advanced the
    /// tail; the caller must re-read and recompute before retrying.
    async fn try_append_audit(&self, record: &AuditRecord, expected_tail_seq: Option<i64>) -> AfResult<()>;

    /// The most recently appended record for a tenant, or `None`.
    async fn get_latest_audit(&self, tenant_id: Uuid) -> AfResult<Option<AuditRecord>>;

    /// All of a tenant's records ordered by `(ts, seq)`, as a consistent
    /// snapshot taken under one read transaction.
    async fn stream_audits(&self, tenant_id: Uuid) -> AfResult<Vec<AuditRecord>>;

    /// Persist an envelope. Unique on `id`; redelivery of an already-seen
    /// id is a no-op (idempotent by construction, not an error).
    async fn insert_envelope(&self, envelope: &MessageEnvelope) -> AfResult<bool>;

    /// Whether an envelope id has already been persisted (dedup check).
    async fn envelope_exists(&self, id: Uuid) -> AfResult<bool>;

    /// Roles bound to `user_id` within `tenant_id`.
    async fn lookup_role_bindings(&self, tenant_id: Uuid, user_id: Uuid) -> AfResult<Vec<Role>>;

    /// Atomically increment the counter at `key` (creating it at 1 with
    /// the given TTL if absent) and return the new value.
    async fn kv_incr_and_get(&self, key: &str, ttl: Duration) -> AfResult<i64>;

    /// Read the counter at `key`, or `None` if absent/expired.
    async fn kv_get(&self, key: &str) -> AfResult<Option<i64>>;

    /// Mark a token `jti` as revoked.
    async fn revoke_token(&self, jti: Uuid) -> AfResult<()>;

    /// Whether `jti` is in the revocation set.
    async fn is_token_revoked(&self, jti: Uuid) -> AfResult<bool>;
}
