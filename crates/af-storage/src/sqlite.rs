//! SQLite implementation of the Storage Port. Holds one connection behind
//! a mutex; SQLite itself only ever allows one writer, so this is a
//! faithful reflection of the backing store's own concurrency model
//! rather than an arbitrary in-process global lock.

use crate::port::{AuditTail, StoragePort};
use crate::schema::SCHEMA;
use af_types::identity::ActorType;
use af_types::{AfError, AfResult, AuditRecord, MessageEnvelope, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// A SQLite-backed `StoragePort`. Holds one connection behind a mutex —
/// SQLite itself only ever allows one writer, so this is a faithful
/// reflection of the backing store's concurrency model, not an arbitrary
/// in-process global lock.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (creating if absent) a SQLite database at `path` and apply the
    /// schema.
    pub fn open(path: &Path) -> AfResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Self::init(conn)
    }

    /// An in-memory database, used by tests and by single-process demos.
    pub fn open_in_memory() -> AfResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AfResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> AfResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AfError::StorageUnavailable("connection mutex poisoned".into()))
    }

    /// Seed a tenant/role/binding used in tests and local bootstrap.
    pub fn seed_tenant(&self, tenant_id: Uuid, name: &str) -> AfResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO tenants (id, name, tier, settings, created_at) VALUES (?1, ?2, 'standard', '{}', ?3)",
            params![tenant_id.to_string(), name, Utc::now().to_rfc3339()],
        )
        .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Create a role with the given permissions for a tenant; returns the
    /// new role id.
    pub fn create_role(&self, tenant_id: Uuid, name: &str, permissions: &[String]) -> AfResult<Uuid> {
        let id = Uuid::new_v4();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO roles (id, tenant_id, name, permissions) VALUES (?1, ?2, ?3, ?4)",
            params![
                id.to_string(),
                tenant_id.to_string(),
                name,
                serde_json::to_string(permissions).unwrap_or_default()
            ],
        )
        .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(id)
    }

    /// Bind a role to a user within a tenant.
    pub fn bind_role(&self, tenant_id: Uuid, user_id: Uuid, role_id: Uuid) -> AfResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO role_bindings (tenant_id, user_id, role_id) VALUES (?1, ?2, ?3)",
            params![tenant_id.to_string(), user_id.to_string(), role_id.to_string()],
        )
        .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Mutate a stored record's `action` column directly, bypassing the
    /// append-only API. Used only by tamper-detection tests to simulate an
    /// operator bypassing the engine and editing the database file
    /// directly — exactly the threat the hash chain exists to catch.
    #[cfg(feature = "test-util")]
    pub fn test_corrupt_action(&self, tenant_id: Uuid, seq: i64, new_action: &str) -> AfResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE audit_records SET action = ?1 WHERE tenant_id = ?2 AND seq = ?3",
            params![new_action, tenant_id.to_string(), seq],
        )
        .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Delete a stored record directly, bypassing the append-only API.
    /// Used only by gap-detection tests.
    #[cfg(feature = "test-util")]
    pub fn test_delete_record(&self, tenant_id: Uuid, seq: i64) -> AfResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM audit_records WHERE tenant_id = ?1 AND seq = ?2",
            params![tenant_id.to_string(), seq],
        )
        .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }
}

fn row_to_audit_record(row: &rusqlite::Row) -> rusqlite::Result<AuditRecord> {
    let id: String = row.get("id")?;
    let tenant_id: String = row.get("tenant_id")?;
    let actor_type: String = row.get("actor_type")?;
    let actor_id: String = row.get("actor_id")?;
    let action: String = row.get("action")?;
    let resource_type: String = row.get("resource_type")?;
    let resource_id: Option<String> = row.get("resource_id")?;
    let details: String = row.get("details")?;
    let ts: String = row.get("ts")?;
    let seq: i64 = row.get("seq")?;
    let prev_hash: Option<Vec<u8>> = row.get("prev_hash")?;
    let hash: Vec<u8> = row.get("hash")?;

    Ok(AuditRecord {
        id: Uuid::from_str(&id).unwrap_or_default(),
        tenant_id: Uuid::from_str(&tenant_id).unwrap_or_default(),
        actor_type: match actor_type.as_str() {
            "user" => ActorType::User,
            "agent" => ActorType::Agent,
            _ => ActorType::System,
        },
        actor_id,
        action,
        resource_type,
        resource_id,
        details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
        ts: DateTime::parse_from_rfc3339(&ts)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        seq,
        prev_hash: prev_hash.and_then(|b| b.try_into().ok()),
        hash: hash.try_into().unwrap_or([0u8; 32]),
    })
}

#[async_trait]
impl StoragePort for SqliteStorage {
    async fn get_audit_tail(&self, tenant_id: Uuid) -> AfResult<Option<AuditTail>> {
        let conn = self.lock()?;
        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT hash, seq FROM audit_tail WHERE tenant_id = ?1",
                params![tenant_id.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(row.map(|(hash, seq)| AuditTail {
            hash: hash.try_into().unwrap_or([0u8; 32]),
            seq,
        }))
    }

    async fn try_append_audit(&self, record: &AuditRecord, expected_tail_seq: Option<i64>) -> AfResult<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;

        let current_seq: Option<i64> = tx
            .query_row(
                "SELECT seq FROM audit_tail WHERE tenant_id = ?1",
                params![record.tenant_id.to_string()],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;

        if current_seq != expected_tail_seq {
            warn!(
                tenant_id = %record.tenant_id,
                expected_tail_seq = ?expected_tail_seq,
                current_seq = ?current_seq,
                "audit tail CAS conflict, caller must retry"
            );
            return Err(AfError::Conflict(format!(
                "audit tail advanced concurrently for tenant {}",
                record.tenant_id
            )));
        }

        tx.execute(
            "INSERT INTO audit_records (id, tenant_id, actor_type, actor_id, action, resource_type, resource_id, details, ts, seq, prev_hash, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.id.to_string(),
                record.tenant_id.to_string(),
                record.actor_type.to_string(),
                record.actor_id,
                record.action,
                record.resource_type,
                record.resource_id,
                serde_json::to_string(&record.details).map_err(|e| AfError::Serialization(e.to_string()))?,
                af_types::canonical::rfc3339_nanos(&record.ts),
                record.seq,
                record.prev_hash.map(|h| h.to_vec()),
                record.hash.to_vec(),
            ],
        )
        .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;

        tx.execute(
            "INSERT INTO audit_tail (tenant_id, hash, seq) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id) DO UPDATE SET hash = ?2, seq = ?3",
            params![record.tenant_id.to_string(), record.hash.to_vec(), record.seq],
        )
        .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;

        tx.commit().map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_latest_audit(&self, tenant_id: Uuid) -> AfResult<Option<AuditRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM audit_records WHERE tenant_id = ?1 ORDER BY ts DESC, seq DESC LIMIT 1",
            params![tenant_id.to_string()],
            row_to_audit_record,
        )
        .optional()
        .map_err(|e| AfError::StorageUnavailable(e.to_string()))
    }

    async fn stream_audits(&self, tenant_id: Uuid) -> AfResult<Vec<AuditRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM audit_records WHERE tenant_id = ?1 ORDER BY ts ASC, seq ASC")
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![tenant_id.to_string()], row_to_audit_record)
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| AfError::StorageUnavailable(e.to_string()))?);
        }
        Ok(out)
    }

    async fn insert_envelope(&self, envelope: &MessageEnvelope) -> AfResult<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO envelopes (id, tenant_id, trace_id, span_id, from_agent, to_agent, kind, payload, metadata, cost, ts, envelope_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    envelope.id.to_string(),
                    envelope.tenant_id.to_string(),
                    envelope.trace_id,
                    envelope.span_id,
                    envelope.from_agent,
                    envelope.to_agent,
                    envelope.kind.to_string(),
                    envelope.payload,
                    serde_json::to_string(&envelope.metadata).map_err(|e| AfError::Serialization(e.to_string()))?,
                    serde_json::to_string(&envelope.cost).map_err(|e| AfError::Serialization(e.to_string()))?,
                    af_types::canonical::rfc3339_nanos(&envelope.timestamp),
                    envelope.envelope_hash.to_vec(),
                ],
            )
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(changed > 0)
    }

    async fn envelope_exists(&self, id: Uuid) -> AfResult<bool> {
        let conn = self.lock()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM envelopes WHERE id = ?1",
                params![id.to_string()],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(exists.is_some())
    }

    async fn lookup_role_bindings(&self, tenant_id: Uuid, user_id: Uuid) -> AfResult<Vec<Role>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT r.id, r.tenant_id, r.name, r.permissions FROM roles r
                 JOIN role_bindings b ON b.role_id = r.id
                 WHERE b.tenant_id = ?1 AND b.user_id = ?2",
            )
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![tenant_id.to_string(), user_id.to_string()], |row| {
                let id: String = row.get(0)?;
                let tenant_id: String = row.get(1)?;
                let name: String = row.get(2)?;
                let permissions: String = row.get(3)?;
                Ok((id, tenant_id, name, permissions))
            })
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;

        let mut roles = Vec::new();
        for row in rows {
            let (id, tenant_id, name, permissions) =
                row.map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
            roles.push(Role {
                id: Uuid::from_str(&id).unwrap_or_default(),
                tenant_id: Uuid::from_str(&tenant_id).unwrap_or_default(),
                name,
                permissions: serde_json::from_str(&permissions).unwrap_or_default(),
            });
        }
        Ok(roles)
    }

    async fn kv_incr_and_get(&self, key: &str, ttl: Duration) -> AfResult<i64> {
        let conn = self.lock()?;
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(60));

        // Clear the counter if it has expired, then increment-or-insert.
        conn.execute(
            "DELETE FROM kv_counters WHERE key = ?1 AND expires_at <= ?2",
            params![key, now.to_rfc3339()],
        )
        .map_err(|e| AfError::KvUnavailable(e.to_string()))?;

        conn.execute(
            "INSERT INTO kv_counters (key, value, expires_at) VALUES (?1, 1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = value + 1",
            params![key, expires_at.to_rfc3339()],
        )
        .map_err(|e| AfError::KvUnavailable(e.to_string()))?;

        let value: i64 = conn
            .query_row(
                "SELECT value FROM kv_counters WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .map_err(|e| AfError::KvUnavailable(e.to_string()))?;
        Ok(value)
    }

    async fn kv_get(&self, key: &str) -> AfResult<Option<i64>> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let live: Option<i64> = conn
            .query_row(
                "SELECT value FROM kv_counters WHERE key = ?1 AND expires_at > ?2",
                params![key, &now],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| AfError::KvUnavailable(e.to_string()))?;

        if live.is_none() {
            let expired: Option<i64> = conn
                .query_row("SELECT value FROM kv_counters WHERE key = ?1", params![key], |r| r.get(0))
                .optional()
                .map_err(|e| AfError::KvUnavailable(e.to_string()))?;
            if expired.is_some() {
                debug!(key, "kv counter row present but past its ttl, treating as absent");
            }
        }

        Ok(live)
    }

    async fn revoke_token(&self, jti: Uuid) -> AfResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO revoked_tokens (jti, revoked_at) VALUES (?1, ?2)",
            params![jti.to_string(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn is_token_revoked(&self, jti: Uuid) -> AfResult<bool> {
        let conn = self.lock()?;
        let exists: Option<String> = conn
            .query_row(
                "SELECT jti FROM revoked_tokens WHERE jti = ?1",
                params![jti.to_string()],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| AfError::StorageUnavailable(e.to_string()))?;
        Ok(exists.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_types::identity::ActorType;

    fn sample_record(tenant_id: Uuid, seq: i64, prev_hash: Option<[u8; 32]>) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            tenant_id,
            actor_type: ActorType::User,
            actor_id: "u1".into(),
            action: "create".into(),
            resource_type: "workflow".into(),
            resource_id: Some("w1".into()),
            details: serde_json::json!({}),
            ts: Utc::now(),
            seq,
            prev_hash,
            hash: [seq as u8; 32],
        }
    }

    #[tokio::test]
    async fn append_then_read_tail_roundtrips() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let tenant = Uuid::new_v4();
        let record = sample_record(tenant, 0, None);
        store.try_append_audit(&record, None).await.unwrap();

        let tail = store.get_audit_tail(tenant).await.unwrap().unwrap();
        assert_eq!(tail.hash, record.hash);
        assert_eq!(tail.seq, 0);
    }

    #[tokio::test]
    async fn conflicting_tail_seq_is_rejected() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let tenant = Uuid::new_v4();
        let r0 = sample_record(tenant, 0, None);
        store.try_append_audit(&r0, None).await.unwrap();

        let r1 = sample_record(tenant, 1, Some(r0.hash));
        // Wrong expected seq (stale read) must be rejected.
        let err = store.try_append_audit(&r1, None).await.unwrap_err();
        assert!(matches!(err, AfError::Conflict(_)));
    }

    #[tokio::test]
    async fn stream_audits_is_ordered_by_ts_then_seq() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let tenant = Uuid::new_v4();
        let r0 = sample_record(tenant, 0, None);
        store.try_append_audit(&r0, None).await.unwrap();
        let r1 = sample_record(tenant, 1, Some(r0.hash));
        store.try_append_audit(&r1, Some(0)).await.unwrap();

        let all = store.stream_audits(tenant).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].seq, 0);
        assert_eq!(all[1].seq, 1);
    }

    #[tokio::test]
    async fn envelope_insert_is_idempotent_on_id() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let envelope = MessageEnvelope {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            trace_id: "a".repeat(32),
            span_id: "b".repeat(16),
            from_agent: "a".into(),
            to_agent: "b".into(),
            kind: af_types::EnvelopeKind::Event,
            payload: b"hi".to_vec(),
            metadata: serde_json::json!({}),
            cost: serde_json::json!({}),
            timestamp: Utc::now(),
            envelope_hash: [1u8; 32],
        };
        assert!(store.insert_envelope(&envelope).await.unwrap());
        assert!(!store.insert_envelope(&envelope).await.unwrap());
        assert!(store.envelope_exists(envelope.id).await.unwrap());
    }

    #[tokio::test]
    async fn kv_incr_and_get_accumulates() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let v1 = store.kv_incr_and_get("k", Duration::from_secs(60)).await.unwrap();
        let v2 = store.kv_incr_and_get("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn role_bindings_lookup_returns_bound_roles() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let role_id = store
            .create_role(tenant, "writer", &["workflow:write".to_string()])
            .unwrap();
        store.bind_role(tenant, user, role_id).unwrap();

        let roles = store.lookup_role_bindings(tenant, user).await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, "writer");
    }
}
