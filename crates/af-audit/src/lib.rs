//! Audit Hash-Chain Engine: append-only, SHA-256-linked
//! per-tenant audit log with online, non-blocking verification.

#![forbid(unsafe_code)]

use af_storage::StoragePort;
use af_types::audit::AuditRecord;
use af_types::identity::ActorType;
use af_types::{AfError, AfResult, VerificationResult};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Bounded retry count for the tail-CAS race: a conflicting concurrent
/// append is retried internally rather than surfaced to the caller.
const MAX_APPEND_RETRIES: u32 = 8;

/// Parameters for a new audit record; the engine fills in `id`, `ts`,
/// `seq`, `prev_hash`, and `hash`.
#[derive(Debug, Clone)]
pub struct AppendParams {
    pub actor_type: ActorType,
    pub actor_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
}

/// The Audit Hash-Chain Engine, parameterized over any `StoragePort`.
pub struct AuditEngine {
    storage: Arc<dyn StoragePort>,
}

impl AuditEngine {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self { storage }
    }

    /// Atomically: read the tenant's tail, construct the canonical record,
    /// compute `hash`, and persist. Retries on a concurrent-append
    /// conflict by re-reading the tail and recomputing, up to
    /// `MAX_APPEND_RETRIES` times.
    pub async fn append(&self, tenant_id: Uuid, params: AppendParams) -> AfResult<AuditRecord> {
        let mut attempt = 0;
        loop {
            let tail = self.storage.get_audit_tail(tenant_id).await?;
            let (prev_hash, next_seq) = match tail {
                Some(t) => (Some(t.hash), t.seq + 1),
                None => (None, 0),
            };

            let ts = chrono::Utc::now();
            let body = AuditRecord::canonical_body(
                &tenant_id,
                params.actor_type,
                &params.actor_id,
                &params.action,
                &params.resource_type,
                params.resource_id.as_deref(),
                &params.details,
                &ts,
            );
            let input = AuditRecord::hash_input(prev_hash.as_ref(), &body);
            let hash = sha256(&input);

            let record = AuditRecord {
                id: Uuid::new_v4(),
                tenant_id,
                actor_type: params.actor_type,
                actor_id: params.actor_id.clone(),
                action: params.action.clone(),
                resource_type: params.resource_type.clone(),
                resource_id: params.resource_id.clone(),
                details: params.details.clone(),
                ts,
                seq: next_seq,
                prev_hash,
                hash,
            };

            let expected_tail_seq = tail.map(|t| t.seq);
            match self.storage.try_append_audit(&record, expected_tail_seq).await {
                Ok(()) => {
                    info!(
                        tenant_id = %tenant_id,
                        record_id = %record.id,
                        action = %record.action,
                        seq = record.seq,
                        "audit record appended"
                    );
                    return Ok(record);
                }
                Err(AfError::Conflict(_)) if attempt < MAX_APPEND_RETRIES => {
                    attempt += 1;
                    warn!(tenant_id = %tenant_id, attempt, "audit tail conflict, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stream a tenant's records in timestamp order, recompute each hash,
    /// and compare against the stored chain. Read-only: never blocks
    /// concurrent appends, and never mutates state.
    pub async fn verify(&self, tenant_id: Uuid) -> AfResult<VerificationResult> {
        let started = Instant::now();
        let records = self.storage.stream_audits(tenant_id).await?;

        if records.is_empty() {
            return Ok(VerificationResult {
                valid: true,
                total_records: 0,
                verified_records: 0,
                first_tampered_index: None,
                genesis_index: None,
                error_message: None,
                duration: started.elapsed(),
            });
        }

        let mut prev_hash: Option<[u8; 32]> = None;
        for (index, record) in records.iter().enumerate() {
            if record.prev_hash != prev_hash {
                return Ok(VerificationResult {
                    valid: false,
                    total_records: records.len(),
                    verified_records: index,
                    first_tampered_index: Some(index),
                    genesis_index: Some(0),
                    error_message: Some(format!(
                        "record {} prev_hash does not match predecessor's hash",
                        index
                    )),
                    duration: started.elapsed(),
                });
            }

            let body = AuditRecord::canonical_body(
                &record.tenant_id,
                record.actor_type,
                &record.actor_id,
                &record.action,
                &record.resource_type,
                record.resource_id.as_deref(),
                &record.details,
                &record.ts,
            );
            let input = AuditRecord::hash_input(record.prev_hash.as_ref(), &body);
            let recomputed = sha256(&input);

            if recomputed != record.hash {
                return Ok(VerificationResult {
                    valid: false,
                    total_records: records.len(),
                    verified_records: index,
                    first_tampered_index: Some(index),
                    genesis_index: Some(0),
                    error_message: Some(format!("record {} hash does not match recomputed value", index)),
                    duration: started.elapsed(),
                });
            }

            prev_hash = Some(record.hash);
        }

        Ok(VerificationResult {
            valid: true,
            total_records: records.len(),
            verified_records: records.len(),
            first_tampered_index: None,
            genesis_index: Some(0),
            error_message: None,
            duration: started.elapsed(),
        })
    }
}

fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_storage::SqliteStorage;

    fn params(action: &str) -> AppendParams {
        AppendParams {
            actor_type: ActorType::User,
            actor_id: "u1".into(),
            action: action.into(),
            resource_type: "workflow".into(),
            resource_id: Some("w1".into()),
            details: serde_json::json!({}),
        }
    }

    async fn engine() -> AuditEngine {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        AuditEngine::new(storage)
    }

    // Invariant 1 / Scenario A: genesis append verifies clean.
    #[tokio::test]
    async fn genesis_append_verifies_clean() {
        let engine = engine().await;
        let tenant = Uuid::new_v4();
        let record = engine.append(tenant, params("create")).await.unwrap();
        assert!(record.prev_hash.is_none());

        let result = engine.verify(tenant).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.total_records, 1);
        assert_eq!(result.verified_records, 1);
    }

    // Invariant 2 / Scenario B: mutating any field (other than `id`) of any
    // record causes Verify to report invalid at that record's index.
    #[tokio::test]
    async fn tampered_record_is_detected_at_its_index() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let engine = AuditEngine::new(storage.clone());
        let tenant = Uuid::new_v4();
        engine.append(tenant, params("create")).await.unwrap();
        engine.append(tenant, params("update")).await.unwrap();

        assert!(engine.verify(tenant).await.unwrap().valid);

        // Bypass the engine and mutate the first record's action directly,
        // exactly as an operator editing the database file would.
        storage.test_corrupt_action(tenant, 0, "delete").unwrap();

        let result = engine.verify(tenant).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.first_tampered_index, Some(0));
    }

    // Invariant 3: deleting any non-last record causes Verify to report
    // invalid at the index of the resulting gap.
    #[tokio::test]
    async fn deleted_record_is_detected_as_a_chain_gap() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let engine = AuditEngine::new(storage.clone());
        let tenant = Uuid::new_v4();
        engine.append(tenant, params("create")).await.unwrap();
        engine.append(tenant, params("update")).await.unwrap();
        engine.append(tenant, params("delete")).await.unwrap();

        storage.test_delete_record(tenant, 1).unwrap();

        let result = engine.verify(tenant).await.unwrap();
        assert!(!result.valid);
        // The record now at index 1 (formerly seq 2) has a prev_hash
        // pointing at the deleted record's hash, which no longer precedes it.
        assert_eq!(result.first_tampered_index, Some(1));
    }

    // Invariant 7 / Scenario F: N concurrent appenders produce N records
    // and a verifying chain.
    #[tokio::test]
    async fn concurrent_appenders_all_land_and_chain_verifies() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let engine = Arc::new(AuditEngine::new(storage.clone()));
        let tenant = Uuid::new_v4();

        let mut handles = Vec::new();
        for i in 0..10 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.append(tenant, params(&format!("action-{i}"))).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let result = engine.verify(tenant).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.total_records, 10);

        let latest = storage.get_latest_audit(tenant).await.unwrap().unwrap();
        let tail = storage.get_audit_tail(tenant).await.unwrap().unwrap();
        assert_eq!(latest.hash, tail.hash);
    }

    #[tokio::test]
    async fn empty_tenant_verifies_trivially_valid() {
        let engine = engine().await;
        let result = engine.verify(Uuid::new_v4()).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.total_records, 0);
    }
}
