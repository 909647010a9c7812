//! The sliding-window-with-sub-buckets admission algorithm, keyed per
//! `(tenant, endpoint)` against the Storage Port's KV ops.

use crate::config::RateLimitConfig;
use af_audit::{AppendParams, AuditEngine};
use af_storage::StoragePort;
use af_types::identity::ActorType;
use af_types::{AfResult, RateCounterKey, RateDecision};
use chrono::Utc;
use dashmap::DashSet;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Owns admission decisions for every tenant/endpoint pair. The KV
/// collaborator is the Storage Port's own `kv_incr_and_get`/`kv_get` —
/// rate limiting has no separate KV port in this contract.
pub struct RateLimiter {
    storage: Arc<dyn StoragePort>,
    audit: Arc<AuditEngine>,
    config: RateLimitConfig,
    /// Tenants this process has admitted at least one request for while
    /// the KV store was reachable. Used only to decide the degraded-mode
    /// fallback: known tenants fail open, unseen tenants fail closed.
    known_tenants: DashSet<Uuid>,
}

impl RateLimiter {
    pub fn new(storage: Arc<dyn StoragePort>, audit: Arc<AuditEngine>, config: RateLimitConfig) -> Self {
        Self {
            storage,
            audit,
            config,
            known_tenants: DashSet::new(),
        }
    }

    pub async fn check(&self, tenant_id: Uuid, endpoint: &str) -> AfResult<RateDecision> {
        let limit = self.config.limit_for(endpoint);
        let bucket_width = self.config.bucket_width_secs();
        let current_bucket = (Utc::now().timestamp() as u64) / bucket_width;
        let reset_at = Utc::now() + chrono::Duration::seconds(bucket_width as i64);

        let mut total: i64 = 0;
        for offset in 0..self.config.sub_buckets as u64 {
            let bucket = current_bucket.saturating_sub(offset);
            let key = RateCounterKey {
                tenant_id,
                endpoint: endpoint.to_string(),
                window_bucket: bucket,
            }
            .kv_key();

            match self.storage.kv_get(&key).await {
                Ok(Some(count)) => total += count,
                Ok(None) => {}
                Err(e) if e.is_infrastructure() => return self.degraded_decision(tenant_id, endpoint, limit, reset_at).await,
                Err(e) => return Err(e),
            }
        }

        if total >= limit as i64 {
            self.known_tenants.insert(tenant_id);
            return Ok(RateDecision {
                admitted: false,
                remaining: 0,
                limit,
                reset_at,
            });
        }

        let current_key = RateCounterKey {
            tenant_id,
            endpoint: endpoint.to_string(),
            window_bucket: current_bucket,
        }
        .kv_key();

        match self.storage.kv_incr_and_get(&current_key, self.config.window).await {
            Ok(_) => {
                self.known_tenants.insert(tenant_id);
                let remaining = (limit as i64 - total - 1).max(0) as u32;
                Ok(RateDecision {
                    admitted: true,
                    remaining,
                    limit,
                    reset_at,
                })
            }
            Err(e) if e.is_infrastructure() => self.degraded_decision(tenant_id, endpoint, limit, reset_at).await,
            Err(e) => Err(e),
        }
    }

    async fn degraded_decision(
        &self,
        tenant_id: Uuid,
        endpoint: &str,
        limit: u32,
        reset_at: chrono::DateTime<Utc>,
    ) -> AfResult<RateDecision> {
        let admitted = self.known_tenants.contains(&tenant_id);
        error!(
            tenant_id = %tenant_id,
            endpoint,
            admitted,
            "kv store unreachable, rate limiter degraded"
        );

        if let Err(e) = self
            .audit
            .append(
                tenant_id,
                AppendParams {
                    actor_type: ActorType::System,
                    actor_id: "rate-limiter".into(),
                    action: "ratelimit.degraded".into(),
                    resource_type: "endpoint".into(),
                    resource_id: Some(endpoint.to_string()),
                    details: serde_json::json!({ "admitted": admitted }),
                },
            )
            .await
        {
            error!(error = %e, "failed to audit rate limiter degradation");
        }

        Ok(RateDecision {
            admitted,
            remaining: if admitted { limit } else { 0 },
            limit,
            reset_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_storage::SqliteStorage;

    fn limiter(default_limit: u32) -> RateLimiter {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let audit = Arc::new(AuditEngine::new(storage.clone()));
        RateLimiter::new(
            storage,
            audit,
            RateLimitConfig {
                default_limit,
                ..RateLimitConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn admits_up_to_the_limit_then_denies() {
        let limiter = limiter(3);
        let tenant = Uuid::new_v4();

        for _ in 0..3 {
            let decision = limiter.check(tenant, "/api/v1/audit/verify").await.unwrap();
            assert!(decision.admitted);
        }
        let denied = limiter.check(tenant, "/api/v1/audit/verify").await.unwrap();
        assert!(!denied.admitted);
        assert_eq!(denied.remaining, 0);
    }

    #[tokio::test]
    async fn tenants_and_endpoints_are_isolated() {
        let limiter = limiter(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(limiter.check(a, "/api/v1/audit/verify").await.unwrap().admitted);
        assert!(!limiter.check(a, "/api/v1/audit/verify").await.unwrap().admitted);
        // A different tenant, or a different endpoint for the same tenant,
        // has its own independent budget.
        assert!(limiter.check(b, "/api/v1/audit/verify").await.unwrap().admitted);
        assert!(limiter.check(a, "/api/v1/auth/validate").await.unwrap().admitted);
    }
}
