//! The Auth & RBAC Gate: token issuance/validation,
//! RBAC evaluation, revocation, and tenant isolation enforcement.

use crate::cache::RbacCache;
use crate::config::AuthConfig;
use crate::verifier::TokenVerifier;
use af_audit::{AppendParams, AuditEngine};
use af_storage::StoragePort;
use af_types::identity::ActorType;
use af_types::{AfError, AfResult, RequestContext, TokenClaims};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

pub struct IssuedToken {
    pub token: String,
    pub jti: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Owns the full control-plane authority surface: issuance, validation,
/// RBAC, and revocation, over any `StoragePort`/`TokenVerifier` pair.
pub struct AuthGate {
    storage: Arc<dyn StoragePort>,
    audit: Arc<AuditEngine>,
    verifier: Arc<dyn TokenVerifier>,
    cache: RbacCache,
    config: AuthConfig,
}

impl AuthGate {
    pub fn new(
        storage: Arc<dyn StoragePort>,
        audit: Arc<AuditEngine>,
        verifier: Arc<dyn TokenVerifier>,
        config: AuthConfig,
    ) -> Self {
        Self {
            storage,
            audit,
            verifier,
            cache: RbacCache::new(),
            config,
        }
    }

    /// Issue a signed token. The tenant id must be non-nil (the Storage
    /// Port's minimal contract has no tenant-row lookup, so existence is
    /// checked structurally rather than against the `tenants` table).
    pub async fn issue_token(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        roles: Vec<String>,
        permissions: Vec<String>,
        ttl: Duration,
    ) -> AfResult<IssuedToken> {
        if tenant_id.is_nil() {
            return Err(AfError::InvalidTenant("tenant id must not be nil".into()));
        }
        if ttl.is_zero() || ttl > self.config.max_ttl {
            return Err(AfError::InvalidTtl(format!(
                "requested ttl {ttl:?} must be in (0, {:?}]",
                self.config.max_ttl
            )));
        }

        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(ttl).map_err(|e| AfError::InvalidTtl(e.to_string()))?;
        let claims = TokenClaims {
            tenant_id,
            user_id,
            roles,
            permissions,
            issued_at: now,
            expires_at,
            jti: Uuid::new_v4(),
        };

        let token = self.verifier.sign(&claims).await?;

        self.audit
            .append(
                tenant_id,
                AppendParams {
                    actor_type: ActorType::User,
                    actor_id: user_id.to_string(),
                    action: "token.issue".into(),
                    resource_type: "token".into(),
                    resource_id: Some(claims.jti.to_string()),
                    details: serde_json::json!({ "roles": claims.roles }),
                },
            )
            .await?;

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at: claims.expires_at,
        })
    }

    /// Parse, verify, and check a bearer token, returning a populated
    /// `RequestContext` on success. Every rejection past signature
    /// verification is audited against the token's own tenant; a token
    /// whose signature can't be verified carries no trustworthy tenant id
    /// and is only logged, not audited.
    pub async fn validate_token(&self, token: &str) -> AfResult<RequestContext> {
        let claims = match self.verifier.verify(token).await {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "token signature/parse check failed");
                return Err(e);
            }
        };

        let result = self.check_claims(&claims).await;
        if let Err(ref e) = result {
            self.audit_reject(claims.tenant_id, claims.jti, e).await;
        }
        result
    }

    async fn check_claims(&self, claims: &TokenClaims) -> AfResult<RequestContext> {
        if !claims.is_well_formed() {
            return Err(AfError::TokenMalformed("expires_at must be after issued_at".into()));
        }

        let skew = chrono::Duration::from_std(self.config.clock_skew).unwrap_or_default();
        if claims.is_expired_at(Utc::now() - skew) {
            return Err(AfError::TokenExpired);
        }

        if self.storage.is_token_revoked(claims.jti).await? {
            return Err(AfError::TokenRevoked);
        }

        let roles = self.storage.lookup_role_bindings(claims.tenant_id, claims.user_id).await?;

        Ok(RequestContext {
            tenant_id: claims.tenant_id,
            user_id: claims.user_id,
            roles,
            permissions: claims.permissions.iter().cloned().collect(),
            jti: claims.jti,
            token_expires_at: claims.expires_at,
        })
    }

    async fn audit_reject(&self, tenant_id: Uuid, jti: Uuid, error: &AfError) {
        if let Err(e) = self
            .audit
            .append(
                tenant_id,
                AppendParams {
                    actor_type: ActorType::System,
                    actor_id: "auth-gate".into(),
                    action: "auth.reject".into(),
                    resource_type: "token".into(),
                    resource_id: Some(jti.to_string()),
                    details: serde_json::json!({ "reason": error.to_string() }),
                },
            )
            .await
        {
            warn!(error = %e, "failed to audit auth rejection");
        }
    }

    /// RBAC evaluation: default-deny, cached per `(jti, permission)` for the
    /// token's remaining lifetime.
    pub fn check_permission(&self, ctx: &RequestContext, permission: &str) -> AfResult<()> {
        let now = Utc::now();
        let allowed = match self.cache.get(ctx.jti, permission, now) {
            Some(cached) => cached,
            None => {
                let allowed = ctx.has_permission(permission);
                self.cache.insert(ctx.jti, permission, allowed, ctx.token_expires_at);
                allowed
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(AfError::PermissionDenied {
                permission: permission.to_string(),
            })
        }
    }

    /// Tenant isolation enforcement: a request body's tenant id must match
    /// the validated context's. A mismatch is rejected and audited against
    /// the context's own (trusted) tenant.
    pub async fn check_tenant_match(&self, ctx: &RequestContext, body_tenant_id: Uuid) -> AfResult<()> {
        if ctx.tenant_id == body_tenant_id {
            return Ok(());
        }

        if let Err(e) = self
            .audit
            .append(
                ctx.tenant_id,
                AppendParams {
                    actor_type: ActorType::User,
                    actor_id: ctx.user_id.to_string(),
                    action: "auth.cross_tenant_attempt".into(),
                    resource_type: "request".into(),
                    resource_id: None,
                    details: serde_json::json!({ "body_tenant_id": body_tenant_id.to_string() }),
                },
            )
            .await
        {
            warn!(error = %e, "failed to audit cross-tenant attempt");
        }

        Err(AfError::TenantMismatch {
            token_tenant: ctx.tenant_id.to_string(),
            body_tenant: body_tenant_id.to_string(),
        })
    }

    pub async fn revoke(&self, jti: Uuid) -> AfResult<()> {
        self.storage.revoke_token(jti).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::HsVerifier;
    use af_storage::SqliteStorage;

    fn gate() -> (AuthGate, Arc<SqliteStorage>) {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let audit = Arc::new(AuditEngine::new(storage.clone()));
        let verifier = Arc::new(HsVerifier::new("test-secret"));
        (
            AuthGate::new(storage.clone(), audit, verifier, AuthConfig::default()),
            storage,
        )
    }

    #[tokio::test]
    async fn issue_then_validate_round_trips_into_a_request_context() {
        let (gate, _storage) = gate();
        let tenant_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let issued = gate
            .issue_token(tenant_id, user_id, vec!["operator".into()], vec!["workflow:write".into()], Duration::from_secs(3600))
            .await
            .unwrap();

        let ctx = gate.validate_token(&issued.token).await.unwrap();
        assert_eq!(ctx.tenant_id, tenant_id);
        assert_eq!(ctx.user_id, user_id);
        assert!(ctx.has_permission("workflow:write"));
    }

    #[tokio::test]
    async fn revoked_token_is_rejected_and_audited() {
        let (gate, _storage) = gate();
        let tenant_id = Uuid::new_v4();
        let issued = gate
            .issue_token(tenant_id, Uuid::new_v4(), vec![], vec![], Duration::from_secs(3600))
            .await
            .unwrap();

        gate.revoke(issued.jti).await.unwrap();
        let err = gate.validate_token(&issued.token).await.unwrap_err();
        assert!(matches!(err, AfError::TokenRevoked));
    }

    #[tokio::test]
    async fn invalid_ttl_is_rejected_before_signing() {
        let (gate, _storage) = gate();
        let err = gate
            .issue_token(Uuid::new_v4(), Uuid::new_v4(), vec![], vec![], Duration::from_secs(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AfError::InvalidTtl(_)));
    }

    #[tokio::test]
    async fn cross_tenant_body_is_rejected_and_audited() {
        let (gate, _storage) = gate();
        let tenant_id = Uuid::new_v4();
        let issued = gate
            .issue_token(tenant_id, Uuid::new_v4(), vec![], vec![], Duration::from_secs(3600))
            .await
            .unwrap();
        let ctx = gate.validate_token(&issued.token).await.unwrap();

        let other_tenant = Uuid::new_v4();
        let err = gate.check_tenant_match(&ctx, other_tenant).await.unwrap_err();
        assert!(matches!(err, AfError::TenantMismatch { .. }));
    }

    #[tokio::test]
    async fn permission_check_consults_bound_roles_not_just_token_permissions() {
        let (gate, storage) = gate();
        let tenant_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        storage.seed_tenant(tenant_id, "acme").unwrap();
        let role_id = storage
            .create_role(tenant_id, "operator", &["audit:read".to_string()])
            .unwrap();
        storage.bind_role(tenant_id, user_id, role_id).unwrap();

        let issued = gate
            .issue_token(tenant_id, user_id, vec![], vec![], Duration::from_secs(3600))
            .await
            .unwrap();
        let ctx = gate.validate_token(&issued.token).await.unwrap();

        assert!(gate.check_permission(&ctx, "audit:read").is_ok());
        assert!(gate.check_permission(&ctx, "audit:write").is_err());
    }
}
