//! The one place the process wires its collaborators together. No
//! module-level singletons anywhere downstream: every component here is
//! constructed once and handed to whatever needs it explicitly.

use af_auth::{AuthConfig, AuthGate, HsVerifier, JwksVerifier, TokenVerifier};
use af_observe::{AppConfig, AuthMode};
use af_ratelimit::{RateLimitConfig, RateLimiter};
use af_storage::{SqliteStorage, StoragePort};
use std::sync::Arc;

/// Everything the HTTP ingress layer needs, built once at process start.
pub struct Composition {
    pub storage: Arc<dyn StoragePort>,
    pub audit: Arc<af_audit::AuditEngine>,
    pub auth: Arc<AuthGate>,
    pub limiter: Arc<RateLimiter>,
}

impl Composition {
    pub fn build(config: &AppConfig) -> anyhow::Result<Self> {
        let storage: Arc<dyn StoragePort> = Arc::new(open_storage(&config.database_url)?);
        let audit = Arc::new(af_audit::AuditEngine::new(storage.clone()));

        let verifier: Arc<dyn TokenVerifier> = match &config.auth_mode {
            AuthMode::Symmetric { secret } => Arc::new(HsVerifier::new(secret)),
            AuthMode::Jwks { jwks_url, .. } => Arc::new(JwksVerifier::new(jwks_url.clone())),
        };
        let auth = Arc::new(AuthGate::new(
            storage.clone(),
            audit.clone(),
            verifier,
            AuthConfig::default(),
        ));

        let rate_limit_config = RateLimitConfig {
            overrides: config.rate_limit_overrides.clone(),
            ..RateLimitConfig::default()
        };
        let limiter = Arc::new(RateLimiter::new(storage.clone(), audit.clone(), rate_limit_config));

        Ok(Self {
            storage,
            audit,
            auth,
            limiter,
        })
    }

    pub fn into_app_state(self) -> Arc<af_api::AppState> {
        Arc::new(af_api::AppState {
            storage: self.storage,
            audit: self.audit,
            auth: self.auth,
            limiter: self.limiter,
        })
    }
}

/// `:memory:` opens an ephemeral database; anything else is a filesystem path.
fn open_storage(database_url: &str) -> anyhow::Result<SqliteStorage> {
    if database_url == ":memory:" {
        Ok(SqliteStorage::open_in_memory()?)
    } else {
        Ok(SqliteStorage::open(std::path::Path::new(database_url))?)
    }
}
