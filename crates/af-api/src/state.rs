//! Composition of the components an HTTP handler needs, shared across
//! handlers as `Arc<AppState>` via axum's `State<Arc<AppState>>` extractor.

use af_audit::AuditEngine;
use af_auth::AuthGate;
use af_ratelimit::RateLimiter;
use af_storage::StoragePort;
use axum::extract::FromRef;
use std::sync::Arc;

pub struct AppState {
    pub storage: Arc<dyn StoragePort>,
    pub audit: Arc<AuditEngine>,
    pub auth: Arc<AuthGate>,
    pub limiter: Arc<RateLimiter>,
}

/// Lets the rate-limit middleware run as `from_fn_with_state(state, ...)`
/// against `State<Arc<RateLimiter>>` while every handler still sees the
/// full `Arc<AppState>`.
impl FromRef<Arc<AppState>> for Arc<RateLimiter> {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.limiter.clone()
    }
}
