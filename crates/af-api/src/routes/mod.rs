pub mod audit;
pub mod auth;
pub mod health;

use crate::middleware::auth_middleware;
use crate::state::AppState;
use af_ratelimit::rate_limit_middleware;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Builds the `/api/v1` router. Middleware order matters: auth runs first
/// so the limiter (and every handler) sees a populated `RequestContext`.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/auth/token", post(auth::issue_token))
        .route("/auth/validate", post(auth::validate))
        .route("/auth/revoke", post(auth::revoke))
        .route("/auth/userinfo", get(auth::userinfo))
        .route("/health", get(health::health))
        .route("/audit/verify", get(audit::verify))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
