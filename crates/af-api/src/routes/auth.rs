use crate::error::{ApiError, ApiResponse};
use crate::middleware::AuthedUser;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct IssueTokenRequest {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub ttl_secs: u64,
}

#[derive(Serialize)]
pub struct IssueTokenResponse {
    pub token: String,
    pub jti: Uuid,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// `POST /auth/token` — public, gated by possession of an admin credential
/// in front of this service (e.g. a network boundary or API gateway); the
/// substrate itself only checks the request shape.
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IssueTokenRequest>,
) -> Result<Json<ApiResponse<IssueTokenResponse>>, ApiError> {
    let issued = state
        .auth
        .issue_token(req.tenant_id, req.user_id, req.roles, req.permissions, Duration::from_secs(req.ttl_secs))
        .await?;
    Ok(Json(ApiResponse::ok(IssueTokenResponse {
        token: issued.token,
        jti: issued.jti,
        expires_at: issued.expires_at,
    })))
}

#[derive(Serialize)]
pub struct UserInfo {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub jti: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub token_expires_at: chrono::DateTime<chrono::Utc>,
}

impl From<af_types::RequestContext> for UserInfo {
    fn from(ctx: af_types::RequestContext) -> Self {
        Self {
            tenant_id: ctx.tenant_id,
            user_id: ctx.user_id,
            jti: ctx.jti,
            roles: ctx.roles.into_iter().map(|r| r.name).collect(),
            permissions: ctx.permissions.into_iter().collect(),
            token_expires_at: ctx.token_expires_at,
        }
    }
}

/// `POST /auth/validate` — by the time a handler runs, [`auth_middleware`]
/// has already verified the bearer token; this just echoes the resulting
/// context back to the caller.
///
/// [`auth_middleware`]: crate::middleware::auth_middleware
pub async fn validate(AuthedUser(ctx): AuthedUser) -> Json<ApiResponse<UserInfo>> {
    Json(ApiResponse::ok(ctx.into()))
}

/// `GET /auth/userinfo` — same bearer-validated context, framed as an
/// identity lookup rather than a validation result.
pub async fn userinfo(AuthedUser(ctx): AuthedUser) -> Json<ApiResponse<UserInfo>> {
    Json(ApiResponse::ok(ctx.into()))
}

#[derive(Deserialize)]
pub struct RevokeRequest {
    pub jti: Uuid,
}

/// `POST /auth/revoke` — any bearer-validated caller may revoke a jti; the
/// substrate does not currently require the caller to be the token's own
/// owner, since administrative revocation from another principal is a
/// legitimate control-plane operation.
pub async fn revoke(
    State(state): State<Arc<AppState>>,
    AuthedUser(_ctx): AuthedUser,
    Json(req): Json<RevokeRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.auth.revoke(req.jti).await?;
    Ok(Json(ApiResponse::ok(())))
}
