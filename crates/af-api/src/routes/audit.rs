use crate::error::{ApiError, ApiResponse};
use crate::middleware::AuthedUser;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct VerifyQuery {
    pub tenant: Uuid,
}

/// `GET /audit/verify?tenant=…` — requires `audit:read` and that the
/// caller's own tenant match the one being verified.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    AuthedUser(ctx): AuthedUser,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<ApiResponse<af_types::VerificationResult>>, ApiError> {
    state.auth.check_permission(&ctx, "audit:read")?;
    state.auth.check_tenant_match(&ctx, query.tenant).await?;

    let result = state.audit.verify(query.tenant).await?;
    Ok(Json(ApiResponse::ok(result)))
}
