//! Bearer-token authentication middleware. Runs before rate limiting so the
//! limiter can key off the validated tenant; routes with no `Authorization`
//! header simply proceed without a `RequestContext` (covers `/health` and
//! `/auth/token`, both public per the external interface table).

use crate::error::ApiError;
use crate::state::AppState;
use af_types::{AfError, RequestContext};
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

pub async fn auth_middleware(State(state): State<Arc<AppState>>, mut request: Request<Body>, next: Next) -> Response {
    let bearer = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if let Some(token) = bearer {
        match state.auth.validate_token(token).await {
            Ok(ctx) => {
                request.extensions_mut().insert(ctx);
            }
            Err(e) => return ApiError(e).into_response(),
        }
    }

    next.run(request).await
}

/// Extractor for routes that require an already-validated bearer token.
/// Relies on [`auth_middleware`] having run first; a missing context means
/// the caller sent no `Authorization` header at all.
pub struct AuthedUser(pub RequestContext);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(AuthedUser)
            .ok_or_else(|| ApiError(AfError::TokenMalformed("missing bearer token".into())))
    }
}
