//! Axum middleware wiring the limiter into the HTTP ingress path:
//! `State<Arc<_>>`, checked before `next.run`, 429 + `retry-after` on
//! rejection.

use crate::limiter::RateLimiter;
use af_types::RequestContext;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use axum::middleware::Next;
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

/// Checked after authentication (so `RequestContext` is already present as
/// a request extension) and before the handler runs.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let Some(ctx) = request.extensions().get::<RequestContext>().cloned() else {
        // No authenticated context (e.g. /health): nothing to key the
        // limiter on, so the request passes through unmetered.
        return next.run(request).await;
    };
    let endpoint = request.uri().path().to_string();

    let decision = match limiter.check(ctx.tenant_id, &endpoint).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(error = %e, "rate limiter check failed unexpectedly, admitting the request");
            return next.run(request).await;
        }
    };

    if !decision.admitted {
        let retry_after = (decision.reset_at - Utc::now()).num_seconds().max(0);
        return Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header("content-type", "application/json")
            .header("retry-after", retry_after.to_string())
            .header("x-ratelimit-remaining", "0")
            .header("x-ratelimit-limit", decision.limit.to_string())
            .header("x-ratelimit-reset", decision.reset_at.to_rfc3339())
            .body(Body::from(
                serde_json::json!({
                    "success": false,
                    "error": { "code": "RateLimited", "message": "rate limit exceeded" }
                })
                .to_string(),
            ))
            .unwrap_or_default();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.reset_at.to_rfc3339()) {
        headers.insert("x-ratelimit-reset", value);
    }
    response
}
