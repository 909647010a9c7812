//! Maps the shared `AfError` taxonomy onto the wire envelope and HTTP
//! status codes documented in the platform's error handling design.

use af_types::AfError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Every response body is `{success, data?, error?}`.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Thin wrapper so handlers can return `Result<Json<ApiResponse<T>>, ApiError>`
/// and rely on `?` from any `AfError`-returning call.
pub struct ApiError(pub AfError);

impl From<AfError> for ApiError {
    fn from(e: AfError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = status_and_code(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, code, "request failed");
        } else {
            tracing::warn!(error = %self.0, code, "request rejected");
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ApiErrorBody {
                code: code.to_string(),
                message: self.0.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

/// Kind -> (HTTP status, wire error code), per the error handling design:
/// Integrity is fatal (500, never swallowed), Auth is 401/403, Resource is
/// caller-retryable (404/409/429/503), Infrastructure is 503, Input is 400.
fn status_and_code(e: &AfError) -> (StatusCode, &'static str) {
    match e {
        AfError::HashMismatch { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "HashMismatch"),
        AfError::ChainBroken { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "ChainBroken"),
        AfError::EnvelopeHashInvalid { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "EnvelopeHashInvalid"),

        AfError::TokenMalformed(_) => (StatusCode::UNAUTHORIZED, "TokenMalformed"),
        AfError::TokenExpired => (StatusCode::UNAUTHORIZED, "TokenExpired"),
        AfError::TokenRevoked => (StatusCode::UNAUTHORIZED, "TokenRevoked"),
        AfError::SignatureInvalid => (StatusCode::UNAUTHORIZED, "SignatureInvalid"),
        AfError::TenantMismatch { .. } => (StatusCode::FORBIDDEN, "TenantMismatch"),
        AfError::PermissionDenied { .. } => (StatusCode::FORBIDDEN, "PermissionDenied"),

        AfError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
        AfError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
        AfError::Backpressure => (StatusCode::SERVICE_UNAVAILABLE, "Backpressure"),
        AfError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RateLimited"),

        AfError::StorageUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "StorageUnavailable"),
        AfError::BusUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "BusUnavailable"),
        AfError::KvUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "KvUnavailable"),
        AfError::DeadlineExceeded => (StatusCode::SERVICE_UNAVAILABLE, "DeadlineExceeded"),

        AfError::Serialization(_) => (StatusCode::BAD_REQUEST, "Serialization"),
        AfError::InvalidTtl(_) => (StatusCode::BAD_REQUEST, "InvalidTtl"),
        AfError::InvalidTenant(_) => (StatusCode::BAD_REQUEST, "InvalidTenant"),
    }
}
