use crate::error::ApiResponse;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
}

pub async fn health() -> Json<ApiResponse<HealthBody>> {
    Json(ApiResponse::ok(HealthBody { status: "ok" }))
}
