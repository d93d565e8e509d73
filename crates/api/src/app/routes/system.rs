use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /scheduler/stats
pub async fn scheduler_stats(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(services.scheduler_stats())
}
