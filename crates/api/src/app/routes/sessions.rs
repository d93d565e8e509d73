use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::app::dto::TenantRequest;
use crate::app::errors::json_error;
use crate::app::services::AppServices;
use crate::context::TenantContext;

fn tenant_from_body(payload: Result<Json<TenantRequest>, JsonRejection>) -> Result<TenantContext, Response> {
    let Json(req) =
        payload.map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_json", e.body_text()))?;
    TenantContext::from_raw(req.tenant().as_deref())
}

/// POST /connect
///
/// Fire-and-forget: the outcome is observed on the status stream.
pub async fn connect(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<TenantRequest>, JsonRejection>,
) -> Response {
    let tenant = match tenant_from_body(payload) {
        Ok(t) => t,
        Err(rejection) => return rejection,
    };
    let session = services.sessions.connect(tenant.tenant_id());
    Json(json!({
        "message": "connection started",
        "session": session,
    }))
    .into_response()
}

/// POST /disconnect
pub async fn disconnect(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<TenantRequest>, JsonRejection>,
) -> Response {
    let tenant = match tenant_from_body(payload) {
        Ok(t) => t,
        Err(rejection) => return rejection,
    };
    if services.sessions.disconnect(tenant.tenant_id()) {
        Json(json!({ "message": "session disconnected" })).into_response()
    } else {
        json_error(StatusCode::NOT_FOUND, "not_found", "no session for this tenant")
    }
}

/// GET /status?tenantId=
pub async fn status(
    Extension(services): Extension<Arc<AppServices>>,
    tenant: TenantContext,
) -> Response {
    Json(services.sessions.status(tenant.tenant_id())).into_response()
}
