use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::{Value, json};

use remindd_core::ReminderId;
use remindd_infra::jobs::CancelOutcome;

use crate::app::dto::{CancelRequest, ReminderRequest};
use crate::app::errors::{ApiError, json_error};
use crate::app::services::AppServices;
use crate::context::TenantContext;

/// POST /batch-schedule-reminders
///
/// Best effort: each entry is validated on its own and bad ones are skipped.
pub async fn batch_schedule(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, "invalid_json", e.body_text()),
    };
    let Value::Array(entries) = payload else {
        return json_error(
            StatusCode::BAD_REQUEST,
            "invalid_batch",
            "expected an array of reminders",
        );
    };

    let now = Utc::now();
    let mut jobs = Vec::with_capacity(entries.len());
    let mut skipped = 0usize;
    for (index, entry) in entries.into_iter().enumerate() {
        let request = match serde_json::from_value::<ReminderRequest>(entry) {
            Ok(r) => r,
            Err(e) => {
                skipped += 1;
                tracing::debug!(index, error = %e, "skipping malformed reminder entry");
                continue;
            }
        };
        match request.into_job(&services.policy, now) {
            Ok(Some(job)) => jobs.push(job),
            Ok(None) => skipped += 1,
            Err(e) => {
                skipped += 1;
                tracing::debug!(index, error = %e, "skipping invalid reminder entry");
            }
        }
    }

    let accepted = match services.queue.upsert_batch(jobs).await {
        Ok(n) => n,
        Err(e) => return ApiError::from(e).into_response(),
    };
    tracing::info!(accepted, skipped, "reminder batch processed");

    Json(json!({
        "message": "reminders scheduled",
        "accepted": accepted,
        "skipped": skipped,
    }))
    .into_response()
}

/// POST /cancel-reminder
pub async fn cancel_reminder(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, "invalid_json", e.body_text()),
    };
    let tenant = match TenantContext::from_raw(req.tenant().as_deref()) {
        Ok(t) => t,
        Err(rejection) => return rejection,
    };
    let Some(raw_id) = req.reminder_id() else {
        return json_error(StatusCode::BAD_REQUEST, "missing_id", "id is required");
    };
    let id = match ReminderId::parse(raw_id) {
        Ok(id) => id,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()),
    };

    match services.queue.cancel(tenant.tenant_id(), &id).await {
        Ok(CancelOutcome::Canceled) => {
            tracing::info!(tenant_id = %tenant.tenant_id(), reminder_id = %id, "reminder canceled");
            Json(json!({ "message": "reminder canceled" })).into_response()
        }
        Ok(CancelOutcome::NotFound) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "no scheduled reminder with that id for this tenant",
        ),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// GET /reminders?tenantId=
pub async fn list_reminders(
    Extension(services): Extension<Arc<AppServices>>,
    tenant: TenantContext,
) -> Response {
    Json(services.queue.list_for_tenant(tenant.tenant_id()).await).into_response()
}
