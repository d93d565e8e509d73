use axum::{
    Router,
    routing::{get, post},
};

pub mod reminders;
pub mod sessions;
pub mod stream;
pub mod system;

/// Router for every tenant-scoped endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/batch-schedule-reminders", post(reminders::batch_schedule))
        .route("/cancel-reminder", post(reminders::cancel_reminder))
        .route("/reminders", get(reminders::list_reminders))
        .route("/connect", post(sessions::connect))
        .route("/disconnect", post(sessions::disconnect))
        .route("/status", get(sessions::status))
        .route("/stream", get(stream::sse))
        .route("/ws", get(stream::websocket))
        .route("/scheduler/stats", get(system::scheduler_stats))
}
