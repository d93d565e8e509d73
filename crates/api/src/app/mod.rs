//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the service object (queue, sessions, dispatch loop)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and their mapping to reminder jobs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    http::{HeaderValue, Method},
    routing::get,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    let cors = build_cors(services.config.public_base_url.as_deref());

    let tenant_routes = routes::router().layer(Extension(services));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(tenant_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_log))
                .layer(cors),
        )
}

/// Front-ends are served from `PUBLIC_BASE_URL` when set; otherwise any origin.
fn build_cors(public_base_url: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    match public_base_url.map(HeaderValue::from_str) {
        Some(Ok(origin)) => base.allow_origin(AllowOrigin::exact(origin)),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "PUBLIC_BASE_URL is not a valid origin; allowing any origin");
            base.allow_origin(Any)
        }
        None => base.allow_origin(Any),
    }
}
