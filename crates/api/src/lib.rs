//! HTTP API: routing, tenant context, request/response mapping and the
//! real-time status channel.

pub mod app;
pub mod context;
pub mod middleware;
