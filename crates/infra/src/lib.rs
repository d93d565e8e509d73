//! Infrastructure layer: configuration, durable reminder queue, dispatch
//! loop and per-tenant messaging sessions.

pub mod config;
pub mod jobs;
pub mod sessions;

pub use config::{AppConfig, ConfigError};
