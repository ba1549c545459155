//! # Queue Worker App
//!
//! Process-level orchestration for queue consumers. An [`App`] owns the
//! queue workers, HTTP listeners (including the Prometheus endpoint) and
//! background tasks of one process, reads its configuration from the
//! environment and shuts everything down together.
//!
//! ## Module Organization
//!
//! - [`app`] - The orchestrator and its lifecycle
//! - [`config`] - Environment-driven configuration
//! - [`error`] - Error types
//! - [`http`] - HTTP listener task and Prometheus router
//! - [`telemetry`] - Logging initialisation

pub mod app;
pub mod config;
pub mod error;
pub mod http;
pub mod telemetry;

pub use app::App;
pub use config::{AppConfig, LoggingConfig, PrometheusConfig};
pub use error::AppError;
pub use http::{prometheus_router, HttpListener};
pub use telemetry::init_logging;
