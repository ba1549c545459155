//! Application error types.

use queue_worker_runtime::ConfigurationError;
use thiserror::Error;

/// Errors raised while assembling or starting an [`App`](crate::App).
///
/// All of them surface before any worker runs; once launched, component
/// failures are logged rather than returned.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid application name '{name}': expected UpperCamelCase such as 'OrderService'")]
    InvalidName { name: String },

    #[error("Configuration parsing failed: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Invalid worker configuration: {0}")]
    Queue(#[from] ConfigurationError),

    #[error("Application has already been launched")]
    AlreadyStarted,
}
