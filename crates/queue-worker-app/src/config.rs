//! Environment-driven application configuration.
//!
//! Every setting is read from environment variables prefixed with the
//! upper-cased application name. Nested keys are separated by a double
//! underscore, so for an app named `Demo`:
//!
//! | Variable                     | Setting              | Default    |
//! |------------------------------|----------------------|------------|
//! | `DEMO_PROMETHEUS__ENABLED`   | `prometheus.enabled` | `false`    |
//! | `DEMO_PROMETHEUS__PATH`      | `prometheus.path`    | `/metrics` |
//! | `DEMO_PROMETHEUS__PORT`      | `prometheus.port`    | `9090`     |
//! | `DEMO_LOGGING__LEVEL`        | `logging.level`      | `info`     |
//! | `DEMO_LOGGING__JSON_FORMAT`  | `logging.json_format`| `false`    |
//!
//! Additional structures are read the same way with
//! [`App::read_config`](crate::App::read_config), whose extra name parts
//! extend the prefix (`DEMO_ORDERS_RECEIVE_QUEUE` for parts `["orders"]`).

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Top-level application settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub prometheus: PrometheusConfig,
    pub logging: LoggingConfig,
}

/// Prometheus exposition listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    /// Start the listener automatically from [`App::new`](crate::App::new)
    pub enabled: bool,
    pub path: String,
    pub port: u16,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/metrics".to_string(),
            port: 9090,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG` when set
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Build the environment prefix from the app name and optional extra parts
pub fn env_prefix(app_name: &str, parts: &[&str]) -> String {
    std::iter::once(app_name)
        .chain(parts.iter().copied())
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Deserialize `T` from the environment variables under `prefix`.
///
/// Fields missing from the environment fall back to their serde defaults.
pub fn load_from_env<T: DeserializeOwned>(prefix: &str) -> Result<T, config::ConfigError> {
    config::Config::builder()
        .add_source(
            config::Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

/// Check that `name` is UpperCamelCase (`Demo`, `OrderService`)
pub fn is_valid_app_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(?:[A-Z][A-Za-z]*)+$").expect("app name pattern is valid"))
        .is_match(name)
}
