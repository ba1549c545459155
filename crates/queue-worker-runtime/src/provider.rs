//! Provider configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default message attribute carrying the type label
pub const DEFAULT_MESSAGE_TYPE_KEY: &str = "msgType";

/// Longest long-poll wait SQS accepts
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;

/// SQS-compatible provider configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqsConfig {
    pub region: String,
    /// Service endpoint override (LocalStack, ElasticMQ). Defaults to the
    /// regional AWS endpoint.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Long-poll wait for receive calls, capped at [`MAX_WAIT_TIME_SECONDS`]
    pub wait_time_seconds: u32,
    /// Message attribute requested on receive and used for routing
    pub message_type_key: String,
    /// Per-receive visibility timeout; the queue default applies when unset
    pub visibility_timeout_seconds: Option<u32>,
}

impl Default for SqsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            wait_time_seconds: MAX_WAIT_TIME_SECONDS,
            message_type_key: DEFAULT_MESSAGE_TYPE_KEY.to_string(),
            visibility_timeout_seconds: None,
        }
    }
}

impl SqsConfig {
    /// Fill region and credentials from the standard AWS environment
    /// variables where they are not already set
    pub fn with_env_credentials(mut self) -> Self {
        if let Ok(region) = std::env::var("AWS_REGION") {
            if !region.is_empty() {
                self.region = region;
            }
        }
        if self.access_key_id.is_none() {
            self.access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok();
        }
        if self.secret_access_key.is_none() {
            self.secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok();
        }
        self
    }

    /// Resolved endpoint: the override, or the regional AWS endpoint
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/').to_string(),
            _ => format!("https://sqs.{}.amazonaws.com", self.region),
        }
    }
}

impl std::fmt::Debug for SqsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqsConfig")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field("wait_time_seconds", &self.wait_time_seconds)
            .field("message_type_key", &self.message_type_key)
            .field("visibility_timeout_seconds", &self.visibility_timeout_seconds)
            .finish()
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// How long an empty receive waits for a message to arrive
    pub wait_time: Duration,
    /// How long a received, undeleted message stays hidden
    pub visibility_timeout: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(MAX_WAIT_TIME_SECONDS as u64),
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
