//! Message types for queue operations including core domain identifiers.

use crate::error::ConfigurationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue identifier.
///
/// SQS-compatible services address a queue by its URL, so the identifier must
/// be an absolute `http` or `https` URL with a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueUrl(String);

impl QueueUrl {
    /// Create new queue URL with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ConfigurationError> {
        let value = value.into();
        let invalid = |message: &str| ConfigurationError::InvalidQueue {
            value: value.clone(),
            message: message.to_string(),
        };

        if value.trim().is_empty() {
            return Err(invalid("must not be empty"));
        }

        let parsed = url::Url::parse(&value).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if parsed.host_str().is_none() {
            return Err(invalid("must include a host"));
        }

        Ok(Self(value))
    }

    /// Get queue URL as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// AWS region of an SQS queue URL, for both the
    /// `sqs.<region>.amazonaws.com` and the legacy
    /// `<region>.queue.amazonaws.com` host forms
    pub fn aws_region(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.0).ok()?;
        let labels: Vec<&str> = parsed.host_str()?.split('.').collect();
        match labels.as_slice() {
            ["sqs", region, "amazonaws", "com", ..] | [region, "queue", "amazonaws", "com", ..] => {
                Some(region.to_string())
            }
            _ => None,
        }
    }

    /// Scheme, host and port of the URL (`https://sqs.eu-west-1.amazonaws.com`)
    pub fn origin(&self) -> String {
        url::Url::parse(&self.0)
            .map(|parsed| parsed.origin().ascii_serialization())
            .unwrap_or_default()
    }

    /// Last path segment of the URL, which SQS uses as the queue name
    pub fn name(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.0)
    }
}

impl std::fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueUrl {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for QueueUrl {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueUrl> for String {
    fn from(value: QueueUrl) -> Self {
        value.0
    }
}

/// Identifier the queue service assigned to a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque token required to delete a received message.
///
/// The token is only valid for the receive that produced it; once the
/// visibility timeout expires the queue hands out a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get handle string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be sent through the queue system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub body: String,
    pub attributes: HashMap<String, String>,
}

impl Message {
    /// Create new message with body
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add message attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Tag the message with a type label under `key` so consumers can route it
    pub fn with_message_type(self, key: &str, message_type: impl Into<String>) -> Self {
        self.with_attribute(key, message_type)
    }
}

/// A message received from the queue with processing metadata
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: String,
    pub attributes: HashMap<String, String>,
    pub receipt_handle: ReceiptHandle,
    /// Approximate number of times the queue has handed this message out
    pub receive_count: u32,
    pub received_at: Timestamp,
}

impl ReceivedMessage {
    /// Look up a string attribute by name
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Convert back to Message (for forwarding)
    pub fn message(&self) -> Message {
        Message {
            body: self.body.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
