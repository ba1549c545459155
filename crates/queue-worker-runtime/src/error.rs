//! Error types for queue operations.

use thiserror::Error;

/// Error returned by [`QueueClient`](crate::QueueClient) operations.
///
/// Every variant names the queue the failed call was made against. A call
/// aborted by the shutdown signal never produces one of these.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("receiving messages from '{queue}': {source}")]
    Receive {
        queue: String,
        #[source]
        source: TransportError,
    },

    #[error("deleting message '{message_id}' from '{queue}': {source}")]
    Delete {
        queue: String,
        message_id: String,
        #[source]
        source: TransportError,
    },

    #[error("sending message to '{queue}': {source}")]
    Send {
        queue: String,
        #[source]
        source: TransportError,
    },
}

impl QueueError {
    /// The transport failure underneath the queue operation
    pub fn transport(&self) -> &TransportError {
        match self {
            Self::Receive { source, .. } => source,
            Self::Delete { source, .. } => source,
            Self::Send { source, .. } => source,
        }
    }

    /// Check if error is transient and the call could succeed when repeated
    pub fn is_transient(&self) -> bool {
        self.transport().is_transient()
    }
}

/// Failure talking to the remote queue service
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service error: {code} - {message}")]
    Service { code: String, message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Malformed response: {0}")]
    Serialization(String),
}

impl TransportError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Authentication(_) => false,
            Self::Network(_) => true,
            Self::Service { .. } => true, // Most service errors are throttling or 5xx
            Self::QueueNotFound(_) => false,
            Self::InvalidReceipt(_) => false,
            Self::MessageTooLarge { .. } => false,
            Self::Serialization(_) => false,
        }
    }
}

/// Invalid queue or client settings, detected before any worker runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Invalid queue identifier '{value}': {message}")]
    InvalidQueue { value: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
