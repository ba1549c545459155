//! # Queue Worker Runtime
//!
//! Queue client abstraction for SQS-compatible message queues, shared by the
//! consumer core and its providers.
//!
//! This library provides:
//! - The [`QueueClient`] trait (receive, delete, send)
//! - An SQS provider talking to the HTTP query API
//! - An in-memory provider for tests and local development
//! - A cooperative shutdown signal every long-running component observes
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for queue operations and configuration
//! - [`message`] - Queue identifiers, messages and receipt handles
//! - [`provider`] - Provider configuration
//! - [`client`] - Client trait and cancellation helpers
//! - [`providers`] - Concrete client implementations
//! - [`shutdown`] - Shutdown trigger and signal

// Module declarations
pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod shutdown;

// Re-export commonly used types at crate root for convenience
pub use client::{clamp_batch_size, unless_shutdown, QueueClient, MAX_RECEIVE_BATCH, MIN_RECEIVE_BATCH};
pub use error::{ConfigurationError, QueueError, TransportError};
pub use message::{Message, MessageId, QueueUrl, ReceiptHandle, ReceivedMessage, Timestamp};
pub use provider::{InMemoryConfig, SqsConfig, DEFAULT_MESSAGE_TYPE_KEY, MAX_WAIT_TIME_SECONDS};
pub use providers::{InMemoryQueueClient, SqsClient};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
