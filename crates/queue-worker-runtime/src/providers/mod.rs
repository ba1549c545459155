//! Queue client implementations.
//!
//! This module contains concrete implementations of the `QueueClient` trait
//! for different queue backends.

pub mod memory;
pub mod sqs;

pub use memory::InMemoryQueueClient;
pub use sqs::{SqsClient, MAX_MESSAGE_SIZE};
