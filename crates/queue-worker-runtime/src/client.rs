//! Client trait for queue operations.

use crate::error::QueueError;
use crate::message::{Message, MessageId, QueueUrl, ReceivedMessage};
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use std::future::Future;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Smallest batch a receive call may ask for
pub const MIN_RECEIVE_BATCH: u32 = 1;

/// Largest batch SQS-compatible services hand out per receive call
pub const MAX_RECEIVE_BATCH: u32 = 10;

/// Main interface for queue operations across all providers.
///
/// Every operation takes the caller's [`ShutdownSignal`]. When the signal
/// fires while a call is in flight the call returns promptly with an empty,
/// successful result: cancellation is not a failure.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Long-poll the queue for up to `max_messages` messages.
    ///
    /// `max_messages` is clamped to
    /// [`MIN_RECEIVE_BATCH`]`..=`[`MAX_RECEIVE_BATCH`].
    async fn receive(
        &self,
        shutdown: &ShutdownSignal,
        queue: &QueueUrl,
        max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Remove a received message using its receipt handle
    async fn delete(
        &self,
        shutdown: &ShutdownSignal,
        message: &ReceivedMessage,
        queue: &QueueUrl,
    ) -> Result<(), QueueError>;

    /// Enqueue a new message. Returns `None` when cancelled before the queue
    /// acknowledged it.
    async fn send(
        &self,
        shutdown: &ShutdownSignal,
        message: Message,
        queue: &QueueUrl,
    ) -> Result<Option<MessageId>, QueueError>;
}

/// Clamp a requested batch size into the range the queue service supports
pub fn clamp_batch_size(max_messages: u32) -> u32 {
    max_messages.clamp(MIN_RECEIVE_BATCH, MAX_RECEIVE_BATCH)
}

/// Run `operation` unless shutdown is requested first.
///
/// Returns `None` when the shutdown signal won the race; the in-flight
/// operation is dropped.
pub async fn unless_shutdown<F, T>(shutdown: &ShutdownSignal, operation: F) -> Option<T>
where
    F: Future<Output = T>,
{
    if shutdown.is_triggered() {
        return None;
    }

    tokio::select! {
        _ = shutdown.triggered() => None,
        result = operation => Some(result),
    }
}
