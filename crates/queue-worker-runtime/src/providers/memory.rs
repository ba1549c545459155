//! In-memory queue provider implementation for testing and development.
//!
//! Behaves like an SQS standard queue closely enough to drive a worker
//! end to end:
//! - received messages stay hidden until deleted or until their visibility
//!   timeout lapses, after which they are handed out again
//! - empty receives long-poll and wake up when a message is sent
//! - each queue URL gets its own queue, created on first use
//!
//! Only the long-poll wait observes the shutdown signal. Delete and send
//! complete immediately, so there is nothing to cancel.

use crate::client::{clamp_batch_size, QueueClient};
use crate::error::{QueueError, TransportError};
use crate::message::{Message, MessageId, QueueUrl, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::InMemoryConfig;
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message waiting in the queue
struct StoredMessage {
    message_id: MessageId,
    body: String,
    attributes: HashMap<String, String>,
    receive_count: u32,
}

/// A message handed out and not yet deleted
struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

/// Internal queue state for a single queue
#[derive(Default)]
struct InMemoryQueue {
    messages: VecDeque<StoredMessage>,
    /// Keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
    deleted: u64,
}

impl InMemoryQueue {
    /// Return messages whose visibility timeout lapsed to the queue
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| in_flight.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                self.messages.push_back(in_flight.message);
            }
        }
    }

    fn take(&mut self, max: usize, visibility: std::time::Duration, now: Instant) -> Vec<ReceivedMessage> {
        let mut batch = Vec::new();

        while batch.len() < max {
            let Some(mut message) = self.messages.pop_front() else {
                break;
            };
            message.receive_count += 1;

            let receipt = uuid::Uuid::new_v4().to_string();
            batch.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                body: message.body.clone(),
                attributes: message.attributes.clone(),
                receipt_handle: ReceiptHandle::new(receipt.clone()),
                receive_count: message.receive_count,
                received_at: Timestamp::now(),
            });

            self.in_flight.insert(
                receipt,
                InFlightMessage {
                    message,
                    visible_at: now + visibility,
                },
            );
        }

        batch
    }

    fn next_visible_at(&self) -> Option<Instant> {
        self.in_flight.values().map(|m| m.visible_at).min()
    }
}

// ============================================================================
// InMemoryQueueClient
// ============================================================================

/// In-memory queue client.
///
/// Clones share the same queues, so a test can keep one handle for
/// inspection while a worker owns another.
#[derive(Clone)]
pub struct InMemoryQueueClient {
    queues: Arc<Mutex<HashMap<QueueUrl, InMemoryQueue>>>,
    arrivals: Arc<Notify>,
    config: InMemoryConfig,
}

impl InMemoryQueueClient {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            arrivals: Arc::new(Notify::new()),
            config,
        }
    }

    /// Messages waiting to be received
    pub fn pending_count(&self, queue: &QueueUrl) -> usize {
        self.lock()
            .get(queue)
            .map_or(0, |q| q.messages.len())
    }

    /// Messages received but neither deleted nor returned to the queue yet
    pub fn in_flight_count(&self, queue: &QueueUrl) -> usize {
        self.lock()
            .get(queue)
            .map_or(0, |q| q.in_flight.len())
    }

    /// Messages deleted since the queue was created
    pub fn deleted_count(&self, queue: &QueueUrl) -> u64 {
        self.lock().get(queue).map_or(0, |q| q.deleted)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueueUrl, InMemoryQueue>> {
        // The map stays consistent even if a holder panicked
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take a batch, returning the earliest pending visibility deadline when empty
    fn try_take(&self, queue: &QueueUrl, max: usize) -> (Vec<ReceivedMessage>, Option<Instant>) {
        let mut queues = self.lock();
        let state = queues.entry(queue.clone()).or_default();

        let now = Instant::now();
        state.requeue_expired(now);
        let batch = state.take(max, self.config.visibility_timeout, now);

        (batch, state.next_visible_at())
    }
}

impl Default for InMemoryQueueClient {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn receive(
        &self,
        shutdown: &ShutdownSignal,
        queue: &QueueUrl,
        max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max = clamp_batch_size(max_messages) as usize;
        let deadline = Instant::now() + self.config.wait_time;

        loop {
            if shutdown.is_triggered() {
                return Ok(Vec::new());
            }

            // Register interest before looking so a concurrent send is not missed
            let arrived = self.arrivals.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            let (batch, next_visible_at) = self.try_take(queue, max);
            if !batch.is_empty() {
                return Ok(batch);
            }

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_visible_at.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = shutdown.triggered() => return Ok(Vec::new()),
                _ = &mut arrived => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(
        &self,
        _shutdown: &ShutdownSignal,
        message: &ReceivedMessage,
        queue: &QueueUrl,
    ) -> Result<(), QueueError> {
        let mut queues = self.lock();
        let removed = match queues.get_mut(queue) {
            Some(state) => {
                let removed = state
                    .in_flight
                    .remove(message.receipt_handle.as_str())
                    .is_some();
                if removed {
                    state.deleted += 1;
                }
                removed
            }
            None => false,
        };

        if !removed {
            return Err(QueueError::Delete {
                queue: queue.to_string(),
                message_id: message.message_id.to_string(),
                source: TransportError::InvalidReceipt(message.receipt_handle.to_string()),
            });
        }

        Ok(())
    }

    async fn send(
        &self,
        _shutdown: &ShutdownSignal,
        message: Message,
        queue: &QueueUrl,
    ) -> Result<Option<MessageId>, QueueError> {
        let message_id = MessageId::new();

        self.lock()
            .entry(queue.clone())
            .or_default()
            .messages
            .push_back(StoredMessage {
                message_id: message_id.clone(),
                body: message.body,
                attributes: message.attributes,
                receive_count: 0,
            });

        self.arrivals.notify_waiters();
        Ok(Some(message_id))
    }
}
