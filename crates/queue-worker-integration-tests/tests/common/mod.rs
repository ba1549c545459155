//! Common test utilities for queue worker integration tests
//!
//! This module provides:
//! - A recording handler that can be told to fail
//! - A queue client wrapper that counts delete calls
//! - Builders for queues, clients and typed messages

use async_trait::async_trait;
use queue_worker_core::{HandlerError, MessageContext, MessageHandler};
use queue_worker_runtime::{
    InMemoryConfig, InMemoryQueueClient, Message, MessageId, QueueClient, QueueError, QueueUrl,
    ReceivedMessage, ShutdownSignal,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

#[allow(dead_code)]
pub fn queue(name: &str) -> QueueUrl {
    QueueUrl::new(format!("http://localhost:4566/000000000000/{}", name)).unwrap()
}

/// In-memory client with a short long-poll so idle workers loop quickly
#[allow(dead_code)]
pub fn memory_client() -> InMemoryQueueClient {
    InMemoryQueueClient::new(InMemoryConfig {
        wait_time: Duration::from_millis(50),
        visibility_timeout: Duration::from_secs(30),
    })
}

#[allow(dead_code)]
pub fn typed(body: &str, message_type: &str) -> Message {
    Message::new(body).with_message_type("msgType", message_type)
}

/// Poll `condition` for up to two seconds
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// ============================================================================
// Recording Handler
// ============================================================================

/// Handler that remembers the bodies it saw and fails on demand
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct RecordingHandler {
    bodies: Arc<Mutex<Vec<String>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingHandler {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn failing() -> Self {
        let handler = Self::default();
        handler.fail.store(true, Ordering::SeqCst);
        handler
    }

    #[allow(dead_code)]
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn process(&self, ctx: MessageContext) -> Result<(), HandlerError> {
        self.bodies.lock().unwrap().push(ctx.body().to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err("handler asked to fail".into());
        }
        Ok(())
    }
}

// ============================================================================
// Counting Client
// ============================================================================

/// Wraps an in-memory client and counts delete calls
#[derive(Clone)]
#[allow(dead_code)]
pub struct CountingClient {
    inner: InMemoryQueueClient,
    deletes: Arc<AtomicUsize>,
}

impl CountingClient {
    #[allow(dead_code)]
    pub fn new(inner: InMemoryQueueClient) -> Self {
        Self {
            inner,
            deletes: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[allow(dead_code)]
    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueClient for CountingClient {
    async fn receive(
        &self,
        shutdown: &ShutdownSignal,
        queue: &QueueUrl,
        max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.inner.receive(shutdown, queue, max_messages).await
    }

    async fn delete(
        &self,
        shutdown: &ShutdownSignal,
        message: &ReceivedMessage,
        queue: &QueueUrl,
    ) -> Result<(), QueueError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(shutdown, message, queue).await
    }

    async fn send(
        &self,
        shutdown: &ShutdownSignal,
        message: Message,
        queue: &QueueUrl,
    ) -> Result<Option<MessageId>, QueueError> {
        self.inner.send(shutdown, message, queue).await
    }
}
