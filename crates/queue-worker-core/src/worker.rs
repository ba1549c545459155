//! Per-queue worker loop.
//!
//! A [`QueueWorker`] repeatedly long-polls one queue, hands each received
//! message to its handler and deletes the messages the handler accepted.
//!
//! ```text
//!            ┌──────────── shutdown ────────────┐
//!            ▼                                  │
//!   Polling ──► Dispatching ──► Deleting ──► Polling
//!      │  (receive error: log, retry at once)
//!      └──► Exiting
//! ```
//!
//! Shutdown is checked before every receive and raced against the receive
//! in flight. A batch that has already been received is processed to the
//! end; messages of one batch are handled strictly one after another, and
//! the delete of a handled message always runs to completion.

use crate::context::MessageContext;
use crate::handler::MessageHandler;
use crate::metrics::{ConsumerMetrics, QueueMetrics};
use queue_worker_runtime::{
    clamp_batch_size, ConfigurationError, QueueClient, QueueUrl, ReceivedMessage, ShutdownSignal,
    SqsConfig, DEFAULT_MESSAGE_TYPE_KEY, MAX_RECEIVE_BATCH, MAX_WAIT_TIME_SECONDS,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, Instrument, Span};

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

// ============================================================================
// Configuration
// ============================================================================

fn default_wait_time_seconds() -> u32 {
    MAX_WAIT_TIME_SECONDS
}

fn default_message_type_key() -> String {
    DEFAULT_MESSAGE_TYPE_KEY.to_string()
}

fn default_max_messages() -> u32 {
    MAX_RECEIVE_BATCH
}

/// Settings for one queue worker.
///
/// A message whose handler fails is never deleted. It reappears after the
/// queue's visibility timeout and is retried until it succeeds or the
/// queue's redrive policy moves it to a dead-letter queue, so configure
/// `maxReceiveCount` on the queue itself to bound retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Queue service endpoint override (LocalStack, ElasticMQ)
    #[serde(default)]
    pub endpoint: Option<String>,

    pub receive_queue: QueueUrl,

    /// Long-poll wait per receive call, at most 20 seconds
    #[serde(default = "default_wait_time_seconds")]
    pub wait_time_seconds: u32,

    /// Message attribute holding the type label used for routing
    #[serde(default = "default_message_type_key")]
    pub message_type_key: String,

    /// Messages requested per receive call, clamped to 1..=10
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
}

impl WorkerConfig {
    /// Configuration for `receive_queue` with every other setting at its default
    pub fn new(receive_queue: QueueUrl) -> Self {
        Self {
            endpoint: None,
            receive_queue,
            wait_time_seconds: default_wait_time_seconds(),
            message_type_key: default_message_type_key(),
            max_messages: default_max_messages(),
        }
    }

    /// Check the settings a worker cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Invalid`] for a wait time above 20
    /// seconds or an empty message type key.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "wait_time_seconds must be at most {}, got {}",
                    MAX_WAIT_TIME_SECONDS, self.wait_time_seconds
                ),
            });
        }

        if self.message_type_key.trim().is_empty() {
            return Err(ConfigurationError::Invalid {
                message: "message_type_key must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Receive batch size actually requested from the queue
    pub fn batch_size(&self) -> u32 {
        clamp_batch_size(self.max_messages)
    }

    /// SQS client settings for this worker, with credentials taken from the
    /// standard AWS environment variables.
    ///
    /// Without an endpoint override, an AWS queue URL decides both region
    /// and endpoint; `AWS_REGION` only applies when the URL names no region.
    pub fn sqs_config(&self) -> SqsConfig {
        let mut config = SqsConfig {
            endpoint: self.endpoint.clone(),
            wait_time_seconds: self.wait_time_seconds,
            message_type_key: self.message_type_key.clone(),
            ..Default::default()
        }
        .with_env_credentials();

        if config.endpoint.is_none() {
            if let Some(region) = self.receive_queue.aws_region() {
                config.region = region;
                config.endpoint = Some(self.receive_queue.origin());
            }
        }

        config
    }
}

// ============================================================================
// Worker
// ============================================================================

/// What happened to a single dispatched message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler succeeded and the message was deleted
    Deleted,
    /// Handler succeeded but the delete call failed; the message will be
    /// delivered again
    DeleteFailed,
    /// Handler failed; the message was left on the queue
    HandlerFailed,
}

/// Consumes one queue until shutdown
pub struct QueueWorker {
    config: WorkerConfig,
    client: Arc<dyn QueueClient>,
    handler: Arc<dyn MessageHandler>,
    metrics: QueueMetrics,
    shutdown: ShutdownSignal,
    span: Span,
}

impl QueueWorker {
    pub fn new(
        config: WorkerConfig,
        client: Arc<dyn QueueClient>,
        handler: Arc<dyn MessageHandler>,
        metrics: &ConsumerMetrics,
        shutdown: ShutdownSignal,
    ) -> Self {
        let span = tracing::info_span!(
            "worker",
            app = %metrics.app(),
            queue = %config.receive_queue.name(),
        );

        Self {
            metrics: metrics.for_queue(&config.receive_queue),
            config,
            client,
            handler,
            shutdown,
            span,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }

    /// Run the receive loop until the shutdown signal fires
    pub async fn run(self) {
        let span = self.span.clone();
        self.run_loop().instrument(span).await
    }

    async fn run_loop(&self) {
        let queue = &self.config.receive_queue;
        let batch_size = self.config.batch_size();

        info!(batch_size, "Worker started");

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            let received = tokio::select! {
                _ = self.shutdown.triggered() => break,
                result = self.client.receive(&self.shutdown, queue, batch_size) => result,
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => {
                    // No backoff: the next receive starts straight away
                    error!(error = %e, transient = e.is_transient(), "Failed to receive messages");
                    tokio::task::yield_now().await;
                    continue;
                }
            };

            if messages.is_empty() {
                // An empty receive can complete without suspending
                tokio::task::yield_now().await;
                continue;
            }

            debug!(count = messages.len(), "Received messages");
            self.metrics.record_received(messages.len());

            for message in messages {
                self.dispatch(message).await;
            }
        }

        info!("Worker stopped");
    }

    /// Hand one message to the handler and delete it if the handler succeeded
    pub async fn dispatch(&self, message: ReceivedMessage) -> DispatchOutcome {
        let queue = &self.config.receive_queue;
        let ctx = MessageContext::new(message.clone(), queue.clone(), &self.config.message_type_key);
        let span = ctx.span().clone();

        async {
            let started = Instant::now();
            let result = self.handler.process(ctx).await;
            self.metrics.observe_processing_duration(started.elapsed());

            if let Err(e) = result {
                self.metrics.record_processing_failure();
                error!(
                    error = %e,
                    receive_count = message.receive_count,
                    "Failed to process message, leaving it for redelivery"
                );
                return DispatchOutcome::HandlerFailed;
            }

            self.metrics.record_processed();

            // Not raced against shutdown: a handled message must not come back
            match self.client.delete(&ShutdownSignal::never(), &message, queue).await {
                Ok(()) => {
                    self.metrics.record_deleted();
                    debug!("Message processed and deleted");
                    DispatchOutcome::Deleted
                }
                Err(e) => {
                    error!(error = %e, "Failed to delete processed message");
                    DispatchOutcome::DeleteFailed
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for QueueWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWorker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
