//! # Queue Worker Core
//!
//! Consumer-side building blocks for SQS-compatible queues: the handler
//! contract, routing by message type, per-queue metrics and the worker loop
//! that ties them to a [`QueueClient`](queue_worker_runtime::QueueClient).
//!
//! ## Usage
//!
//! ```no_run
//! use prometheus::Registry;
//! use queue_worker_core::{
//!     ConsumerMetrics, HandlerError, MessageContext, MessageRouter, QueueWorker, WorkerConfig,
//! };
//! use queue_worker_runtime::{InMemoryQueueClient, QueueUrl, ShutdownTrigger};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = ConsumerMetrics::new("Orders", &Registry::new())?;
//!
//! let mut router = MessageRouter::new(metrics.clone());
//! router.handle_fn("created", |ctx: MessageContext| async move {
//!     tracing::info!(body = ctx.body(), "Order created");
//!     Ok::<(), HandlerError>(())
//! });
//!
//! let queue = QueueUrl::new("http://localhost:9324/000000000000/orders")?;
//! let shutdown = ShutdownTrigger::new();
//! let worker = QueueWorker::new(
//!     WorkerConfig::new(queue),
//!     Arc::new(InMemoryQueueClient::default()),
//!     Arc::new(router),
//!     &metrics,
//!     shutdown.subscribe(),
//! );
//! tokio::spawn(worker.run());
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod handler;
pub mod metrics;
pub mod router;
pub mod task;
pub mod worker;

pub use context::MessageContext;
pub use handler::{handler_fn, HandlerError, HandlerFn, MessageHandler};
pub use metrics::{ConsumerMetrics, QueueMetrics};
pub use router::{MessageRouter, RoutingError};
pub use task::{task_fn, Task, TaskFn};
pub use worker::{DispatchOutcome, QueueWorker, WorkerConfig};
