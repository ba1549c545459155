//! # Queue Worker Demo
//!
//! Example consumer process wiring every kind of component:
//! - two plain HTTP listeners (ports 8081 and 8082)
//! - the Prometheus endpoint (`/metrics` on port 9090)
//! - two SQS workers routing messages by type
//! - a producer task that keeps both queues supplied
//!
//! Point it at LocalStack or ElasticMQ with `DEMO_SQS_ENDPOINT`; queue URLs
//! come from `DEMO_SQS_FIRST_QUEUE` and `DEMO_SQS_SECOND_QUEUE`.

use anyhow::Context;
use axum::{routing::get, Router};
use queue_worker_app::{init_logging, App};
use queue_worker_core::{HandlerError, MessageContext, MessageRouter, WorkerConfig};
use queue_worker_runtime::{
    Message, QueueClient, QueueUrl, ShutdownSignal, SqsClient, DEFAULT_MESSAGE_TYPE_KEY,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Demo-specific settings, read from `DEMO_SQS_*`
#[derive(Debug, Deserialize)]
#[serde(default)]
struct DemoSettings {
    endpoint: String,
    first_queue: String,
    second_queue: String,
    produce_interval_seconds: u64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4566".to_string(),
            first_queue: "http://localhost:4566/000000000000/test-queue".to_string(),
            second_queue: "http://localhost:4566/000000000000/test-queue-2".to_string(),
            produce_interval_seconds: 5,
        }
    }
}

fn greeting_router(label: &'static str) -> Router {
    Router::new().route(
        "/",
        get(move || async move { format!("Ok({}) at {}", label, chrono::Utc::now()) }),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut app = App::new("Demo")?;
    if let Err(e) = init_logging(&app.config().logging) {
        eprintln!("Logging already initialised: {}", e);
    }

    info!("Starting queue worker demo");

    let settings: DemoSettings = app.read_config(&["sqs"])?;
    let first_queue = QueueUrl::new(&settings.first_queue).context("invalid first queue URL")?;
    let second_queue = QueueUrl::new(&settings.second_queue).context("invalid second queue URL")?;

    // Plain HTTP listeners
    app.add_http(greeting_router("1"), 8081);
    app.add_http(greeting_router("2"), 8082);

    // Prometheus, unless already enabled through DEMO_PROMETHEUS__ENABLED
    if !app.config().prometheus.enabled {
        app.add_prometheus("/metrics", 9090);
    }

    let processed_ops = prometheus::IntCounter::new(
        "demo_processed_ops_total",
        "The total number of processed events",
    )?;
    app.registry().register(Box::new(processed_ops.clone()))?;

    // Workers
    let mut router = MessageRouter::new(app.metrics().clone());
    router
        .handle_fn("greeting", move |ctx: MessageContext| {
            let processed_ops = processed_ops.clone();
            async move {
                info!(body = ctx.body(), "Handling greeting");
                processed_ops.inc();
                Ok::<(), HandlerError>(())
            }
        })
        .handle_fn("complaint", |ctx: MessageContext| async move {
            warn!(body = ctx.body(), "Refusing complaint, it will be redelivered");
            Err::<(), HandlerError>("complaints are not handled yet".into())
        });
    let router = Arc::new(router);

    for queue in [first_queue.clone(), second_queue.clone()] {
        let config = WorkerConfig {
            endpoint: Some(settings.endpoint.clone()),
            ..WorkerConfig::new(queue)
        };
        app.add_worker(config, router.clone())?;
    }

    // Producer
    let producer = SqsClient::new(
        WorkerConfig {
            endpoint: Some(settings.endpoint.clone()),
            ..WorkerConfig::new(first_queue.clone())
        }
        .sqs_config(),
    )?;
    let producer = Arc::new(producer);
    let interval = Duration::from_secs(settings.produce_interval_seconds.max(1));
    let queues = vec![first_queue, second_queue];

    app.add_task_fn(move |shutdown: ShutdownSignal| {
        let producer = producer.clone();
        let queues = queues.clone();
        async move {
            let mut ticker = tokio::time::interval(interval);
            let mut sequence: u64 = 0;
            loop {
                tokio::select! {
                    _ = shutdown.triggered() => return Ok(()),
                    _ = ticker.tick() => {}
                }

                sequence += 1;
                for queue in &queues {
                    let body = serde_json::json!({
                        "sequence": sequence,
                        "sent_at": chrono::Utc::now().to_rfc3339(),
                    })
                    .to_string();
                    let message = Message::new(body)
                        .with_message_type(DEFAULT_MESSAGE_TYPE_KEY, "greeting");

                    match producer.send(&shutdown, message, queue).await {
                        Ok(Some(id)) => info!(queue = %queue, message_id = %id, "Sent greeting"),
                        Ok(None) => return Ok(()),
                        Err(e) => warn!(error = %e, "Failed to send greeting"),
                    }
                }
            }
        }
    });

    println!("Press CTRL+c to exit");
    app.start().await?;

    Ok(())
}
