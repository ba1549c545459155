//! Application orchestrator.
//!
//! An [`App`] collects queue workers, HTTP listeners and background tasks,
//! launches them together under one shutdown signal and waits for all of
//! them on the way out.
//!
//! ```no_run
//! use queue_worker_app::App;
//! use queue_worker_core::{HandlerError, MessageContext, MessageRouter, WorkerConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut app = App::new("OrderService")?;
//!
//! let mut router = MessageRouter::new(app.metrics().clone());
//! router.handle_fn("created", |ctx: MessageContext| async move {
//!     tracing::info!(body = ctx.body(), "Order created");
//!     Ok::<(), HandlerError>(())
//! });
//!
//! // ORDERSERVICE_ORDERS_RECEIVE_QUEUE=https://sqs.../orders
//! let config: WorkerConfig = app.read_config(&["orders"])?;
//! app.add_worker(config, Arc::new(router))?;
//!
//! app.start().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{env_prefix, is_valid_app_name, load_from_env, AppConfig};
use crate::error::AppError;
use crate::http::{prometheus_router, HttpListener};
use axum::Router;
use prometheus::Registry;
use queue_worker_core::{
    task_fn, ConsumerMetrics, MessageHandler, QueueWorker, Task, WorkerConfig,
};
use queue_worker_runtime::{QueueClient, ShutdownSignal, ShutdownTrigger, SqsClient};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn, Instrument};

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;

/// A unit of work waiting to be launched
enum Component {
    Worker(QueueWorker),
    Task { name: String, task: Arc<dyn Task> },
}

impl Component {
    fn spawn(self, set: &mut JoinSet<()>, shutdown: ShutdownSignal) {
        match self {
            Self::Worker(worker) => {
                set.spawn(worker.run());
            }
            Self::Task { name, task } => {
                let span = tracing::info_span!("task", name = %name);
                set.spawn(
                    async move {
                        match task.run(shutdown).await {
                            Ok(()) => info!("Task finished"),
                            Err(e) => error!(error = %format!("{:#}", e), "Task failed"),
                        }
                    }
                    .instrument(span),
                );
            }
        }
    }
}

enum Lifecycle {
    Configuring(Vec<Component>),
    Running(JoinSet<()>),
    Stopped,
}

/// Owns every long-running component of a consumer process
pub struct App {
    name: String,
    config: AppConfig,
    registry: Registry,
    metrics: ConsumerMetrics,
    trigger: ShutdownTrigger,
    lifecycle: Lifecycle,
    task_count: usize,
}

impl App {
    /// Create an application named `name`.
    ///
    /// The name must be UpperCamelCase; its upper-cased form prefixes every
    /// environment variable the app reads. When `<NAME>_PROMETHEUS__ENABLED`
    /// is true the Prometheus listener is added straight away.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidName`] for a malformed name and
    /// [`AppError::Config`] when the environment holds unparseable values.
    pub fn new(name: impl Into<String>) -> Result<Self, AppError> {
        let name = name.into();
        if !is_valid_app_name(&name) {
            return Err(AppError::InvalidName { name });
        }

        let config: AppConfig = load_from_env(&env_prefix(&name, &[]))?;
        let registry = Registry::new();
        let metrics = ConsumerMetrics::new(name.clone(), &registry)?;

        let mut app = Self {
            name,
            config,
            registry,
            metrics,
            trigger: ShutdownTrigger::new(),
            lifecycle: Lifecycle::Configuring(Vec::new()),
            task_count: 0,
        };

        if app.config.prometheus.enabled {
            let prometheus = app.config.prometheus.clone();
            app.add_prometheus(&prometheus.path, prometheus.port);
        }

        Ok(app)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings loaded from the environment at construction
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Consumer metrics shared by every worker of this app
    pub fn metrics(&self) -> &ConsumerMetrics {
        &self.metrics
    }

    /// Registry backing the Prometheus endpoint; register extra metrics here
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handle that requests shutdown from anywhere, for example a task
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Read `T` from environment variables prefixed with the app name
    /// followed by `parts`
    pub fn read_config<T: DeserializeOwned>(&self, parts: &[&str]) -> Result<T, AppError> {
        Ok(load_from_env(&env_prefix(&self.name, parts))?)
    }

    /// Add a worker consuming `config.receive_queue` through an SQS client.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Queue`] when the configuration is invalid or the
    /// client cannot be built.
    pub fn add_worker(
        &mut self,
        config: WorkerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<&mut Self, AppError> {
        config.validate()?;
        let client = SqsClient::new(config.sqs_config())?;
        self.add_worker_with_client(config, Arc::new(client), handler)
    }

    /// Add a worker using an already constructed queue client
    pub fn add_worker_with_client(
        &mut self,
        config: WorkerConfig,
        client: Arc<dyn QueueClient>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<&mut Self, AppError> {
        config.validate()?;

        info!(app = %self.name, queue = %config.receive_queue, "Adding queue worker");
        let worker = QueueWorker::new(config, client, handler, &self.metrics, self.trigger.subscribe());
        self.register(Component::Worker(worker));
        Ok(self)
    }

    /// Serve `router` on `port` for the lifetime of the app
    pub fn add_http(&mut self, router: Router, port: u16) -> &mut Self {
        let name = format!("http:{}", port);
        self.register_task(name, Arc::new(HttpListener::new(router, port)))
    }

    /// Expose the app's metrics registry at `path` on `port`
    pub fn add_prometheus(&mut self, path: &str, port: u16) -> &mut Self {
        info!(app = %self.name, path, port, "Adding Prometheus listener");
        self.add_http(prometheus_router(path, self.registry.clone()), port)
    }

    /// Add a background task
    pub fn add_task(&mut self, task: impl Task + 'static) -> &mut Self {
        let name = format!("task-{}", self.task_count);
        self.task_count += 1;
        self.register_task(name, Arc::new(task))
    }

    /// Add an async closure as a background task
    pub fn add_task_fn<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(ShutdownSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_task(task_fn(f))
    }

    fn register_task(&mut self, name: String, task: Arc<dyn Task>) -> &mut Self {
        self.register(Component::Task { name, task });
        self
    }

    /// Queue a component, or start it right away if the app is running
    fn register(&mut self, component: Component) {
        match &mut self.lifecycle {
            Lifecycle::Configuring(pending) => pending.push(component),
            Lifecycle::Running(set) => component.spawn(set, self.trigger.subscribe()),
            Lifecycle::Stopped => warn!(app = %self.name, "Ignoring component added after stop"),
        }
    }

    /// Spawn every component under the shared shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AlreadyStarted`] when called a second time.
    pub fn launch(&mut self) -> Result<(), AppError> {
        let pending = match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Configuring(pending) => pending,
            other => {
                self.lifecycle = other;
                return Err(AppError::AlreadyStarted);
            }
        };

        info!(app = %self.name, components = pending.len(), "Starting app");

        let mut set = JoinSet::new();
        for component in pending {
            component.spawn(&mut set, self.trigger.subscribe());
        }
        self.lifecycle = Lifecycle::Running(set);

        Ok(())
    }

    /// Launch, then run until SIGINT, SIGTERM or the shutdown trigger, then
    /// stop.
    pub async fn start(&mut self) -> Result<(), AppError> {
        self.launch()?;

        let signal = self.trigger.subscribe();
        tokio::select! {
            _ = os_shutdown_signal() => {}
            _ = signal.triggered() => {
                info!(app = %self.name, "Shutdown requested");
            }
        }

        self.stop().await;
        Ok(())
    }

    /// Fire the shutdown signal and wait for every launched component to
    /// exit. Safe to call more than once.
    pub async fn stop(&mut self) {
        info!(app = %self.name, "Stopping app");
        self.trigger.trigger();

        let Lifecycle::Running(mut set) = std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped)
        else {
            return;
        };

        while let Some(result) = set.join_next().await {
            if let Err(e) = result {
                error!(app = %self.name, error = %e, "Component panicked or was cancelled");
            }
        }

        info!(app = %self.name, "App stopped");
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.lifecycle {
            Lifecycle::Configuring(_) => "configuring",
            Lifecycle::Running(_) => "running",
            Lifecycle::Stopped => "stopped",
        };
        f.debug_struct("App")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &state)
            .finish()
    }
}

/// Resolve on SIGINT (Ctrl+C) or, on Unix, SIGTERM
async fn os_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
