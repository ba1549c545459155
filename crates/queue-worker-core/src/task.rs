//! Long-running background tasks supervised alongside the workers.

use async_trait::async_trait;
use queue_worker_runtime::ShutdownSignal;
use std::future::Future;

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;

/// A unit of background work launched and joined with the workers.
///
/// Implementations must return promptly once `shutdown` fires; shutdown
/// waits for every task to finish.
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, shutdown: ShutdownSignal) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`Task`]
pub struct TaskFn<F> {
    f: F,
}

/// Wrap an async closure as a [`Task`]
pub fn task_fn<F, Fut>(f: F) -> TaskFn<F>
where
    F: Fn(ShutdownSignal) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    TaskFn { f }
}

#[async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: Fn(ShutdownSignal) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self, shutdown: ShutdownSignal) -> anyhow::Result<()> {
        (self.f)(shutdown).await
    }
}
