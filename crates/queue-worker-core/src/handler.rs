//! Message handler contract.

use crate::context::MessageContext;
use async_trait::async_trait;
use std::future::Future;

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

/// Error a handler reports to signal that a message was not processed
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes one received message.
///
/// Returning `Ok` tells the worker the message is done and may be deleted.
/// Returning `Err` leaves it on the queue; it becomes visible again once its
/// visibility timeout lapses. Handlers may take as long as they need, but
/// the worker processes the next message of the batch only after this one
/// returns.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn process(&self, ctx: MessageContext) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into a [`MessageHandler`]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a [`MessageHandler`].
///
/// ```
/// use queue_worker_core::{handler_fn, HandlerError, MessageContext};
///
/// let handler = handler_fn(|ctx: MessageContext| async move {
///     tracing::info!(body = ctx.body(), "Handling message");
///     Ok::<(), HandlerError>(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(MessageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(MessageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn process(&self, ctx: MessageContext) -> Result<(), HandlerError> {
        (self.f)(ctx).await
    }
}
