//! Routing of messages to handlers by type label.

use crate::context::MessageContext;
use crate::handler::{handler_fn, HandlerError, MessageHandler};
use crate::metrics::ConsumerMetrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;

/// Failure raised by the router itself rather than by a handler
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The message carries no type label, so no route can be chosen
    #[error("message has no type attribute")]
    MissingMessageType,
}

/// Dispatches each message to the handler registered for its type label.
///
/// Routes are registered up front through `&mut self`; once the router is
/// handed to a worker it sits behind an `Arc` and the table is read-only.
///
/// | message                      | outcome                                     |
/// |------------------------------|---------------------------------------------|
/// | no type label                | `Err(MissingMessageType)`, nothing runs     |
/// | type with no registered route| `Ok(())`, nothing runs                      |
/// | registered type              | handler result as is, routed counter bumped |
///
/// Messages of an unregistered type therefore succeed and get deleted. A
/// handler's error is returned untouched, so callers can downcast it to the
/// handler's own error type.
pub struct MessageRouter {
    routes: HashMap<String, Arc<dyn MessageHandler>>,
    metrics: ConsumerMetrics,
}

impl MessageRouter {
    pub fn new(metrics: ConsumerMetrics) -> Self {
        Self {
            routes: HashMap::new(),
            metrics,
        }
    }

    /// Register `handler` for `message_type`, replacing any earlier one
    pub fn handle(
        &mut self,
        message_type: impl Into<String>,
        handler: impl MessageHandler + 'static,
    ) -> &mut Self {
        self.routes.insert(message_type.into(), Arc::new(handler));
        self
    }

    /// Register an async closure for `message_type`
    pub fn handle_fn<F, Fut>(&mut self, message_type: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.handle(message_type, handler_fn(f))
    }

    /// Whether a handler is registered for `message_type`
    pub fn has_route(&self, message_type: &str) -> bool {
        self.routes.contains_key(message_type)
    }

    /// Registered message types, in no particular order
    pub fn message_types(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.message_types().collect();
        types.sort_unstable();
        f.debug_struct("MessageRouter")
            .field("routes", &types)
            .finish()
    }
}

#[async_trait]
impl MessageHandler for MessageRouter {
    /// Route one message to the handler registered for its type label
    async fn process(&self, ctx: MessageContext) -> Result<(), HandlerError> {
        let Some(message_type) = ctx.message_type().map(str::to_string) else {
            return Err(Box::new(RoutingError::MissingMessageType));
        };

        let Some(handler) = self.routes.get(&message_type) else {
            debug!(msg_type = %message_type, "No handler registered for message type");
            return Ok(());
        };

        self.metrics.record_routed(ctx.queue(), &message_type);
        handler.process(ctx).await
    }
}
