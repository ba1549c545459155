//! Per-message dispatch context.

use queue_worker_runtime::{QueueUrl, ReceivedMessage};
use tracing::Span;

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

/// Everything a handler gets to see about one received message.
///
/// Built fresh for every message and moved into the handler, so a handler
/// owns its context outright. The attached span carries the message id,
/// queue and type label; the worker runs the handler inside it, so log lines
/// emitted while handling are correlated without any extra work.
#[derive(Debug)]
pub struct MessageContext {
    message: ReceivedMessage,
    queue: QueueUrl,
    message_type: Option<String>,
    span: Span,
}

impl MessageContext {
    /// Build the context for `message`, reading its type label from the
    /// attribute named `type_key`
    pub fn new(message: ReceivedMessage, queue: QueueUrl, type_key: &str) -> Self {
        let message_type = message
            .attribute(type_key)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let span = tracing::info_span!(
            "message",
            message_id = %message.message_id,
            queue = %queue.name(),
            msg_type = message_type.as_deref().unwrap_or(""),
        );

        Self {
            message,
            queue,
            message_type,
            span,
        }
    }

    pub fn message(&self) -> &ReceivedMessage {
        &self.message
    }

    /// Message body as received
    pub fn body(&self) -> &str {
        &self.message.body
    }

    /// Look up a message attribute by name
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.message.attribute(key)
    }

    pub fn queue(&self) -> &QueueUrl {
        &self.queue
    }

    /// Type label, absent when the message carries no (or an empty) label
    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    /// Span scoped to this message
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Take the underlying message, for handlers that forward it elsewhere
    pub fn into_message(self) -> ReceivedMessage {
        self.message
    }
}
