//! Cooperative shutdown signalling shared by workers, listeners and tasks.
//!
//! A [`ShutdownTrigger`] owns the sending side of a `tokio::sync::watch`
//! channel; every long-running component holds a [`ShutdownSignal`]
//! subscribed to it. Firing the trigger is idempotent and is observed by all
//! signals, including ones subscribed afterwards.

use std::sync::{Arc, OnceLock};
use tokio::sync::watch;

/// Sending side of the shutdown channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request shutdown of everything subscribed to this trigger
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Create a new signal observing this trigger
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the shutdown channel
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires, for calls that must run to completion
    /// regardless of shutdown
    pub fn never() -> Self {
        static NEVER: OnceLock<watch::Sender<bool>> = OnceLock::new();
        let sender = NEVER.get_or_init(|| watch::channel(false).0);
        Self {
            receiver: sender.subscribe(),
        }
    }

    /// Non-blocking check, used once per worker iteration
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once shutdown has been requested.
    ///
    /// A dropped trigger counts as shutdown so that no component can be left
    /// waiting on a channel nobody can fire any more.
    pub async fn triggered(&self) {
        let mut receiver = self.receiver.clone();
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;
