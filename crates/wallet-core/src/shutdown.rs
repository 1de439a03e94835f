//! Shutdown signalling for the wallet's background task.

use tokio::sync::broadcast;

/// Receiver side handed to tasks that must stop on shutdown.
pub type ShutdownSignal = broadcast::Receiver<()>;

/// Broadcasts a one-shot shutdown to every subscriber.
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        self.tx.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
