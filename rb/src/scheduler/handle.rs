//! LoopHandle - start/stop control for a background polling loop

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A spawned loop plus the signal that stops it
pub struct LoopHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    /// Spawn `body` with a fresh shutdown receiver
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        debug!(name, "LoopHandle::spawn: called");
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(body(rx));
        Self { name, shutdown, task }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True until the loop has exited
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the loop and wait for its current tick to finish
    pub async fn stop(self) {
        debug!(name = self.name, "LoopHandle::stop: called");
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(name = self.name, error = %e, "Loop task ended abnormally");
        }
    }
}
