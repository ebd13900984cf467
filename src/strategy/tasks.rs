//! Detached background work
//!
//! Cache write-backs and background refreshes are spawned and never joined by
//! the request path. Their errors end inside the task and only show up in the
//! log. The tracker exists so a short-lived process can wait for outstanding
//! writes before it exits.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinSet;
use tracing::warn;

/// Tracks spawned tasks so they can be awaited at shutdown
///
/// Dropping the last clone aborts whatever is still running.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    inflight: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn inflight(&self) -> MutexGuard<'_, JoinSet<()>> {
        // A panic while holding the lock leaves the set intact
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawns `task` onto the runtime without waiting for it
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut inflight = self.inflight();
        // Reap completed tasks
        while inflight.try_join_next().is_some() {}
        inflight.spawn(task);
    }

    /// Number of tasks that have not finished yet
    pub fn pending(&self) -> usize {
        let mut inflight = self.inflight();
        while inflight.try_join_next().is_some() {}
        inflight.len()
    }

    /// Waits for every task spawned so far, including ones spawned while waiting
    pub async fn settle(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.inflight());
            if batch.is_empty() {
                return;
            }
            while let Some(result) = batch.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "background task did not complete");
                }
            }
        }
    }
}
