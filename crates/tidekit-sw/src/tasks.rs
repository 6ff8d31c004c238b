//! Detached background tasks.
//!
//! Runtime-cache writes are fire-and-forget: they must never delay or fail
//! the response already on its way to the page. [`TaskSet`] makes that
//! explicit, and gives tests a deterministic join point.

use std::future::Future;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

/// A set of detached tasks with a join hook.
#[derive(Debug, Default)]
pub struct TaskSet {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a detached task.
    ///
    /// The task's outcome never feeds back into the caller; anything it
    /// needs to report goes through its own logging.
    pub async fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.handles.lock().await.push(handle);
    }

    /// Await completion of every task spawned so far.
    pub async fn wait_idle(&self) {
        let drained: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in drained {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task panicked");
            }
        }
    }

    /// Number of tasks spawned and not yet waited on.
    pub async fn pending(&self) -> usize {
        self.handles.lock().await.len()
    }
}
