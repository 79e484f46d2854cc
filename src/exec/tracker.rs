// src/exec/tracker.rs

//! Tracking of background work that outlives a job's wait.
//!
//! Output forwarders and stdin writers keep running after the executor has
//! returned a job's outcome. Every such task is spawned through a
//! [`ForwarderTracker`], which is shared by reference (it is cheap to clone)
//! so that shutdown can wait for all pending line copies to finish.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone, Default)]
pub struct ForwarderTracker {
    inner: TaskTracker,
}

impl ForwarderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a tracked task on the current runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.spawn(future)
    }

    /// Number of tracked tasks that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.inner.len()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.is_empty()
    }

    /// Wait until every tracked task has finished.
    ///
    /// Tasks spawned while waiting are waited for as well.
    pub async fn shutdown(&self) {
        self.inner.close();
        self.inner.wait().await;
    }
}
