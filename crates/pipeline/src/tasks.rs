//! Tracked background execution of job runs.
//!
//! Every job run is spawned through [`JobTasks`], which keeps an abort
//! handle per live job and a [`TaskTracker`] over all of them. Runs are
//! never detached: shutdown waits for them and aborts whatever is still
//! going once the drain budget is spent.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio_util::task::TaskTracker;

use segflow_core::types::JobId;

type Handles = Arc<Mutex<HashMap<JobId, AbortHandle>>>;

#[derive(Default)]
pub struct JobTasks {
    tracker: TaskTracker,
    handles: Handles,
}

/// Removes a job's handle when its run ends, whether it returned, panicked
/// or was aborted.
struct HandleGuard {
    handles: Handles,
    key: JobId,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        lock(&self.handles).remove(&self.key);
    }
}

fn lock(handles: &Handles) -> MutexGuard<'_, HashMap<JobId, AbortHandle>> {
    handles.lock().unwrap_or_else(|e| e.into_inner())
}

impl JobTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `future` as the background task of `job_id`.
    pub fn spawn<F>(&self, job_id: JobId, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Held across spawn so the task cannot remove its entry before it
        // was inserted.
        let mut handles = lock(&self.handles);
        let registry = Arc::clone(&self.handles);
        let key = job_id.clone();
        let task = self.tracker.spawn(async move {
            let _guard = HandleGuard {
                handles: registry,
                key,
            };
            future.await;
        });
        handles.insert(job_id, task.abort_handle());
    }

    /// Number of job runs still in flight.
    pub fn active(&self) -> usize {
        lock(&self.handles).len()
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        lock(&self.handles).contains_key(job_id)
    }

    /// Stop accepting work and wait up to `timeout` for running jobs.
    ///
    /// Jobs still running after the timeout are aborted. Returns `true`
    /// when everything finished on its own.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            return true;
        }

        let stalled: Vec<(JobId, AbortHandle)> = lock(&self.handles).drain().collect();
        for (job_id, handle) in &stalled {
            tracing::warn!(job_id = %job_id, "Aborting propagation job at shutdown");
            handle.abort();
        }
        self.tracker.wait().await;
        false
    }
}
