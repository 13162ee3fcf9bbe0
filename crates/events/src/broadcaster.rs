//! Per-job fan-out of progress snapshots.
//!
//! [`ProgressBroadcaster`] keeps, for every known job, the latest snapshot
//! and the set of listeners currently attached. It is designed to be shared
//! via `Arc<ProgressBroadcaster>` between the job orchestrator (the only
//! publisher) and the WebSocket handlers (the listeners).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use segflow_core::progress::ProgressSnapshot;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half used to push snapshots to one listener.
pub type SnapshotSender = mpsc::UnboundedSender<ProgressSnapshot>;

/// Handle returned by [`ProgressBroadcaster::subscribe`].
pub type ListenerId = u64;

#[derive(Default)]
struct JobChannel {
    latest: Option<ProgressSnapshot>,
    listeners: HashMap<ListenerId, SnapshotSender>,
}

/// Job-scoped listener registry with latest-snapshot replay.
///
/// Thread-safe via interior `RwLock`. Snapshots for one job are only ever
/// delivered to listeners of that job.
pub struct ProgressBroadcaster {
    jobs: RwLock<HashMap<String, JobChannel>>,
    next_listener: AtomicU64,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Make `job_id` known so listeners can attach before its first
    /// snapshot is published. No-op for an already registered job.
    pub async fn register(&self, job_id: &str) {
        self.jobs
            .write()
            .await
            .entry(job_id.to_string())
            .or_default();
    }

    /// Attach a listener to `job_id`.
    ///
    /// The latest snapshot, if any, is delivered before the listener joins
    /// the live set, under the same lock, so a listener never misses the
    /// snapshot that was current when it subscribed. Returns `None` when
    /// the job is not registered.
    pub async fn subscribe(&self, job_id: &str, sender: SnapshotSender) -> Option<ListenerId> {
        let mut jobs = self.jobs.write().await;
        let channel = jobs.get_mut(job_id)?;
        let listener_id = self.next_listener.fetch_add(1, Ordering::Relaxed);

        if let Some(latest) = &channel.latest {
            if sender.send(latest.clone()).is_err() {
                tracing::debug!(job_id, listener_id, "Listener closed before replay");
                return Some(listener_id);
            }
        }
        channel.listeners.insert(listener_id, sender);
        tracing::debug!(
            job_id,
            listener_id,
            listeners = channel.listeners.len(),
            "Progress listener subscribed",
        );
        Some(listener_id)
    }

    /// Store `snapshot` as its job's latest and deliver it to every
    /// listener of that job.
    ///
    /// Listeners whose channel is closed are dropped from the set without
    /// affecting delivery to the rest. Returns the number of listeners the
    /// snapshot reached.
    pub async fn publish(&self, snapshot: ProgressSnapshot) -> usize {
        let mut jobs = self.jobs.write().await;
        let channel = jobs.entry(snapshot.job_id().to_string()).or_default();

        let before = channel.listeners.len();
        channel
            .listeners
            .retain(|_, sender| sender.send(snapshot.clone()).is_ok());
        let delivered = channel.listeners.len();
        if delivered < before {
            tracing::debug!(
                job_id = snapshot.job_id(),
                dropped = before - delivered,
                "Removed closed progress listeners",
            );
        }

        channel.latest = Some(snapshot);
        delivered
    }

    /// Detach a listener. Returns `true` if it was attached.
    pub async fn unsubscribe(&self, job_id: &str, listener_id: ListenerId) -> bool {
        self.jobs
            .write()
            .await
            .get_mut(job_id)
            .is_some_and(|channel| channel.listeners.remove(&listener_id).is_some())
    }

    /// Latest snapshot published for `job_id`.
    pub async fn latest(&self, job_id: &str) -> Option<ProgressSnapshot> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .and_then(|channel| channel.latest.clone())
    }

    pub async fn is_registered(&self, job_id: &str) -> bool {
        self.jobs.read().await.contains_key(job_id)
    }

    pub async fn listener_count(&self, job_id: &str) -> usize {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map_or(0, |channel| channel.listeners.len())
    }

    /// Forget a job entirely. Its listeners see their channel close.
    pub async fn remove_job(&self, job_id: &str) {
        self.jobs.write().await.remove(job_id);
    }

    /// Detach every listener of every job, closing their channels.
    ///
    /// Used during graceful shutdown. Latest snapshots are kept.
    pub async fn close_all(&self) {
        let mut jobs = self.jobs.write().await;
        let count: usize = jobs
            .values_mut()
            .map(|channel| {
                let n = channel.listeners.len();
                channel.listeners.clear();
                n
            })
            .sum();
        tracing::info!(count, "Closed all progress listeners");
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
