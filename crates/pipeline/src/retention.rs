//! Periodic eviction of finished jobs.
//!
//! Terminal jobs are kept queryable for `retention`, then dropped from the
//! registry together with their listener sets.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::orchestrator::PropagationOrchestrator;

/// How often the sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    orchestrator: Arc<PropagationOrchestrator>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "Job retention sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                let evicted = orchestrator.evict_expired(retention).await;
                if evicted > 0 {
                    tracing::info!(evicted, "Job retention: evicted finished jobs");
                } else {
                    tracing::debug!("Job retention: nothing to evict");
                }
            }
        }
    }
}
