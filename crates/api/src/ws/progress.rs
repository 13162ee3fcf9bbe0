//! Live progress stream for one propagation job.
//!
//! On connect the latest snapshot (if any) is sent immediately, then every
//! new snapshot as it is published. The server closes the stream after
//! delivering a terminal snapshot. Connections idle for the configured
//! keepalive interval get a `{"type":"ping"}` text frame plus a protocol
//! ping so half-open peers are noticed.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};

use segflow_core::progress::ProgressSnapshot;
use segflow_core::types::ProjectId;
use segflow_pipeline::PropagationOrchestrator;

use crate::state::AppState;

/// GET /projects/{project_id}/propagate/{job_id}/ws
pub async fn progress_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path((project_id, job_id)): Path<(ProjectId, String)>,
) -> impl IntoResponse {
    let keepalive = Duration::from_secs(state.config.ws_keepalive_secs.max(1));
    ws.on_upgrade(move |socket| {
        handle_socket(socket, state.orchestrator, project_id, job_id, keepalive)
    })
}

async fn handle_socket(
    mut socket: WebSocket,
    orchestrator: Arc<PropagationOrchestrator>,
    project_id: ProjectId,
    job_id: String,
    keepalive: Duration,
) {
    let error = match orchestrator.job(&job_id).await {
        None => Some(format!("Job not found: {job_id}")),
        Some(job) if job.project_id != project_id => {
            Some(format!("Job {job_id} not found for project {project_id}"))
        }
        Some(_) => None,
    };
    if let Some(error) = error {
        tracing::debug!(job_id = %job_id, project_id = %project_id, "Progress stream for unknown job");
        let _ = socket.send(text(json!({ "error": error }).to_string())).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let broadcaster = orchestrator.broadcaster();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let Some(listener_id) = broadcaster.subscribe(&job_id, tx).await else {
        let _ = socket
            .send(text(json!({ "error": format!("Job not found: {job_id}") }).to_string()))
            .await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    tracing::info!(job_id = %job_id, listener_id, "Progress stream connected");

    stream_progress(&mut socket, &mut rx, keepalive, &job_id).await;

    broadcaster.unsubscribe(&job_id, listener_id).await;
    tracing::info!(job_id = %job_id, listener_id, "Progress stream disconnected");
}

async fn stream_progress(
    socket: &mut WebSocket,
    rx: &mut mpsc::UnboundedReceiver<ProgressSnapshot>,
    keepalive: Duration,
    job_id: &str,
) {
    let mut idle = interval_at(Instant::now() + keepalive, keepalive);

    loop {
        tokio::select! {
            snapshot = rx.recv() => {
                let Some(snapshot) = snapshot else {
                    // Broadcaster dropped the listener (job evicted or shutdown).
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                let payload = match serde_json::to_string(&snapshot) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!(job_id, error = %e, "Failed to encode progress snapshot");
                        break;
                    }
                };
                if socket.send(text(payload)).await.is_err() {
                    break;
                }
                idle.reset();
                if snapshot.is_terminal() {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => idle.reset(),
                    Some(Err(e)) => {
                        tracing::debug!(job_id, error = %e, "Progress stream receive error");
                        break;
                    }
                }
            }
            _ = idle.tick() => {
                let ping = text(json!({ "type": "ping" }).to_string());
                if socket.send(ping).await.is_err()
                    || socket.send(Message::Ping(Bytes::new())).await.is_err()
                {
                    break;
                }
            }
        }
    }
}

fn text(payload: String) -> Message {
    Message::Text(payload.into())
}
