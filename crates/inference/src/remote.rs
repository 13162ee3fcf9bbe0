//! HTTP client for a segmentation device served over the network.
//!
//! The device exposes a small session API:
//!
//! | Method | Path                        | Body / response                        |
//! |--------|-----------------------------|----------------------------------------|
//! | GET    | `/health`                   | 2xx when the model is loaded           |
//! | POST   | `/sessions`                 | `{frames_dir, num_frames}` -> `{session_id}` |
//! | POST   | `/sessions/{id}/points`     | `{frame_index, object_id, points, labels, clear_old}` |
//! | POST   | `/sessions/{id}/propagate`  | `{max_frames}` -> NDJSON of frames     |
//! | DELETE | `/sessions/{id}`            |                                        |
//!
//! Each propagated frame is one JSON line:
//! `{"frame_index": 3, "masks": [{"object_id": 1, "width": 8, "height": 8, "counts": [..]}]}`
//! where `counts` is an uncompressed run-length encoding (see
//! [`BinaryMask::from_runs`]).

use std::path::Path;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::device::{DeviceFrame, DeviceFrames, DeviceInfo, ObjectMask, SegmentationDevice};
use crate::error::DeviceError;
use crate::mask::BinaryMask;

#[derive(Serialize)]
struct CreateSession<'a> {
    frames_dir: &'a str,
    num_frames: u32,
}

#[derive(Deserialize)]
struct SessionCreated {
    session_id: String,
}

#[derive(Serialize)]
struct AddPoints<'a> {
    frame_index: u32,
    object_id: u32,
    points: &'a [[f32; 2]],
    labels: &'a [i32],
    clear_old: bool,
}

#[derive(Serialize)]
struct Propagate {
    max_frames: u32,
}

/// One NDJSON line of a propagate response.
#[derive(Debug, Deserialize)]
pub struct WireFrame {
    pub frame_index: u32,
    #[serde(default)]
    pub masks: Vec<WireMask>,
}

#[derive(Debug, Deserialize)]
pub struct WireMask {
    pub object_id: u32,
    pub width: u32,
    pub height: u32,
    pub counts: Vec<u32>,
}

impl WireFrame {
    fn decode(self) -> Result<DeviceFrame, DeviceError> {
        let masks = self
            .masks
            .into_iter()
            .map(|m| {
                Ok(ObjectMask {
                    object_id: m.object_id,
                    mask: BinaryMask::from_runs(m.width, m.height, &m.counts)?,
                })
            })
            .collect::<Result<Vec<_>, DeviceError>>()?;
        Ok(DeviceFrame {
            frame_index: self.frame_index,
            masks,
        })
    }
}

/// A [`SegmentationDevice`] reached over HTTP.
///
/// Calls block on the async client through a runtime [`Handle`], so they
/// must be made from blocking threads (`spawn_blocking`), never from async
/// tasks. `reset_state` is the exception: it only schedules the cleanup
/// request and is safe anywhere.
pub struct RemoteDevice {
    device_id: String,
    base_url: String,
    client: reqwest::Client,
    handle: Handle,
    session_id: Option<String>,
}

impl RemoteDevice {
    /// * `base_url` - e.g. `http://gpu-0:8188`.
    pub fn new(device_id: impl Into<String>, base_url: impl Into<String>, handle: Handle) -> Self {
        Self::with_client(reqwest::Client::new(), device_id, base_url, handle)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(
        client: reqwest::Client,
        device_id: impl Into<String>,
        base_url: impl Into<String>,
        handle: Handle,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            handle,
            session_id: None,
        }
    }

    fn session_url(&self, suffix: &str) -> Result<String, DeviceError> {
        let id = self.session_id.as_deref().ok_or(DeviceError::NotInitialized)?;
        Ok(format!("{}/sessions/{id}{suffix}", self.base_url))
    }

    fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, DeviceError> {
        self.handle.block_on(async {
            let response = request.send().await.map_err(request_error)?;
            ensure_success(response).await
        })
    }

    fn delete_session(&mut self) {
        let Some(id) = self.session_id.take() else {
            return;
        };
        let url = format!("{}/sessions/{id}", self.base_url);
        let client = self.client.clone();
        let device_id = self.device_id.clone();
        self.handle.spawn(async move {
            match client.delete(&url).send().await {
                Ok(r) if r.status().is_success() || r.status() == reqwest::StatusCode::NOT_FOUND => {}
                Ok(r) => {
                    tracing::warn!(device_id = %device_id, session_id = %id, status = %r.status(), "Session delete rejected");
                }
                Err(e) => {
                    tracing::warn!(device_id = %device_id, session_id = %id, error = %e, "Session delete failed");
                }
            }
        });
    }
}

impl SegmentationDevice for RemoteDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: self.device_id.clone(),
            endpoint: self.base_url.clone(),
        }
    }

    fn ensure_ready(&mut self) -> Result<(), DeviceError> {
        self.send(self.client.get(format!("{}/health", self.base_url)))
            .map(drop)
    }

    fn init_state(&mut self, frames_dir: &Path, num_frames: u32) -> Result<(), DeviceError> {
        self.delete_session();

        let frames_dir = frames_dir.to_string_lossy();
        let request = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .json(&CreateSession {
                frames_dir: &frames_dir,
                num_frames,
            });
        let response = self.send(request)?;
        let created: SessionCreated = self
            .handle
            .block_on(response.json())
            .map_err(|e| DeviceError::Protocol(format!("bad session response: {e}")))?;

        tracing::debug!(device_id = %self.device_id, session_id = %created.session_id, "Device session created");
        self.session_id = Some(created.session_id);
        Ok(())
    }

    fn add_points(
        &mut self,
        frame_index: u32,
        object_id: u32,
        points: &[[f32; 2]],
        labels: &[i32],
        clear_old: bool,
    ) -> Result<(), DeviceError> {
        if points.len() != labels.len() {
            return Err(DeviceError::Protocol(format!(
                "{} points but {} labels",
                points.len(),
                labels.len()
            )));
        }
        let request = self.client.post(self.session_url("/points")?).json(&AddPoints {
            frame_index,
            object_id,
            points,
            labels,
            clear_old,
        });
        self.send(request).map(drop)
    }

    fn propagate(&mut self, max_frames: u32) -> Result<DeviceFrames<'_>, DeviceError> {
        let request = self
            .client
            .post(self.session_url("/propagate")?)
            .json(&Propagate { max_frames });
        let response = self.send(request)?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();

        Ok(Box::new(NdjsonFrames {
            handle: self.handle.clone(),
            stream,
            buffer: Vec::new(),
            finished: false,
        }))
    }

    fn reset_state(&mut self) {
        self.delete_session();
    }
}

/// Blocking iterator over an NDJSON response body.
struct NdjsonFrames {
    handle: Handle,
    stream: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl NdjsonFrames {
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        line.pop();
        Some(line)
    }

    fn parse(line: &[u8]) -> Result<DeviceFrame, DeviceError> {
        serde_json::from_slice::<WireFrame>(line)
            .map_err(|e| DeviceError::Protocol(format!("bad frame line: {e}")))?
            .decode()
    }
}

impl Iterator for NdjsonFrames {
    type Item = Result<DeviceFrame, DeviceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.take_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Some(Self::parse(&line));
            }
            if self.finished {
                if self.buffer.iter().all(u8::is_ascii_whitespace) {
                    return None;
                }
                let rest = std::mem::take(&mut self.buffer);
                return Some(Self::parse(&rest));
            }
            match self.handle.block_on(self.stream.next()) {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Some(Err(request_error(e)));
                }
                None => self.finished = true,
            }
        }
    }
}

fn request_error(err: reqwest::Error) -> DeviceError {
    if err.is_connect() || err.is_timeout() {
        DeviceError::Unavailable(err.to_string())
    } else {
        DeviceError::Failed(err.to_string())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DeviceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    let message = format!("{status}: {body}");
    Err(if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        DeviceError::Unavailable(message)
    } else if status.is_client_error() {
        DeviceError::Protocol(message)
    } else {
        DeviceError::Failed(message)
    })
}
