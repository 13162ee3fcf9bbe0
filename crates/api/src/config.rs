use std::path::PathBuf;
use std::str::FromStr;

use segflow_core::segment::DEFAULT_MAX_PROPAGATION_LENGTH;
use segflow_inference::DEFAULT_INFERENCE_WIDTH;
use segflow_pipeline::PipelineConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. `DATABASE_URL`
/// is read separately by the binary and has no default.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Not applied to
    /// upgraded WebSocket connections.
    pub request_timeout_secs: u64,
    /// How long shutdown waits for running jobs (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Project data root; frames live in `<root>/<project_id>/inference`.
    pub projects_root_dir: PathBuf,
    pub max_propagation_length: u32,
    /// Width frames are downscaled to before inference.
    pub inference_width: u32,
    /// One remote segmentation device per URL; the first is primary.
    pub inference_device_urls: Vec<String>,
    /// Finished jobs stay queryable this long (default: one day).
    pub job_retention_secs: u64,
    /// Idle time before a progress stream is pinged.
    pub ws_keepalive_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                                       |
    /// |--------------------------|-----------------------------------------------|
    /// | `HOST`                   | `0.0.0.0`                                     |
    /// | `PORT`                   | `8000`                                        |
    /// | `CORS_ORIGINS`           | `http://localhost:3000,http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                                          |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `30`                                          |
    /// | `PROJECTS_ROOT_DIR`      | `./data/projects`                             |
    /// | `MAX_PROPAGATION_LENGTH` | `1000`                                        |
    /// | `INFERENCE_WIDTH`        | `1024`                                        |
    /// | `INFERENCE_DEVICE_URLS`  | `http://127.0.0.1:8188`                       |
    /// | `JOB_RETENTION_SECS`     | `86400`                                       |
    /// | `WS_KEEPALIVE_SECS`      | `30`                                          |
    ///
    /// Panics on unparsable numbers so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        Self {
            host,
            port: parse_env("PORT", 8000),
            cors_origins: list_env("CORS_ORIGINS", "http://localhost:3000,http://localhost:5173"),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: parse_env("SHUTDOWN_TIMEOUT_SECS", 30),
            projects_root_dir: std::env::var("PROJECTS_ROOT_DIR")
                .unwrap_or_else(|_| "./data/projects".into())
                .into(),
            max_propagation_length: parse_env("MAX_PROPAGATION_LENGTH", DEFAULT_MAX_PROPAGATION_LENGTH),
            inference_width: parse_env("INFERENCE_WIDTH", DEFAULT_INFERENCE_WIDTH),
            inference_device_urls: list_env("INFERENCE_DEVICE_URLS", "http://127.0.0.1:8188"),
            job_retention_secs: parse_env("JOB_RETENTION_SECS", 86_400),
            ws_keepalive_secs: parse_env("WS_KEEPALIVE_SECS", 30),
        }
    }

    /// Orchestrator settings derived from this configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            projects_root: self.projects_root_dir.clone(),
            max_propagation_length: self.max_propagation_length,
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid number, got '{raw}': {e}")),
        Err(_) => default,
    }
}

fn list_env(key: &str, default: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_else(|_| default.into())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
