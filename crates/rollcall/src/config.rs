use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Client configuration: `ROLLCALL_*` environment variables layered over an
/// optional TOML file named by `ROLLCALL_CONFIG`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the attendance server.
    pub server_url: String,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Resolution requested when acquiring the camera.
    pub capture_width: u32,
    pub capture_height: u32,
    /// Period of the capture/recognize tick.
    pub tick_interval: Duration,
    /// JPEG quality for submitted frames (1–100).
    pub jpeg_quality: u8,
    /// Period of the training status poll.
    pub poll_interval: Duration,
    /// Poll budget for one training run; `None` polls until a terminal status.
    pub max_polls: Option<u32>,
    /// Period of the attendance chart refresh.
    pub chart_refresh: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

/// Keys accepted in the TOML file. Environment variables win over these.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server_url: Option<String>,
    pub camera_device: Option<String>,
    pub capture_width: Option<u32>,
    pub capture_height: Option<u32>,
    pub tick_ms: Option<u64>,
    pub jpeg_quality: Option<u8>,
    pub poll_ms: Option<u64>,
    pub max_polls: Option<u32>,
    pub chart_refresh_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Config {
    /// Load from the process environment (and `ROLLCALL_CONFIG`, if set).
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => FileConfig::load(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    /// Merge `file` with variables from `env`, falling back to defaults.
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let max_polls = env_parse(&env, "ROLLCALL_MAX_POLLS")
            .or(file.max_polls)
            .unwrap_or(400);

        Self {
            server_url: env("ROLLCALL_SERVER_URL")
                .or(file.server_url)
                .unwrap_or_else(|| "http://127.0.0.1:5000".to_string()),
            camera_device: env("ROLLCALL_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            capture_width: env_parse(&env, "ROLLCALL_CAPTURE_WIDTH")
                .or(file.capture_width)
                .unwrap_or(640),
            capture_height: env_parse(&env, "ROLLCALL_CAPTURE_HEIGHT")
                .or(file.capture_height)
                .unwrap_or(480),
            tick_interval: Duration::from_millis(
                env_parse(&env, "ROLLCALL_TICK_MS")
                    .or(file.tick_ms)
                    .unwrap_or(1200)
                    .max(1),
            ),
            jpeg_quality: env_parse(&env, "ROLLCALL_JPEG_QUALITY")
                .or(file.jpeg_quality)
                .unwrap_or(85)
                .clamp(1, 100),
            poll_interval: Duration::from_millis(
                env_parse(&env, "ROLLCALL_POLL_MS")
                    .or(file.poll_ms)
                    .unwrap_or(1500)
                    .max(1),
            ),
            max_polls: (max_polls > 0).then_some(max_polls),
            chart_refresh: Duration::from_secs(
                env_parse(&env, "ROLLCALL_CHART_REFRESH_SECS")
                    .or(file.chart_refresh_secs)
                    .unwrap_or(10)
                    .max(1),
            ),
            request_timeout: Duration::from_secs(
                env_parse(&env, "ROLLCALL_REQUEST_TIMEOUT_SECS")
                    .or(file.request_timeout_secs)
                    .unwrap_or(10)
                    .max(1),
            ),
        }
    }
}

fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
