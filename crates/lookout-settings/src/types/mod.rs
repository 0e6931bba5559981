//! Settings types.
//!
//! Every struct uses `#[serde(default)]`, so a partial JSON file only has to
//! name the keys it overrides.

use std::time::Duration;

use lookout_core::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_STREAM_URL,
};
use serde::{Deserialize, Serialize};

/// Root settings for the Lookout client.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookoutSettings {
    /// Tracker control API.
    pub api: ApiSettings,
    /// Frame stream.
    pub stream: StreamSettings,
    /// Status polling.
    pub poll: PollSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Control API settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Base URL including the `/api` prefix.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl ApiSettings {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ApiSettings {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Frame stream settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// WebSocket URL of the frame stream.
    pub url: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
        }
    }
}

/// Status polling settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollSettings {
    /// Interval between status polls in milliseconds.
    pub interval_ms: u64,
}

impl PollSettings {
    /// Poll interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollSettings {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable compact lines.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
