//! Typed client for the tracker's HTTP control API.
//!
//! All endpoints live under the configured base URL (`.../api`):
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | GET | `/status` | [`TrackerStatus`] |
//! | POST | `/start`, `/stop` | [`MessageAck`] |
//! | POST | `/colors/toggle/{color}` | [`ColorToggleAck`] |
//! | GET | `/stats` | raw JSON, mode-dependent |
//! | POST | `/settings?min_area=&camera_index=` | [`SettingsAck`] |
//! | POST | `/mode/{mode}` | [`ModeAck`] |
//! | GET | `/modes` | [`DetectionModes`] |

use std::time::Duration;

use async_trait::async_trait;
use lookout_core::{ControlError, DetectionMode, TrackedColor, TrackerStatus};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Plain `{ "message": ... }` acknowledgment from `/start` and `/stop`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAck {
    /// Tracker's message, e.g. "Tracker started".
    pub message: String,
    /// Camera opened by `/start`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_index: Option<u32>,
}

/// Result of toggling one colour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorToggleAck {
    /// Colour as normalized by the tracker.
    pub color: String,
    /// `enabled` or `disabled`.
    pub action: String,
    /// Colours enabled after the toggle.
    #[serde(default)]
    pub enabled_colors: Vec<String>,
}

impl ColorToggleAck {
    /// Whether the colour is now enabled.
    pub fn enabled(&self) -> bool {
        self.action == "enabled"
    }
}

/// Settings as applied by the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsAck {
    /// Minimum contour area.
    pub min_area: u32,
    /// Capture device index.
    pub camera_index: u32,
}

/// Acknowledgment of a detection mode change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeAck {
    /// Mode now active on the tracker.
    pub mode: DetectionMode,
    /// Tracker's message.
    #[serde(default)]
    pub message: String,
}

/// Modes the tracker supports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionModes {
    /// Wire names of every available mode.
    pub modes: Vec<String>,
    /// Wire name of the active mode.
    pub current_mode: String,
}

impl DetectionModes {
    /// Active mode, if the tracker reported a known one.
    pub fn current(&self) -> Option<DetectionMode> {
        self.current_mode.parse().ok()
    }
}

/// Control-plane operations against the tracker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// `GET /status`.
    async fn status(&self) -> Result<TrackerStatus, ControlError>;
    /// `POST /start`.
    async fn start(&self) -> Result<MessageAck, ControlError>;
    /// `POST /stop`.
    async fn stop(&self) -> Result<MessageAck, ControlError>;
    /// `POST /colors/toggle/{color}`.
    async fn toggle_color(&self, color: TrackedColor) -> Result<ColorToggleAck, ControlError>;
    /// `GET /stats`.
    async fn stats(&self) -> Result<serde_json::Value, ControlError>;
    /// `POST /settings`.
    async fn update_settings(
        &self,
        min_area: u32,
        camera_index: u32,
    ) -> Result<SettingsAck, ControlError>;
    /// `POST /mode/{mode}`.
    async fn set_mode(&self, mode: DetectionMode) -> Result<ModeAck, ControlError>;
    /// `GET /modes`.
    async fn modes(&self) -> Result<DetectionModes, ControlError>;
}

/// [`TrackerApi`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpTrackerApi {
    client: Client,
    base_url: String,
}

impl HttpTrackerApi {
    /// Create a client for `base_url` (e.g. `http://localhost:8000/api`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ControlError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed =
            Url::parse(trimmed).map_err(|e| ControlError::InvalidBaseUrl(format!("{trimmed}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ControlError::InvalidBaseUrl(format!(
                "{trimmed}: unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControlError::Request {
                endpoint: "client".into(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: trimmed.to_owned(),
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    fn post(&self, endpoint: &str) -> RequestBuilder {
        self.client
            .post(self.url(endpoint))
            .json(&serde_json::json!({}))
    }

    #[instrument(skip(self, request), fields(base = %self.base_url))]
    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, ControlError> {
        let response = request.send().await.map_err(|e| ControlError::Request {
            endpoint: endpoint.to_owned(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "control request rejected");
            return Err(ControlError::Status {
                endpoint: endpoint.to_owned(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| ControlError::Request {
            endpoint: endpoint.to_owned(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ControlError::Decode {
            endpoint: endpoint.to_owned(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl TrackerApi for HttpTrackerApi {
    async fn status(&self) -> Result<TrackerStatus, ControlError> {
        self.send("/status", self.client.get(self.url("/status")))
            .await
    }

    async fn start(&self) -> Result<MessageAck, ControlError> {
        self.send("/start", self.post("/start")).await
    }

    async fn stop(&self) -> Result<MessageAck, ControlError> {
        self.send("/stop", self.post("/stop")).await
    }

    async fn toggle_color(&self, color: TrackedColor) -> Result<ColorToggleAck, ControlError> {
        let endpoint = format!("/colors/toggle/{color}");
        self.send(&endpoint, self.post(&endpoint)).await
    }

    async fn stats(&self) -> Result<serde_json::Value, ControlError> {
        self.send("/stats", self.client.get(self.url("/stats")))
            .await
    }

    async fn update_settings(
        &self,
        min_area: u32,
        camera_index: u32,
    ) -> Result<SettingsAck, ControlError> {
        let request = self
            .client
            .post(self.url("/settings"))
            .query(&[("min_area", min_area), ("camera_index", camera_index)]);
        self.send("/settings", request).await
    }

    async fn set_mode(&self, mode: DetectionMode) -> Result<ModeAck, ControlError> {
        let endpoint = format!("/mode/{mode}");
        self.send(&endpoint, self.post(&endpoint)).await
    }

    async fn modes(&self) -> Result<DetectionModes, ControlError> {
        self.send("/modes", self.client.get(self.url("/modes")))
            .await
    }
}
