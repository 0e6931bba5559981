//! Protocol constants shared across crates.

use std::time::Duration;

/// Default base URL of the tracker's control API.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// Default WebSocket endpoint for the frame stream.
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:8000/ws/video";

/// Delay between the disconnect and the single retry performed by `reconnect()`.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Default control request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stats key carrying frames-per-second rather than a detection count.
pub const FPS_KEY: &str = "fps";

/// Default minimum contour area reported by a fresh tracker.
pub const DEFAULT_MIN_AREA: u32 = 500;
