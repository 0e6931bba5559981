//! Authoritative tracker state as reported by the status endpoint.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MIN_AREA;
use crate::errors::UnknownNameError;

/// Which detection backend the tracker is running.
///
/// Determines the shape of the per-frame stats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionMode {
    /// HSV colour thresholding over four fixed colours.
    #[default]
    #[serde(rename = "color")]
    Color,
    /// MobileNet-SSD object detection.
    #[serde(rename = "object")]
    ObjectSsd,
    /// YOLOv8 object detection.
    #[serde(rename = "object_yolo")]
    ObjectYolo,
}

impl DetectionMode {
    /// All modes, in the order the tracker lists them.
    pub const ALL: [Self; 3] = [Self::Color, Self::ObjectSsd, Self::ObjectYolo];

    /// Wire name used in URLs and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::ObjectSsd => "object",
            Self::ObjectYolo => "object_yolo",
        }
    }

    /// Whether stats in this mode are object-label counters.
    pub fn is_object(self) -> bool {
        matches!(self, Self::ObjectSsd | Self::ObjectYolo)
    }

    /// One-line description for operators.
    pub fn description(self) -> &'static str {
        match self {
            Self::Color => "Detects primary colors: Red, Blue, Yellow, Green",
            Self::ObjectSsd => "MobileNet SSD object detection (fast)",
            Self::ObjectYolo => "YOLOv8 object detection (more accurate)",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = UnknownNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownNameError::new("detection mode", s))
    }
}

/// One of the four colours tracked in colour mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackedColor {
    /// Red.
    Red,
    /// Blue.
    Blue,
    /// Yellow.
    Yellow,
    /// Green.
    Green,
}

impl TrackedColor {
    /// All colours in display order.
    pub const ALL: [Self; 4] = [Self::Red, Self::Blue, Self::Yellow, Self::Green];

    /// Name as used in stats keys and toggle URLs (case-sensitive).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Blue => "Blue",
            Self::Yellow => "Yellow",
            Self::Green => "Green",
        }
    }
}

impl fmt::Display for TrackedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackedColor {
    type Err = UnknownNameError;

    /// Parses a colour name, ignoring case (the tracker capitalizes on its side).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownNameError::new("color", s))
    }
}

/// Snapshot returned by `GET /status`.
///
/// Replaced wholesale on every accepted poll; never merged with push data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStatus {
    /// Whether the tracker is capturing.
    pub is_running: bool,
    /// Active detection backend. Older trackers omit it; colour is assumed.
    #[serde(default)]
    pub detection_mode: DetectionMode,
    /// Colours enabled for colour detection.
    #[serde(default)]
    pub enabled_colors: BTreeSet<String>,
    /// Capture device index.
    pub camera_index: u32,
    /// Minimum contour area for a detection to count.
    pub min_area: u32,
}

impl Default for TrackerStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            detection_mode: DetectionMode::Color,
            enabled_colors: TrackedColor::ALL
                .iter()
                .map(|c| c.as_str().to_owned())
                .collect(),
            camera_index: 0,
            min_area: DEFAULT_MIN_AREA,
        }
    }
}
