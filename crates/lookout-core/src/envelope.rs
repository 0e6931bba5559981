//! Inbound stream envelopes.
//!
//! Every text message on the frame stream is a JSON object discriminated by
//! `type`:
//!
//! ```json
//! {"type": "frame", "data": "<base64 jpeg>", "stats": {"Red": 2, "fps": 29.7}, "narration": "..."}
//! {"type": "status", "message": "Tracker not running"}
//! {"type": "error", "message": "Could not read frame"}
//! ```
//!
//! [`Envelope`] mirrors that shape as a sum type, so a `status` message can
//! never carry image data and a `frame` can never lack one.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Raw label → value counters as pushed by the tracker.
///
/// Values are numeric but not necessarily integral (`fps` is fractional).
/// On the wire a `null` or non-numeric value reads as 0.
pub type StatMap = BTreeMap<String, f64>;

/// One classified unit of inbound stream data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// A processed video frame with its detection counters.
    Frame(FramePayload),
    /// Informational status from the tracker (e.g. not running).
    Status {
        /// Human-readable status text.
        message: String,
    },
    /// An error reported by the tracker.
    Error {
        /// Human-readable error text.
        message: String,
    },
}

impl Envelope {
    /// Wire discriminant for this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Frame(_) => "frame",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
        }
    }

    /// The frame payload, if this is a frame.
    pub fn as_frame(&self) -> Option<&FramePayload> {
        match self {
            Self::Frame(frame) => Some(frame),
            _ => None,
        }
    }
}

/// Payload of a `frame` envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    /// Encoded image (base64 JPEG as sent by the tracker).
    #[serde(rename = "data")]
    pub image: String,
    /// Per-label counters for this frame.
    #[serde(default, deserialize_with = "lenient_stats")]
    pub stats: StatMap,
    /// Tracker-side timestamp in seconds, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    /// Narration text. Blank narration is treated as absent.
    #[serde(
        default,
        deserialize_with = "non_blank",
        skip_serializing_if = "Option::is_none"
    )]
    pub narration: Option<String>,
}

fn non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn lenient_stats<'de, D>(deserializer: D) -> Result<StatMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(label, value)| (label, value.as_f64().unwrap_or(0.0)))
        .collect())
}
