//! Mode-shaped view of per-frame detection counters.
//!
//! [`NormalizedStats::normalize`] is a pure function of the detection mode
//! and the raw counters of one frame. The caller decides which mode applies;
//! a frame received while a mode change is still unconfirmed is normalized
//! under the old mode.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::FPS_KEY;
use crate::envelope::StatMap;
use crate::status::{DetectionMode, TrackedColor};

/// Fixed four-slot colour counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ColorCounts {
    /// Red detections.
    pub red: u64,
    /// Blue detections.
    pub blue: u64,
    /// Yellow detections.
    pub yellow: u64,
    /// Green detections.
    pub green: u64,
}

impl ColorCounts {
    /// Count for one colour.
    pub fn get(&self, color: TrackedColor) -> u64 {
        match color {
            TrackedColor::Red => self.red,
            TrackedColor::Blue => self.blue,
            TrackedColor::Yellow => self.yellow,
            TrackedColor::Green => self.green,
        }
    }

    /// `(colour, count)` pairs in display order.
    pub fn iter(&self) -> impl Iterator<Item = (TrackedColor, u64)> + '_ {
        TrackedColor::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /// Sum over all four colours, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.iter().map(|(_, n)| n).fold(0, u64::saturating_add)
    }
}

/// Counts shaped by detection mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionCounts {
    /// Colour mode.
    Color(ColorCounts),
    /// Either object mode.
    Objects {
        /// Sum of all label counts.
        total: u64,
        /// Label → count, without the `fps` entry.
        labels: BTreeMap<String, u64>,
    },
}

/// Normalized stats for one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedStats {
    /// Mode the frame was normalized under.
    pub mode: DetectionMode,
    /// Mode-shaped counts.
    pub counts: DetectionCounts,
    /// Frames per second reported alongside the counts, 0 when absent.
    pub fps: f64,
}

impl NormalizedStats {
    /// Zeroed stats for a mode, used before any frame arrives.
    pub fn empty(mode: DetectionMode) -> Self {
        Self::normalize(mode, &StatMap::new())
    }

    /// Shape raw counters according to `mode`.
    ///
    /// Colour mode looks up exactly `Red`, `Blue`, `Yellow`, `Green`
    /// (case-sensitive) and defaults missing keys to 0. Object modes sum every
    /// label except `fps`.
    pub fn normalize(mode: DetectionMode, stats: &StatMap) -> Self {
        let fps = stats
            .get(FPS_KEY)
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0);

        let counts = if mode.is_object() {
            let labels: BTreeMap<String, u64> = stats
                .iter()
                .filter(|(label, _)| label.as_str() != FPS_KEY)
                .map(|(label, value)| (label.clone(), to_count(*value)))
                .collect();
            DetectionCounts::Objects {
                total: labels.values().copied().fold(0, u64::saturating_add),
                labels,
            }
        } else {
            let lookup = |c: TrackedColor| stats.get(c.as_str()).copied().map_or(0, to_count);
            DetectionCounts::Color(ColorCounts {
                red: lookup(TrackedColor::Red),
                blue: lookup(TrackedColor::Blue),
                yellow: lookup(TrackedColor::Yellow),
                green: lookup(TrackedColor::Green),
            })
        };

        Self { mode, counts, fps }
    }

    /// Colour counts, if normalized under colour mode.
    pub fn colors(&self) -> Option<&ColorCounts> {
        match &self.counts {
            DetectionCounts::Color(c) => Some(c),
            DetectionCounts::Objects { .. } => None,
        }
    }

    /// Total detections regardless of mode.
    pub fn total(&self) -> u64 {
        match &self.counts {
            DetectionCounts::Color(c) => c.total(),
            DetectionCounts::Objects { total, .. } => *total,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.trunc() as u64
    } else {
        0
    }
}
