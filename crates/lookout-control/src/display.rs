//! Presentation state of the live video panel.

use std::sync::Arc;

use lookout_core::Envelope;
use lookout_stream::{BroadcastHub, SubscriberId};
use parking_lot::RwLock;
use serde::Serialize;

/// Text shown before the first envelope arrives.
pub const WAITING_TEXT: &str = "Waiting for video stream...";
/// Fallback for a blank `status` message.
pub const NOT_RUNNING_TEXT: &str = "Tracker not running";
/// Fallback for a blank `error` message.
pub const ERROR_TEXT: &str = "Error occurred";

/// What the panel currently shows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplaySnapshot {
    /// Whether a frame has arrived since the last status or error.
    pub connected: bool,
    /// Text shown when there is no image.
    pub status_text: String,
    /// Encoded length of the current image, if any.
    pub image_len: Option<usize>,
    /// Frames shown so far.
    pub frames: u64,
}

#[derive(Debug)]
struct Panel {
    frame: Option<Arc<Envelope>>,
    status_text: String,
    connected: bool,
    frames: u64,
}

/// Hub consumer mirroring the video panel.
#[derive(Debug)]
pub struct StreamDisplay {
    panel: RwLock<Panel>,
}

impl StreamDisplay {
    /// Panel showing [`WAITING_TEXT`].
    pub fn new() -> Self {
        Self {
            panel: RwLock::new(Panel {
                frame: None,
                status_text: WAITING_TEXT.to_owned(),
                connected: false,
                frames: 0,
            }),
        }
    }

    /// Update the panel from one envelope.
    pub fn handle_envelope(&self, envelope: &Arc<Envelope>) {
        let mut panel = self.panel.write();
        match &**envelope {
            Envelope::Frame(_) => {
                panel.frame = Some(Arc::clone(envelope));
                panel.connected = true;
                panel.frames += 1;
            }
            Envelope::Status { message } => {
                panel.status_text = text_or(message, NOT_RUNNING_TEXT);
                panel.frame = None;
            }
            Envelope::Error { message } => {
                panel.status_text = text_or(message, ERROR_TEXT);
                panel.frame = None;
            }
        }
    }

    /// Subscribe to `hub`.
    pub fn attach(self: &Arc<Self>, hub: &BroadcastHub) -> SubscriberId {
        let this = Arc::clone(self);
        hub.subscribe(move |envelope| this.handle_envelope(envelope))
    }

    /// Encoded image currently shown.
    pub fn image(&self) -> Option<String> {
        self.panel
            .read()
            .frame
            .as_ref()
            .and_then(|env| env.as_frame())
            .map(|frame| frame.image.clone())
    }

    /// Current panel state.
    pub fn snapshot(&self) -> DisplaySnapshot {
        let panel = self.panel.read();
        DisplaySnapshot {
            connected: panel.connected,
            status_text: panel.status_text.clone(),
            image_len: panel
                .frame
                .as_ref()
                .and_then(|env| env.as_frame())
                .map(|frame| frame.image.len()),
            frames: panel.frames,
        }
    }
}

impl Default for StreamDisplay {
    fn default() -> Self {
        Self::new()
    }
}

fn text_or(message: &str, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_owned()
    } else {
        message.to_owned()
    }
}
