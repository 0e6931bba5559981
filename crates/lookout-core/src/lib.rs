//! # lookout-core
//!
//! Shared vocabulary for the Lookout tracker client.
//!
//! - **Envelopes**: [`Envelope`] sum type for inbound stream messages
//! - **Tracker state**: [`TrackerStatus`], [`DetectionMode`], [`TrackedColor`]
//! - **Normalized stats**: [`NormalizedStats`] derived per frame from raw counters
//! - **Errors**: one `thiserror` enum per concern (stream, envelope, control)
//! - **Logging**: `tracing` subscriber setup and test capture helpers

#![deny(unsafe_code)]

pub mod constants;
pub mod envelope;
pub mod errors;
pub mod logging;
pub mod stats;
pub mod status;

pub use envelope::{Envelope, FramePayload, StatMap};
pub use errors::{ControlError, EnvelopeError, StreamError, UnknownNameError};
pub use stats::{ColorCounts, DetectionCounts, NormalizedStats};
pub use status::{DetectionMode, TrackedColor, TrackerStatus};
