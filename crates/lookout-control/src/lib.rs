//! # lookout-control
//!
//! The pull half of the tracker client and everything that merges it with
//! the stream:
//!
//! - [`TrackerApi`] / [`HttpTrackerApi`]: typed control endpoints
//! - [`StatsReconciler`]: polled status plus pushed counters, ordered by ticket
//! - [`CommandDispatcher`]: start/stop/mode/colour/settings commands
//! - [`spawn_status_poller`]: fixed-interval status polling
//! - [`StreamDisplay`]: video panel state

#![deny(unsafe_code)]

pub mod api;
pub mod dispatcher;
pub mod display;
pub mod poller;
pub mod reconciler;

pub use api::{
    ColorToggleAck, DetectionModes, HttpTrackerApi, MessageAck, ModeAck, SettingsAck, TrackerApi,
};
pub use dispatcher::CommandDispatcher;
pub use display::{DisplaySnapshot, StreamDisplay};
pub use poller::{poll_once, spawn_status_poller};
pub use reconciler::{DashboardView, StatsReconciler, Ticket};
