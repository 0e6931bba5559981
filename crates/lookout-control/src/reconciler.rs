//! Merge polled tracker status with pushed per-frame counters.
//!
//! Two inputs feed this component:
//!
//! - **Polls** of `GET /status` replace [`TrackerStatus`] wholesale. Each
//!   poll takes a [`Ticket`] when it is issued; a response whose ticket is
//!   not newer than the last applied one is dropped as superseded.
//! - **Frames** from the stream hub are normalized under the detection mode
//!   current at receipt. They never touch the status slot.
//!
//! A frame that arrives after a mode change was requested but before it is
//! confirmed is normalized under the old mode. That window is accepted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lookout_core::{DetectionMode, Envelope, FramePayload, NormalizedStats, TrackerStatus};
use lookout_stream::{BroadcastHub, SubscriberId};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

/// Issue order of a state-bearing control response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Ticket(u64);

impl Ticket {
    /// Raw sequence number.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Read-only snapshot of everything the dashboard shows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DashboardView {
    /// Last accepted status.
    pub status: TrackerStatus,
    /// Running flag, preferring an unconfirmed local command.
    pub is_running: bool,
    /// Stats from the latest frame.
    pub stats: NormalizedStats,
    /// Latest non-empty narration.
    pub narration: Option<String>,
    /// Frames applied since creation or the last reset.
    pub frames: u64,
    /// Whether any poll has been accepted.
    pub status_known: bool,
}

#[derive(Clone, Copy, Debug)]
struct Optimistic {
    running: bool,
    set_at: Ticket,
}

#[derive(Debug)]
struct State {
    status: TrackerStatus,
    status_known: bool,
    last_applied: Ticket,
    optimistic: Option<Optimistic>,
    stats: NormalizedStats,
    narration: Option<String>,
    frames: u64,
}

impl State {
    fn initial(last_applied: Ticket) -> Self {
        let status = TrackerStatus::default();
        Self {
            stats: NormalizedStats::empty(status.detection_mode),
            status,
            status_known: false,
            last_applied,
            optimistic: None,
            narration: None,
            frames: 0,
        }
    }
}

/// Single source of truth for status, stats and narration.
#[derive(Debug)]
pub struct StatsReconciler {
    next_ticket: AtomicU64,
    state: RwLock<State>,
}

impl StatsReconciler {
    /// Empty reconciler: default status, zeroed colour stats.
    pub fn new() -> Self {
        Self {
            next_ticket: AtomicU64::new(1),
            state: RwLock::new(State::initial(Ticket(0))),
        }
    }

    /// Take the next ticket. Call when a status request is issued.
    pub fn issue_ticket(&self) -> Ticket {
        Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed))
    }

    /// Apply a polled status taken under `ticket`.
    ///
    /// Returns `false` when a newer response was already applied.
    pub fn apply_status(&self, ticket: Ticket, status: TrackerStatus) -> bool {
        let mut state = self.state.write();
        if ticket <= state.last_applied {
            debug!(
                ticket = ticket.get(),
                last = state.last_applied.get(),
                "superseded status dropped"
            );
            return false;
        }

        if status.detection_mode != state.status.detection_mode {
            info!(
                from = %state.status.detection_mode,
                to = %status.detection_mode,
                "detection mode changed"
            );
        }
        if status.is_running != state.status.is_running {
            info!(running = status.is_running, "tracker run state changed");
        }

        state.last_applied = ticket;
        if state.optimistic.is_some_and(|o| o.set_at < ticket) {
            state.optimistic = None;
        }
        state.status = status;
        state.status_known = true;
        true
    }

    /// Apply a confirmed mode change.
    ///
    /// The acknowledgment takes its own ticket on arrival, so every poll
    /// issued before it is dropped if it lands later.
    pub fn apply_mode_ack(&self, mode: DetectionMode) {
        let ticket = self.issue_ticket();
        let mut state = self.state.write();
        if state.status.detection_mode != mode {
            info!(from = %state.status.detection_mode, to = %mode, "detection mode confirmed");
        }
        state.last_applied = state.last_applied.max(ticket);
        state.status.detection_mode = mode;
    }

    /// Record an unconfirmed run state from a local start/stop.
    ///
    /// Cleared by the first accepted poll issued afterwards.
    pub fn set_optimistic_running(&self, running: bool) {
        let set_at = self.issue_ticket();
        self.state.write().optimistic = Some(Optimistic { running, set_at });
    }

    /// Normalize a frame under the current mode and update narration.
    pub fn apply_frame(&self, frame: &FramePayload) {
        let mut state = self.state.write();
        let stats = NormalizedStats::normalize(state.status.detection_mode, &frame.stats);
        state.stats = stats;
        state.frames += 1;
        if let Some(narration) = &frame.narration {
            state.narration = Some(narration.clone());
        }
    }

    /// Hub entry point: frames are applied, everything else is ignored.
    pub fn handle_envelope(&self, envelope: &Envelope) {
        if let Some(frame) = envelope.as_frame() {
            self.apply_frame(frame);
        }
    }

    /// Subscribe to `hub`.
    pub fn attach(self: &Arc<Self>, hub: &BroadcastHub) -> SubscriberId {
        let this = Arc::clone(self);
        hub.subscribe(move |envelope| this.handle_envelope(envelope))
    }

    /// Return to initial values. Polls issued before the reset are dropped.
    pub fn reset(&self) {
        let newest = Ticket(self.next_ticket.load(Ordering::Relaxed).saturating_sub(1));
        *self.state.write() = State::initial(newest);
        debug!("reconciler reset");
    }

    /// Last accepted status.
    pub fn status(&self) -> TrackerStatus {
        self.state.read().status.clone()
    }

    /// Active detection mode.
    pub fn mode(&self) -> DetectionMode {
        self.state.read().status.detection_mode
    }

    /// Effective running flag.
    pub fn is_running(&self) -> bool {
        let state = self.state.read();
        state
            .optimistic
            .map_or(state.status.is_running, |o| o.running)
    }

    /// Stats from the latest frame.
    pub fn stats(&self) -> NormalizedStats {
        self.state.read().stats.clone()
    }

    /// Latest non-empty narration.
    pub fn narration(&self) -> Option<String> {
        self.state.read().narration.clone()
    }

    /// Consistent snapshot of all slots.
    pub fn view(&self) -> DashboardView {
        let state = self.state.read();
        DashboardView {
            status: state.status.clone(),
            is_running: state
                .optimistic
                .map_or(state.status.is_running, |o| o.running),
            stats: state.stats.clone(),
            narration: state.narration.clone(),
            frames: state.frames,
            status_known: state.status_known,
        }
    }
}

impl Default for StatsReconciler {
    fn default() -> Self {
        Self::new()
    }
}
