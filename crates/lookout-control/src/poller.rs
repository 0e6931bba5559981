//! Fixed-interval status polling.
//!
//! The first poll fires immediately. Every poll runs in its own task, so a
//! slow request never delays the next tick, and in-flight polls are never
//! cancelled. Ordering is restored by the reconciler's tickets.

use std::sync::Arc;
use std::time::Duration;

use lookout_core::ControlError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::TrackerApi;
use crate::reconciler::StatsReconciler;

/// Issue one ticketed status poll and apply the response.
///
/// Returns whether the response was applied (`false` if superseded).
pub async fn poll_once(
    api: &dyn TrackerApi,
    reconciler: &StatsReconciler,
) -> Result<bool, ControlError> {
    let ticket = reconciler.issue_ticket();
    let status = api.status().await?;
    Ok(reconciler.apply_status(ticket, status))
}

/// Spawn the polling loop. It runs until `cancel` fires.
pub fn spawn_status_poller(
    api: Arc<dyn TrackerApi>,
    reconciler: Arc<StatsReconciler>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = interval.as_millis(), "status poller started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let api = Arc::clone(&api);
                    let reconciler = Arc::clone(&reconciler);
                    let _ = tokio::spawn(async move {
                        match poll_once(api.as_ref(), &reconciler).await {
                            Ok(true) => {}
                            Ok(false) => debug!("status poll superseded"),
                            Err(error) => warn!(%error, "status poll failed"),
                        }
                    });
                }
            }
        }

        info!("status poller stopped");
    })
}
