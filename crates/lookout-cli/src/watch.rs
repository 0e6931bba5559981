//! `lookout watch`: the headless dashboard.

use std::sync::Arc;

use anyhow::{Context, Result};
use lookout_control::{
    CommandDispatcher, DashboardView, StatsReconciler, StreamDisplay, TrackerApi,
    spawn_status_poller,
};
use lookout_core::{DetectionCounts, Envelope};
use lookout_settings::LookoutSettings;
use lookout_stream::{BroadcastHub, ConnectionManager};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run until Ctrl-C.
pub async fn run(settings: &LookoutSettings, api: Arc<dyn TrackerApi>, start: bool) -> Result<()> {
    let hub = Arc::new(BroadcastHub::new());
    let connection = Arc::new(ConnectionManager::websocket(
        settings.stream.url.clone(),
        Arc::clone(&hub),
    ));
    let reconciler = Arc::new(StatsReconciler::new());
    let display = Arc::new(StreamDisplay::new());
    let _ = reconciler.attach(&hub);
    let _ = display.attach(&hub);
    let _ = hub.subscribe(log_tracker_messages);

    let cancel = CancellationToken::new();
    let poller = spawn_status_poller(
        Arc::clone(&api),
        Arc::clone(&reconciler),
        settings.poll.interval(),
        cancel.clone(),
    );
    let reporter = tokio::spawn(report_changes(
        Arc::clone(&reconciler),
        Arc::clone(&connection),
        settings.poll.interval(),
        cancel.clone(),
    ));

    let dispatcher = CommandDispatcher::new(api, Arc::clone(&connection), Arc::clone(&reconciler));
    if start {
        let _ = dispatcher.start().await.context("Failed to start tracker")?;
    } else {
        connection.connect();
    }

    info!(api = %settings.api.base_url, stream = %settings.stream.url, "watching tracker; Ctrl-C to exit");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("shutting down");
    cancel.cancel();
    connection.disconnect();
    let _ = poller.await;
    let _ = reporter.await;

    let counters = connection.counters();
    let shown = display.snapshot();
    info!(
        received = counters.received,
        dropped = counters.dropped,
        frames = shown.frames,
        subscriber_failures = hub.failure_count(),
        "stream summary"
    );
    reconciler.reset();
    Ok(())
}

fn log_tracker_messages(envelope: &Arc<Envelope>) {
    match &**envelope {
        Envelope::Status { message } => info!(%message, "tracker status"),
        Envelope::Error { message } => warn!(%message, "tracker error"),
        Envelope::Frame(_) => {}
    }
}

/// Log connection transitions immediately and dashboard changes once per
/// interval.
async fn report_changes(
    reconciler: Arc<StatsReconciler>,
    connection: Arc<ConnectionManager>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut states = connection.subscribe_state();
    let mut ticker = tokio::time::interval(interval);
    let mut last_summary = String::new();
    let mut last_narration: Option<String> = None;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                info!(%state, "stream state");
            }
            _ = ticker.tick() => {
                let view = reconciler.view();
                let summary = summarize(&view);
                if summary != last_summary {
                    info!(%summary, "dashboard");
                    last_summary = summary;
                }
                if view.narration != last_narration {
                    if let Some(narration) = &view.narration {
                        info!(%narration, "narration");
                    }
                    last_narration = view.narration;
                }
            }
        }
    }
}

/// One-line dashboard summary.
fn summarize(view: &DashboardView) -> String {
    let run = if view.is_running { "running" } else { "stopped" };
    let counts = match &view.stats.counts {
        DetectionCounts::Color(colors) => colors
            .iter()
            .map(|(color, n)| format!("{color}={n}"))
            .collect::<Vec<_>>()
            .join(" "),
        DetectionCounts::Objects { total, labels } => {
            let mut parts = vec![format!("total={total}")];
            parts.extend(labels.iter().map(|(label, n)| format!("{label}={n}")));
            parts.join(" ")
        }
    };
    format!(
        "{run} mode={} fps={:.1} {counts}",
        view.status.detection_mode, view.stats.fps
    )
}
