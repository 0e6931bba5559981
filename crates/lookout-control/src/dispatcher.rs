//! Control commands with their local side effects.
//!
//! Nothing local changes before the tracker acknowledges a command, and
//! nothing changes at all when it fails. There is no retry.

use std::sync::Arc;

use lookout_core::{ControlError, DetectionMode, TrackedColor};
use lookout_stream::ConnectionManager;
use tracing::{info, warn};

use crate::api::{ColorToggleAck, MessageAck, ModeAck, SettingsAck, TrackerApi};
use crate::reconciler::StatsReconciler;

/// Sends commands to the tracker and applies optimistic local effects.
pub struct CommandDispatcher {
    api: Arc<dyn TrackerApi>,
    connection: Arc<ConnectionManager>,
    reconciler: Arc<StatsReconciler>,
}

impl CommandDispatcher {
    /// Wire a dispatcher to its collaborators.
    pub fn new(
        api: Arc<dyn TrackerApi>,
        connection: Arc<ConnectionManager>,
        reconciler: Arc<StatsReconciler>,
    ) -> Self {
        Self {
            api,
            connection,
            reconciler,
        }
    }

    /// Start the tracker, then open the stream.
    pub async fn start(&self) -> Result<MessageAck, ControlError> {
        let ack = self.api.start().await.inspect_err(|error| {
            warn!(%error, "start failed");
        })?;
        info!(message = %ack.message, "tracker start acknowledged");
        self.connection.connect();
        self.reconciler.set_optimistic_running(true);
        Ok(ack)
    }

    /// Stop the tracker, close the stream without waiting, and clear the
    /// dashboard.
    pub async fn stop(&self) -> Result<MessageAck, ControlError> {
        let ack = self.api.stop().await.inspect_err(|error| {
            warn!(%error, "stop failed");
        })?;
        info!(message = %ack.message, "tracker stop acknowledged");
        self.connection.disconnect();
        self.reconciler.reset();
        self.reconciler.set_optimistic_running(false);
        Ok(ack)
    }

    /// Switch detection mode. The local mode changes only on acknowledgment.
    pub async fn set_mode(&self, mode: DetectionMode) -> Result<ModeAck, ControlError> {
        let ack = self.api.set_mode(mode).await.inspect_err(|error| {
            warn!(%error, %mode, "mode change failed");
        })?;
        self.reconciler.apply_mode_ack(ack.mode);
        Ok(ack)
    }

    /// Toggle one colour.
    pub async fn toggle_color(&self, color: TrackedColor) -> Result<ColorToggleAck, ControlError> {
        let ack = self.api.toggle_color(color).await?;
        info!(color = %ack.color, action = %ack.action, "color toggled");
        Ok(ack)
    }

    /// Update detection settings.
    pub async fn update_settings(
        &self,
        min_area: u32,
        camera_index: u32,
    ) -> Result<SettingsAck, ControlError> {
        let ack = self.api.update_settings(min_area, camera_index).await?;
        info!(min_area = ack.min_area, camera_index = ack.camera_index, "settings updated");
        Ok(ack)
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockTrackerApi;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use lookout_core::StreamError;
    use lookout_stream::{BroadcastHub, ConnectionState, Connector, Transport};

    /// Connector whose transports stay open until closed.
    struct IdleConnector;

    struct IdleTransport;

    #[async_trait]
    impl Transport for IdleTransport {
        async fn next_text(&mut self) -> Result<Option<String>, StreamError> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), StreamError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for IdleConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, StreamError> {
            Ok(Box::new(IdleTransport))
        }
    }

    fn dispatcher(api: MockTrackerApi) -> (CommandDispatcher, Arc<ConnectionManager>, Arc<StatsReconciler>) {
        let connection = Arc::new(ConnectionManager::new(
            "ws://tracker.test/ws/video",
            Arc::new(IdleConnector),
            Arc::new(BroadcastHub::new()),
        ));
        let reconciler = Arc::new(StatsReconciler::new());
        let dispatcher =
            CommandDispatcher::new(Arc::new(api), Arc::clone(&connection), Arc::clone(&reconciler));
        (dispatcher, connection, reconciler)
    }

    fn ack(message: &str) -> MessageAck {
        MessageAck {
            message: message.into(),
            camera_index: None,
        }
    }

    fn server_error(endpoint: &str) -> ControlError {
        ControlError::Status {
            endpoint: endpoint.into(),
            status: 500,
            body: "Could not open camera".into(),
        }
    }

    #[tokio::test]
    async fn start_connects_and_sets_running() {
        let mut api = MockTrackerApi::new();
        let _ = api.expect_start().times(1).returning(|| Ok(ack("Tracker started")));
        let (d, connection, reconciler) = dispatcher(api);

        let ack = d.start().await.unwrap();
        assert_eq!(ack.message, "Tracker started");
        assert_eq!(connection.state(), ConnectionState::Connecting);
        assert!(reconciler.is_running());
    }

    #[tokio::test]
    async fn failed_start_changes_nothing() {
        let mut api = MockTrackerApi::new();
        let _ = api.expect_start().times(1).returning(|| Err(server_error("/start")));
        let (d, connection, reconciler) = dispatcher(api);

        assert_matches!(d.start().await, Err(ControlError::Status { status: 500, .. }));
        assert_eq!(connection.state(), ConnectionState::Idle);
        assert!(!reconciler.is_running());
    }

    #[tokio::test]
    async fn stop_disconnects_and_clears_running() {
        let mut api = MockTrackerApi::new();
        let _ = api.expect_start().returning(|| Ok(ack("Tracker started")));
        let _ = api.expect_stop().times(1).returning(|| Ok(ack("Tracker stopped")));
        let (d, connection, reconciler) = dispatcher(api);

        let _ = d.start().await.unwrap();
        tokio::task::yield_now().await;
        let _ = d.stop().await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(!reconciler.is_running());
    }

    #[tokio::test]
    async fn stop_clears_dashboard_and_drops_in_flight_polls() {
        let mut api = MockTrackerApi::new();
        let _ = api.expect_stop().times(1).returning(|| Ok(ack("Tracker stopped")));
        let (d, _connection, reconciler) = dispatcher(api);

        let mut running = reconciler.status();
        running.is_running = true;
        running.detection_mode = DetectionMode::ObjectSsd;
        assert!(reconciler.apply_status(reconciler.issue_ticket(), running.clone()));
        reconciler.apply_frame(&lookout_core::FramePayload {
            image: "img".into(),
            stats: [("person".to_owned(), 2.0)].into_iter().collect(),
            timestamp: None,
            narration: Some("two people".into()),
        });
        let in_flight = reconciler.issue_ticket();

        let _ = d.stop().await.unwrap();
        let view = reconciler.view();
        assert!(!view.is_running);
        assert_eq!(view.status.detection_mode, DetectionMode::Color);
        assert_eq!(view.frames, 0);
        assert!(view.narration.is_none());
        assert_eq!(view.stats.total(), 0);

        assert!(!reconciler.apply_status(in_flight, running));
        assert!(!reconciler.is_running());
    }

    #[tokio::test]
    async fn set_mode_applies_only_the_acknowledged_mode() {
        let mut api = MockTrackerApi::new();
        let _ = api
            .expect_set_mode()
            .withf(|m| *m == DetectionMode::ObjectSsd)
            .times(1)
            .returning(|m| {
                Ok(ModeAck {
                    mode: m,
                    message: format!("Detection mode set to {m}"),
                })
            });
        let (d, _connection, reconciler) = dispatcher(api);

        let stale_poll = reconciler.issue_ticket();
        let ack = d.set_mode(DetectionMode::ObjectSsd).await.unwrap();
        assert_eq!(ack.mode, DetectionMode::ObjectSsd);
        assert_eq!(reconciler.mode(), DetectionMode::ObjectSsd);

        let mut old = reconciler.status();
        old.detection_mode = DetectionMode::Color;
        assert!(!reconciler.apply_status(stale_poll, old));
        assert_eq!(reconciler.mode(), DetectionMode::ObjectSsd);
    }

    #[tokio::test]
    async fn failed_mode_change_keeps_mode() {
        let mut api = MockTrackerApi::new();
        let _ = api
            .expect_set_mode()
            .returning(|_| Err(server_error("/mode/object_yolo")));
        let (d, _connection, reconciler) = dispatcher(api);

        assert!(d.set_mode(DetectionMode::ObjectYolo).await.is_err());
        assert_eq!(reconciler.mode(), DetectionMode::Color);
    }

    #[tokio::test]
    async fn toggle_and_settings_have_no_local_state() {
        let mut api = MockTrackerApi::new();
        let _ = api.expect_toggle_color().times(1).returning(|c| {
            Ok(ColorToggleAck {
                color: c.to_string(),
                action: "disabled".into(),
                enabled_colors: vec!["Red".into()],
            })
        });
        let _ = api
            .expect_update_settings()
            .times(1)
            .returning(|min_area, camera_index| Ok(SettingsAck { min_area, camera_index }));
        let (d, connection, reconciler) = dispatcher(api);
        let before = reconciler.view();

        let ack = d.toggle_color(TrackedColor::Blue).await.unwrap();
        assert_eq!(ack.color, "Blue");
        let ack = d.update_settings(750, 1).await.unwrap();
        assert_eq!(ack, SettingsAck { min_area: 750, camera_index: 1 });

        assert_eq!(reconciler.view(), before);
        assert_eq!(connection.state(), ConnectionState::Idle);
    }
}
