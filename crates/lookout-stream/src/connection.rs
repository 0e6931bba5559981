//! Connection manager for the frame stream.
//!
//! Owns at most one open transport. State transitions:
//!
//! ```text
//! Idle ──connect──▶ Connecting ──open──▶ Connected
//!   ▲                   │                    │
//!   │              fail │        error/close │ disconnect
//!   │                   ▼                    ▼
//!   └──────────────── Disconnected ◀─────────┘
//! ```
//!
//! The manager never reconnects by itself. `reconnect()` is an explicit,
//! single retry after [`RECONNECT_DELAY`].
//!
//! Each `connect` starts a transport task tagged with an epoch. `disconnect`
//! bumps the epoch, so a task that outlives its connection can no longer
//! write state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lookout_core::constants::RECONNECT_DELAY;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hub::BroadcastHub;
use crate::parser::parse_envelope;
use crate::transport::{Connector, Transport, WsConnector};

/// Lifecycle of the stream connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// Transport is being opened.
    Connecting,
    /// Transport is open and delivering messages.
    Connected,
    /// Closed by request, by the peer, or by a transport error.
    Disconnected,
}

impl ConnectionState {
    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }

    /// Whether a transport is open or being opened.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamCounters {
    /// Text messages received while connected.
    pub received: u64,
    /// Messages dropped as malformed.
    pub dropped: u64,
}

struct Session {
    epoch: u64,
    cancel: Option<CancellationToken>,
}

/// Owner of the single stream connection of a client session.
pub struct ConnectionManager {
    url: String,
    connector: Arc<dyn Connector>,
    hub: Arc<BroadcastHub>,
    session: Mutex<Session>,
    state_tx: watch::Sender<ConnectionState>,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl ConnectionManager {
    /// Create a manager for `url`, publishing envelopes to `hub`.
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>, hub: Arc<BroadcastHub>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            url: url.into(),
            connector,
            hub,
            session: Mutex::new(Session {
                epoch: 0,
                cancel: None,
            }),
            state_tx,
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Manager using the WebSocket transport.
    pub fn websocket(url: impl Into<String>, hub: Arc<BroadcastHub>) -> Self {
        Self::new(url, Arc::new(WsConnector), hub)
    }

    /// Stream URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Hub envelopes are published to.
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Message counters since creation.
    pub fn counters(&self) -> StreamCounters {
        StreamCounters {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Open the transport. No-op while connecting or connected.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(self: &Arc<Self>) {
        let (epoch, cancel) = {
            let mut session = self.session.lock();
            let state = self.state();
            if state.is_active() {
                debug!(%state, "connect ignored");
                return;
            }
            session.epoch += 1;
            let cancel = CancellationToken::new();
            session.cancel = Some(cancel.clone());
            let _ = self.state_tx.send_replace(ConnectionState::Connecting);
            (session.epoch, cancel)
        };
        info!(url = %self.url, epoch, "connecting stream");

        let this = Arc::clone(self);
        let _ = tokio::spawn(async move { this.run(epoch, cancel).await });
    }

    /// Close the transport and move to `Disconnected`.
    ///
    /// No-op when idle or already disconnected. Returns without waiting for
    /// the close to finish.
    pub fn disconnect(&self) {
        let mut session = self.session.lock();
        let state = self.state();
        if !state.is_active() {
            debug!(%state, "disconnect ignored");
            return;
        }
        session.epoch += 1;
        if let Some(cancel) = session.cancel.take() {
            cancel.cancel();
        }
        let _ = self.state_tx.send_replace(ConnectionState::Disconnected);
        info!(url = %self.url, "stream disconnected");
    }

    /// Disconnect, then connect once after [`RECONNECT_DELAY`].
    pub fn reconnect(self: &Arc<Self>) {
        self.disconnect();
        let this = Arc::clone(self);
        let _ = tokio::spawn(async move {
            tokio::time::sleep(RECONNECT_DELAY).await;
            this.connect();
        });
    }

    /// Apply `next` only if `epoch` still identifies the live connection.
    fn transition(&self, epoch: u64, next: ConnectionState) -> bool {
        let session = self.session.lock();
        if session.epoch != epoch {
            debug!(epoch, current = session.epoch, state = %next, "stale transition ignored");
            return false;
        }
        let _ = self.state_tx.send_replace(next);
        true
    }

    async fn run(self: Arc<Self>, epoch: u64, cancel: CancellationToken) {
        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = self.connector.connect(&self.url) => result,
        };

        let mut transport = match opened {
            Ok(transport) => transport,
            Err(error) => {
                warn!(url = %self.url, %error, "stream connect failed");
                let _ = self.transition(epoch, ConnectionState::Disconnected);
                return;
            }
        };

        if !self.transition(epoch, ConnectionState::Connected) {
            close_transport(transport.as_mut()).await;
            return;
        }
        info!(url = %self.url, "stream connected");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    close_transport(transport.as_mut()).await;
                    return;
                }
                next = transport.next_text() => match next {
                    Ok(Some(text)) => self.handle_text(&text),
                    Ok(None) => {
                        info!(url = %self.url, "stream closed by peer");
                        break;
                    }
                    Err(error) => {
                        warn!(url = %self.url, %error, "stream transport error");
                        break;
                    }
                },
            }
        }

        let _ = self.transition(epoch, ConnectionState::Disconnected);
    }

    fn handle_text(&self, text: &str) {
        let _ = self.received.fetch_add(1, Ordering::Relaxed);
        match parse_envelope(text) {
            Some(envelope) => {
                let _ = self.hub.publish(Arc::new(envelope));
            }
            None => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn close_transport(transport: &mut dyn Transport) {
    if let Err(error) = transport.close().await {
        debug!(%error, "transport close failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use lookout_core::{Envelope, StreamError};
    use tokio::sync::mpsc;

    use super::*;

    type Feed = mpsc::UnboundedSender<Result<Option<String>, StreamError>>;

    struct ScriptedTransport {
        rx: mpsc::UnboundedReceiver<Result<Option<String>, StreamError>>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn next_text(&mut self) -> Result<Option<String>, StreamError> {
            match self.rx.recv().await {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), StreamError> {
            let _ = self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedConnector {
        connects: AtomicUsize,
        closes: Arc<AtomicUsize>,
        feeds: Mutex<Vec<Feed>>,
        refuse: std::sync::atomic::AtomicBool,
    }

    impl ScriptedConnector {
        fn feed(&self, idx: usize) -> Feed {
            self.feeds.lock()[idx].clone()
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, StreamError> {
            let _ = self.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse.load(Ordering::SeqCst) {
                return Err(StreamError::Connect {
                    url: url.to_owned(),
                    reason: "connection refused".into(),
                });
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.feeds.lock().push(tx);
            Ok(Box::new(ScriptedTransport {
                rx,
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    fn manager() -> (Arc<ConnectionManager>, Arc<ScriptedConnector>, Arc<BroadcastHub>) {
        let connector = Arc::new(ScriptedConnector::default());
        let hub = Arc::new(BroadcastHub::new());
        let mgr = Arc::new(ConnectionManager::new(
            "ws://tracker.test/ws/video",
            Arc::clone(&connector) as Arc<dyn Connector>,
            Arc::clone(&hub),
        ));
        (mgr, connector, hub)
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn collect(hub: &BroadcastHub) -> Arc<Mutex<Vec<Arc<Envelope>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _ = hub.subscribe(move |env| s.lock().push(Arc::clone(env)));
        seen
    }

    #[tokio::test]
    async fn connect_moves_through_connecting_to_connected() {
        let (mgr, connector, _hub) = manager();
        assert_eq!(mgr.state(), ConnectionState::Idle);

        mgr.connect();
        assert_eq!(mgr.state(), ConnectionState::Connecting);
        settle().await;
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn connect_is_noop_while_active() {
        let (mgr, connector, _hub) = manager();
        mgr.connect();
        mgr.connect();
        settle().await;
        mgr.connect();
        settle().await;
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn failed_connect_ends_disconnected() {
        let (mgr, connector, _hub) = manager();
        connector.refuse.store(true, Ordering::SeqCst);
        mgr.connect();
        settle().await;
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn double_disconnect_closes_once() {
        let (mgr, connector, _hub) = manager();
        mgr.connect();
        settle().await;

        mgr.disconnect();
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        mgr.disconnect();
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        settle().await;

        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_noop() {
        let (mgr, connector, _hub) = manager();
        mgr.disconnect();
        assert_eq!(mgr.state(), ConnectionState::Idle);
        assert_eq!(connector.closes(), 0);
    }

    #[tokio::test]
    async fn messages_are_parsed_and_published() {
        let (mgr, connector, hub) = manager();
        let seen = collect(&hub);
        mgr.connect();
        settle().await;

        let feed = connector.feed(0);
        feed.send(Ok(Some(r#"{"type":"frame","data":"a","stats":{"Red":1}}"#.into()))).unwrap();
        feed.send(Ok(Some(r#"{"type":"status","message":"idle"}"#.into()))).unwrap();
        settle().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].kind(), "frame");
        assert_eq!(seen[1].kind(), "status");
        assert_eq!(mgr.counters(), StreamCounters { received: 2, dropped: 0 });
    }

    #[tokio::test]
    async fn malformed_message_leaves_state_unchanged() {
        let (mgr, connector, hub) = manager();
        let seen = collect(&hub);
        mgr.connect();
        settle().await;

        let feed = connector.feed(0);
        feed.send(Ok(Some("garbage".into()))).unwrap();
        feed.send(Ok(Some(r#"{"type":"nope"}"#.into()))).unwrap();
        settle().await;

        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert!(seen.lock().is_empty());
        assert_eq!(mgr.counters(), StreamCounters { received: 2, dropped: 2 });

        feed.send(Ok(Some(r#"{"type":"error","message":"x"}"#.into()))).unwrap();
        settle().await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn transport_error_disconnects_without_retry() {
        let (mgr, connector, _hub) = manager();
        mgr.connect();
        settle().await;

        connector
            .feed(0)
            .send(Err(StreamError::Transport("reset".into())))
            .unwrap();
        settle().await;

        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn peer_close_disconnects() {
        let (mgr, connector, _hub) = manager();
        let mut states = mgr.subscribe_state();
        mgr.connect();
        settle().await;

        connector.feed(0).send(Ok(None)).unwrap();
        settle().await;
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_connects_once_after_delay() {
        let (mgr, connector, _hub) = manager();
        mgr.connect();
        settle().await;
        assert_eq!(connector.connects(), 1);

        mgr.reconnect();
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        settle().await;
        assert_eq!(connector.closes(), 1);

        tokio::time::advance(Duration::from_millis(999)).await;
        settle().await;
        assert_eq!(connector.connects(), 1);
        assert_eq!(mgr.state(), ConnectionState::Disconnected);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(connector.connects(), 2);
        assert_eq!(mgr.state(), ConnectionState::Connected);

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn stale_task_cannot_overwrite_new_connection() {
        let (mgr, connector, _hub) = manager();
        mgr.connect();
        settle().await;
        let old_feed = connector.feed(0);

        mgr.disconnect();
        mgr.connect();
        settle().await;
        assert_eq!(mgr.state(), ConnectionState::Connected);

        // the first task has exited; its feed no longer reaches anyone
        let _ = old_feed.send(Err(StreamError::Transport("late".into())));
        settle().await;
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(connector.connects(), 2);
    }
}
