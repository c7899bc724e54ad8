use crate::core::buffer::SendOutcome;
use crate::core::config::SessionConfig;
use crate::core::engine::{Command, Engine, Inbox};
use crate::core::events::{SocketEvent, StateChange};
use crate::core::lost_connection::run_detector;
use crate::core::notifier::EventNotifier;
use crate::core::state::{AtomicSessionStatus, FineState, ReadyState, SessionStatus};
use crate::error::{ReSocketError, Result};
use crate::message::WsMessage;
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// URL and negotiated protocol of the live socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LiveInfo {
    pub(crate) url: String,
    pub(crate) protocol: Option<String>,
}

/// Snapshot of the session, written by the engine and read by handles
#[derive(Debug)]
pub(crate) struct SharedSession {
    pub(crate) status: AtomicSessionStatus,
    pub(crate) state: RwLock<FineState>,
    pub(crate) stopped: AtomicBool,
    pub(crate) buffered_amount: AtomicUsize,
    pub(crate) retry_count: AtomicU32,
    pub(crate) live: RwLock<Option<LiveInfo>>,
    pub(crate) last_message_sent: Mutex<Option<Instant>>,
}

impl SharedSession {
    fn new() -> Self {
        Self {
            status: AtomicSessionStatus::new(SessionStatus::Initial),
            state: RwLock::new(FineState::Initial),
            stopped: AtomicBool::new(false),
            buffered_amount: AtomicUsize::new(0),
            retry_count: AtomicU32::new(0),
            live: RwLock::new(None),
            last_message_sent: Mutex::new(None),
        }
    }
}

/// Resilient WebSocket session
///
/// A `ReSocket` keeps one logical connection alive: it reconnects with
/// backoff, optionally resolves auth params before every attempt, runs an
/// application-level heartbeat, buffers outbound messages while
/// disconnected and reports a coarse [`SessionStatus`].
///
/// All state lives in a dedicated Tokio task; this handle talks to it over
/// a channel and reads a lock-free snapshot for the accessors.
///
/// # Example
/// ```ignore
/// let socket = ReSocket::builder()
///     .url("wss://api.example.com/ws")
///     .heartbeat(Duration::from_secs(15))
///     .buffer(BufferPolicy::Capped(100))
///     .build()
///     .await?;
///
/// let events = socket.subscribe();
/// socket.send("hello").await?;
///
/// while let Ok(event) = events.recv() {
///     println!("{:?}", event);
/// }
/// ```
pub struct ReSocket {
    inbox: mpsc::UnboundedSender<Inbox>,
    shared: Arc<SharedSession>,
    events: Arc<EventNotifier<SocketEvent>>,
    transitions: Arc<EventNotifier<StateChange>>,
    config: Arc<SessionConfig>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ReSocket {
    /// Spawn the session task and the lost-connection detector
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn spawn(config: SessionConfig) -> Self {
        let config = Arc::new(config);
        let shared = Arc::new(SharedSession::new());
        let events = Arc::new(EventNotifier::new());
        let transitions = Arc::new(EventNotifier::new());

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_detector(
            config.lost_connection_timeout,
            status_rx,
            Arc::clone(&events),
        ));

        let engine = Engine::new(
            Arc::clone(&config),
            Arc::clone(&shared),
            Arc::clone(&events),
            Arc::clone(&transitions),
            inbox_tx.clone(),
            status_tx,
        );
        let task_handle = tokio::spawn(engine.run(inbox_rx));

        info!("ReSocket session created for {}", config.url);

        Self {
            inbox: inbox_tx,
            shared,
            events,
            transitions,
            config,
            task_handle: Some(task_handle),
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(ReSocketError::Stopped);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(Inbox::Command(command(reply_tx)))
            .map_err(|_| ReSocketError::Stopped)?;
        reply_rx.await.map_err(|_| ReSocketError::Stopped)?
    }

    /// Force a new connection attempt from `auth`
    ///
    /// Closes the current socket, if any.
    pub async fn reconnect(&self) -> Result<()> {
        self.request(Command::Reconnect).await
    }

    /// Same as [`reconnect`](Self::reconnect)
    pub async fn open(&self) -> Result<()> {
        self.reconnect().await
    }

    /// Close the socket and stop retrying, until the next `reconnect()`
    pub async fn close(&self) -> Result<()> {
        self.request(Command::Close).await
    }

    /// Permanently stop the session
    ///
    /// Every later operation fails with [`ReSocketError::Stopped`].
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop(Some(reply))).await
    }

    /// Send a message, or buffer it while disconnected
    pub async fn send(&self, message: impl Into<WsMessage>) -> Result<SendOutcome> {
        let message = message.into();
        self.request(|reply| Command::Send(message, reply)).await
    }

    /// Subscribe to session events
    ///
    /// Only events published after subscribing are delivered.
    pub fn subscribe(&self) -> Receiver<SocketEvent> {
        self.events.subscribe()
    }

    /// Subscribe to fine-grained state transitions
    pub fn subscribe_transitions(&self) -> Receiver<StateChange> {
        self.transitions.subscribe()
    }

    #[inline]
    pub fn status(&self) -> SessionStatus {
        self.shared.status.get()
    }

    pub fn state(&self) -> FineState {
        *self.shared.state.read()
    }

    /// False once stopped
    #[inline]
    pub fn is_usable(&self) -> bool {
        !self.shared.stopped.load(Ordering::Acquire)
    }

    /// Whether a live socket would take a message right now
    pub fn can_send(&self) -> bool {
        self.shared.live.read().is_some()
    }

    /// Total payload bytes waiting in the outbound buffer
    #[inline]
    pub fn buffered_amount(&self) -> usize {
        self.shared.buffered_amount.load(Ordering::Acquire)
    }

    /// Consecutive failed attempts since the last successful connection
    #[inline]
    pub fn retry_count(&self) -> u32 {
        self.shared.retry_count.load(Ordering::Acquire)
    }

    pub fn last_message_sent(&self) -> Option<Instant> {
        *self.shared.last_message_sent.lock()
    }

    /// Negotiated sub-protocol of the live socket
    pub fn protocol(&self) -> Option<String> {
        self.shared
            .live
            .read()
            .as_ref()
            .and_then(|live| live.protocol.clone())
    }

    /// URL of the live socket, or the base URL when disconnected
    pub fn url(&self) -> String {
        self.shared
            .live
            .read()
            .as_ref()
            .map(|live| live.url.clone())
            .unwrap_or_else(|| self.config.url.clone())
    }

    pub fn ready_state(&self) -> ReadyState {
        if self.shared.live.read().is_some() {
            ReadyState::Open
        } else if self.state().is_inactive() {
            ReadyState::Closed
        } else {
            ReadyState::Connecting
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stop the session and wait for its task to finish
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down ReSocket session");

        if self.is_usable() {
            match self.stop().await {
                Ok(()) | Err(ReSocketError::Stopped) => {}
                Err(e) => return Err(e),
            }
        }

        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
        Ok(())
    }
}

impl Drop for ReSocket {
    fn drop(&mut self) {
        if self.task_handle.is_some() && self.is_usable() {
            debug!("ReSocket dropped, stopping session");
            let _ = self.inbox.send(Inbox::Command(Command::Stop(None)));
        }
    }
}

impl std::fmt::Debug for ReSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReSocket")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .field("status", &self.status())
            .finish()
    }
}
