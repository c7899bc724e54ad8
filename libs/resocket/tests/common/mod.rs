//! Common test utilities for resocket integration tests
//!
//! - [`MockWsServer`]: a real local WebSocket server with scriptable behavior,
//!   exercised through the default tokio-tungstenite transport
//! - [`MockTransport`]: an in-memory [`Transport`] whose sockets are driven by
//!   the test through [`MockPeer`], for timing-sensitive cases under paused time

#![allow(dead_code)]

use async_trait::async_trait;
use crossbeam_channel::Receiver;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use resocket::transport::{OpenRequest, RawEvent, RawSocket, SocketCommand, SocketSender, Transport};
use resocket::{FineState, ReSocketError, Result, StateChange, WsMessage};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Install a tracing subscriber once (RUST_LOG controls the filter)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How the mock server treats each connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerBehavior {
    /// Echo text and binary messages
    Echo,
    /// Close the first connection with this code right after the handshake,
    /// echo on every later one
    CloseFirst(u16),
    /// Close every connection with this code right after the handshake
    CloseAlways(u16),
}

/// A simple mock WebSocket server for testing
pub struct MockWsServer {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    /// Create and start a new mock WebSocket server
    pub async fn start(behavior: ServerBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let connections = Arc::new(AtomicUsize::new(0));

        let shutdown_clone = shutdown.clone();
        let connections_clone = connections.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let index = connections_clone.fetch_add(1, Ordering::SeqCst);
                                let shutdown = shutdown_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, behavior, index, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            connections,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        behavior: ServerBehavior,
        index: usize,
        shutdown: Arc<Notify>,
    ) {
        // Agree to the first requested sub-protocol, if any
        let negotiate = |request: &Request, mut response: Response| -> std::result::Result<Response, ErrorResponse> {
            if let Some(first) = request
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(|value| value.trim().to_string())
            {
                if let Ok(value) = HeaderValue::from_str(&first) {
                    response
                        .headers_mut()
                        .insert("Sec-WebSocket-Protocol", value);
                }
            }
            Ok(response)
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, negotiate).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        let close_with = match behavior {
            ServerBehavior::CloseFirst(code) if index == 0 => Some(code),
            ServerBehavior::CloseAlways(code) => Some(code),
            _ => None,
        };
        if let Some(code) = close_with {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: "scripted close".into(),
            };
            let _ = write.send(Message::Close(Some(frame))).await;
            // Drain until the client acknowledges
            while let Some(Ok(_)) = read.next().await {}
            return;
        }

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            if msg.is_text() || msg.is_binary() {
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            } else if msg.is_close() {
                                break;
                            }
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of accepted TCP connections so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The far end of one in-memory socket
pub struct MockPeer {
    pub request: OpenRequest,
    commands: mpsc::UnboundedReceiver<SocketCommand>,
    events: mpsc::UnboundedSender<RawEvent>,
}

impl MockPeer {
    /// Deliver a text message to the session
    pub fn message(&self, text: &str) {
        let _ = self.events.send(RawEvent::Message(WsMessage::from(text)));
    }

    /// Close the socket from the server side
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.events.send(RawEvent::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next command from the session, waiting up to 10s (virtual under paused time)
    pub async fn next_command(&mut self) -> Option<SocketCommand> {
        tokio::time::timeout(Duration::from_secs(10), self.commands.recv())
            .await
            .ok()
            .flatten()
    }

    /// Commands received so far, without waiting
    pub fn drain_commands(&mut self) -> Vec<SocketCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// Text payloads sent by the session so far
    pub fn sent_texts(&mut self) -> Vec<String> {
        self.drain_commands()
            .into_iter()
            .filter_map(|command| match command {
                SocketCommand::Send(WsMessage::Text(text)) => Some(text),
                _ => None,
            })
            .collect()
    }
}

struct MockInner {
    open_delay: Mutex<Duration>,
    refuse: AtomicBool,
    requests: Mutex<Vec<OpenRequest>>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

/// In-memory transport; every opened socket shows up as a [`MockPeer`]
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

/// Receiving side of [`MockTransport`]
pub struct MockPeers {
    rx: mpsc::UnboundedReceiver<MockPeer>,
}

impl MockPeers {
    /// Wait for the next opened socket (10s, virtual under paused time)
    pub async fn next(&mut self) -> MockPeer {
        tokio::time::timeout(Duration::from_secs(10), self.rx.recv())
            .await
            .expect("no socket opened in time")
            .expect("transport dropped")
    }

    /// An already opened socket, if any
    pub fn try_next(&mut self) -> Option<MockPeer> {
        self.rx.try_recv().ok()
    }
}

impl MockTransport {
    pub fn new() -> (Self, MockPeers) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            inner: Arc::new(MockInner {
                open_delay: Mutex::new(Duration::ZERO),
                refuse: AtomicBool::new(false),
                requests: Mutex::new(Vec::new()),
                peers: tx,
            }),
        };
        (transport, MockPeers { rx })
    }

    /// Delay every open by this much
    pub fn set_open_delay(&self, delay: Duration) {
        *self.inner.open_delay.lock() = delay;
    }

    /// Make every open fail
    pub fn set_refuse(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Every open request seen so far
    pub fn requests(&self) -> Vec<OpenRequest> {
        self.inner.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, request: OpenRequest) -> Result<RawSocket> {
        self.inner.requests.lock().push(request.clone());

        let delay = *self.inner.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(ReSocketError::WebSocket("connection refused".into()));
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let socket = RawSocket::new(
            SocketSender::new(command_tx),
            event_rx,
            request.url.clone(),
            None,
        );

        let _ = self.inner.peers.send(MockPeer {
            request,
            commands: command_rx,
            events: event_tx,
        });
        Ok(socket)
    }
}

/// Wait for an item matching `predicate`, skipping the rest
///
/// Polls with `tokio::time::sleep`, so it works both in real time and under
/// `start_paused`.
pub async fn wait_for<T, F>(rx: &Receiver<T>, timeout: Duration, mut predicate: F) -> Option<T>
where
    F: FnMut(&T) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        while let Ok(item) = rx.try_recv() {
            if predicate(&item) {
                return Some(item);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Collect items up to and including the first one matching `predicate`
///
/// Returns everything collected, matched or not, once the timeout expires.
pub async fn collect_until<T, F>(rx: &Receiver<T>, timeout: Duration, mut predicate: F) -> Vec<T>
where
    F: FnMut(&T) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut items = Vec::new();
    loop {
        while let Ok(item) = rx.try_recv() {
            let done = predicate(&item);
            items.push(item);
            if done {
                return items;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return items;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the session reaches `state`
pub async fn wait_for_state(
    rx: &Receiver<StateChange>,
    state: FineState,
    timeout: Duration,
) -> bool {
    wait_for(rx, timeout, |change| change.to == state).await.is_some()
}

/// Everything received so far, without waiting
pub fn drain<T>(rx: &Receiver<T>) -> Vec<T> {
    rx.try_iter().collect()
}

/// Target states of every transition received so far
pub fn targets(rx: &Receiver<StateChange>) -> Vec<FineState> {
    rx.try_iter().map(|change| change.to).collect()
}

/// Let spawned tasks run without advancing much time
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}
