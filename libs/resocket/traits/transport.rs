//! Raw Transport Seam
//!
//! The session never talks to a concrete WebSocket library directly. It asks
//! a [`Transport`] to open a socket and gets back a [`RawSocket`]: an outbound
//! command handle plus an ordered stream of inbound events.
//!
//! ```text
//!            SocketSender ──[SocketCommand]──> transport pump ──> wire
//! Session ─┤
//!            events rx   <──[RawEvent]──────── transport pump <── wire
//! ```
//!
//! The default implementation is
//! [`TungsteniteTransport`](crate::core::tungstenite::TungsteniteTransport).

use crate::error::{ReSocketError, Result};
use crate::message::WsMessage;
use async_trait::async_trait;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Close code for a normal closure
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the connection dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// What the session asks a transport to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub url: String,
    /// Sub-protocols, sent as `Sec-WebSocket-Protocol`
    pub protocols: Vec<String>,
}

/// Inbound event from a raw socket
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Message(WsMessage),
    Error(String),
    /// The socket is closed; no further events follow
    Close { code: u16, reason: String },
}

/// Outbound command to a raw socket
#[derive(Debug, Clone, PartialEq)]
pub enum SocketCommand {
    Send(WsMessage),
    Close { code: u16, reason: String },
}

impl SocketCommand {
    /// The payload of a `Send`, `None` for a `Close`
    pub fn into_message(self) -> Option<WsMessage> {
        match self {
            SocketCommand::Send(message) => Some(message),
            SocketCommand::Close { .. } => None,
        }
    }
}

/// Cloneable outbound handle of a raw socket
#[derive(Debug, Clone)]
pub struct SocketSender {
    tx: UnboundedSender<SocketCommand>,
}

impl SocketSender {
    pub fn new(tx: UnboundedSender<SocketCommand>) -> Self {
        Self { tx }
    }

    /// Queue a message on the socket
    pub fn send(&self, message: WsMessage) -> Result<()> {
        self.try_send(message)
            .map_err(|_| ReSocketError::ChannelSend("socket is closed".into()))
    }

    /// Queue a message, handing it back if the socket is gone
    pub(crate) fn try_send(&self, message: WsMessage) -> std::result::Result<(), WsMessage> {
        self.tx
            .send(SocketCommand::Send(message))
            // Only a Send is queued here, so the payload is always present
            .map_err(|SendError(command)| {
                command
                    .into_message()
                    .unwrap_or_else(|| WsMessage::Binary(Vec::new()))
            })
    }

    /// Ask the transport to close the socket
    pub fn close(&self, code: u16, reason: impl Into<String>) -> Result<()> {
        self.tx
            .send(SocketCommand::Close {
                code,
                reason: reason.into(),
            })
            .map_err(|_| ReSocketError::ChannelSend("socket is closed".into()))
    }

    /// True once the transport side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A freshly opened socket, as returned by [`Transport::open`]
#[derive(Debug)]
pub struct RawSocket {
    sender: SocketSender,
    events: UnboundedReceiver<RawEvent>,
    url: String,
    protocol: Option<String>,
}

impl RawSocket {
    /// # Arguments
    /// * `sender` - Outbound command handle
    /// * `events` - Inbound events, ending with a single `RawEvent::Close`
    /// * `url` - The URL the socket is connected to
    /// * `protocol` - Negotiated sub-protocol, if any
    pub fn new(
        sender: SocketSender,
        events: UnboundedReceiver<RawEvent>,
        url: impl Into<String>,
        protocol: Option<String>,
    ) -> Self {
        Self {
            sender,
            events,
            url: url.into(),
            protocol,
        }
    }

    pub fn sender(&self) -> &SocketSender {
        &self.sender
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Close the socket, consuming the handle
    pub fn close(self, code: u16, reason: impl Into<String>) {
        let _ = self.sender.close(code, reason);
    }

    pub(crate) fn into_parts(
        self,
    ) -> (SocketSender, UnboundedReceiver<RawEvent>, String, Option<String>) {
        (self.sender, self.events, self.url, self.protocol)
    }
}

/// Trait for opening raw sockets
///
/// Implement this to run the session over something other than
/// tokio-tungstenite (a proxy, an in-memory transport for tests, ...).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open one socket
    ///
    /// Resolves once the socket is open. The session races this against its
    /// connection timeout; a socket that opens after the timeout is closed.
    async fn open(&self, request: OpenRequest) -> Result<RawSocket>;
}
