use crate::core::state::{FineState, LostConnectionStatus, SessionStatus};
use crate::error::ReSocketError;
use crate::message::WsMessage;

/// Close frame details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Why the session stopped trying to connect
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// Entered `closed`, by `close()` or by a configured close code
    Closed(Option<CloseInfo>),
    /// Entered `failed`: retries exhausted or a stop-retry error
    Failed(ReSocketError),
    /// Entered `stopped`
    Stopped,
}

/// Event published to subscribers of a [`ReSocket`](crate::ReSocket)
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A connection was accepted and is now live
    Open {
        url: String,
        protocol: Option<String>,
    },
    /// Inbound application message, including heartbeat replies
    Message(WsMessage),
    /// Error reported by the live socket
    Error(String),
    /// The live socket closed
    Close(CloseInfo),
    Disconnect(DisconnectReason),
    StatusChange(SessionStatus),
    LostConnection(LostConnectionStatus),
}

impl SocketEvent {
    #[inline]
    pub fn is_message(&self) -> bool {
        matches!(self, SocketEvent::Message(_))
    }

    #[inline]
    pub fn as_message(&self) -> Option<&WsMessage> {
        match self {
            SocketEvent::Message(message) => Some(message),
            _ => None,
        }
    }
}

/// Fine-grained transition, published on the transitions channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: FineState,
    pub to: FineState,
}
