use crate::core::state::FineState;
use thiserror::Error;

/// Main error type for resocket
///
/// Errors are `Clone` because most of them travel as transition payloads
/// and end up inside [`SocketEvent::Disconnect`](crate::SocketEvent).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReSocketError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Socket closed before the connection was accepted
    #[error("Connection closed ({code}): {reason}")]
    ConnectionClosed { code: u16, reason: String },

    /// A race against a configured timeout expired
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Do not retry any further
    ///
    /// Returned by a params provider or connection resolver to move the
    /// session straight to `failed`. Also synthesized when the retry budget
    /// is exhausted.
    #[error("Stop retry: {0}")]
    StopRetry(String),

    /// The connection resolver rejected the socket
    #[error("Connection rejected: {0}")]
    Rejected(String),

    /// The params provider failed
    #[error("Params error: {0}")]
    Params(String),

    /// The requested transition is not in the transition table
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: FineState, to: FineState },

    /// The instance was stopped and can no longer be used
    #[error("ReSocket instance is stopped")]
    Stopped,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl ReSocketError {
    /// Shorthand for [`ReSocketError::StopRetry`]
    pub fn stop_retry(reason: impl Into<String>) -> Self {
        Self::StopRetry(reason.into())
    }

    /// Shorthand for [`ReSocketError::Timeout`]
    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout(what.into())
    }

    pub fn is_stop_retry(&self) -> bool {
        matches!(self, Self::StopRetry(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type for resocket operations
pub type Result<T> = std::result::Result<T, ReSocketError>;
