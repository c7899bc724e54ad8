//! Connection Resolver Trait
//!
//! A resolver defers acceptance of a freshly opened socket until some custom
//! validation completes, e.g. waiting for a server "welcome" message or
//! exchanging a login frame first.
//!
//! While the decision is pending, inbound messages are copied to the
//! resolver and also held back by the session. They are delivered to
//! subscribers in order once the connection is accepted.

use crate::error::{ReSocketError, Result};
use crate::message::WsMessage;
use crate::transport::SocketSender;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// The socket as seen by a resolver before it is accepted
pub struct PendingConnection {
    sender: SocketSender,
    messages: mpsc::UnboundedReceiver<WsMessage>,
    url: String,
    protocol: Option<String>,
}

impl PendingConnection {
    pub(crate) fn new(
        sender: SocketSender,
        messages: mpsc::UnboundedReceiver<WsMessage>,
        url: String,
        protocol: Option<String>,
    ) -> Self {
        Self {
            sender,
            messages,
            url,
            protocol,
        }
    }

    /// Send a message on the pending socket
    pub fn send(&self, message: impl Into<WsMessage>) -> Result<()> {
        self.sender.send(message.into())
    }

    /// Wait for the next inbound message
    ///
    /// Returns `None` once the socket is closed or the decision no longer
    /// matters (timeout, error).
    pub async fn next_message(&mut self) -> Option<WsMessage> {
        self.messages.recv().await
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }
}

/// One-shot decision handle for a pending connection
///
/// Dropping the handle without deciding rejects the connection.
#[derive(Debug)]
pub struct ResolverDecision {
    tx: oneshot::Sender<Result<()>>,
}

impl ResolverDecision {
    pub(crate) fn new(tx: oneshot::Sender<Result<()>>) -> Self {
        Self { tx }
    }

    /// Accept the connection
    ///
    /// Returns `false` if the decision came too late (handshake timed out or
    /// the socket already failed). The socket is closed by the session in
    /// that case.
    pub fn accept(self) -> bool {
        self.tx.send(Ok(())).is_ok()
    }

    /// Reject the connection with an error
    ///
    /// `ReSocketError::StopRetry` moves the session to `failed`; any other
    /// error goes through the backoff ladder.
    pub fn reject(self, error: ReSocketError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

/// Trait for deciding whether an opened socket becomes the live connection
///
/// # Example
/// ```ignore
/// struct WelcomeResolver;
///
/// #[async_trait::async_trait]
/// impl ConnectionResolver for WelcomeResolver {
///     async fn resolve(&self, mut conn: PendingConnection, decision: ResolverDecision) {
///         match conn.next_message().await {
///             Some(WsMessage::Text(t)) if t == "welcome" => {
///                 decision.accept();
///             }
///             _ => {
///                 decision.reject(ReSocketError::Rejected("no welcome".into()));
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ConnectionResolver: Send + Sync + 'static {
    async fn resolve(&self, connection: PendingConnection, decision: ResolverDecision);
}
