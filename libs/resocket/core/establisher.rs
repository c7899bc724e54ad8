//! Connection establishment
//!
//! Opens exactly one raw socket and races it against the connection timeout.
//! With a resolver, the open socket is handed over for validation and the
//! race continues until the resolver decides:
//!
//! ```text
//! open ──> [resolver?] ──no──> accepted
//!               │
//!              yes ──> messages held + copied to resolver
//!                       ├─ accept()        ──> accepted (held messages replayed)
//!                       ├─ reject(err)     ──> failed, socket closed
//!                       ├─ close / error   ──> failed, socket closed
//!                       └─ deadline        ──> failed, socket closed
//! ```

use crate::error::{ReSocketError, Result};
use crate::message::WsMessage;
use crate::resolver::{ConnectionResolver, PendingConnection, ResolverDecision};
use crate::transport::{
    OpenRequest, RawEvent, RawSocket, Transport, CLOSE_ABNORMAL, CLOSE_NORMAL,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

/// An accepted socket plus everything received before acceptance
#[derive(Debug)]
pub(crate) struct Established {
    pub(crate) socket: RawSocket,
    pub(crate) held: Vec<WsMessage>,
}

pub(crate) async fn establish(
    transport: Arc<dyn Transport>,
    resolver: Option<Arc<dyn ConnectionResolver>>,
    request: OpenRequest,
    timeout: Duration,
) -> Result<Established> {
    let deadline = Instant::now() + timeout;

    let mut open_task = tokio::spawn(async move { transport.open(request).await });

    let socket = tokio::select! {
        opened = &mut open_task => match opened {
            Ok(result) => result?,
            Err(e) => return Err(ReSocketError::Other(format!("open task failed: {}", e))),
        },
        _ = tokio::time::sleep_until(deadline) => {
            // Release the socket if it opens after we gave up on it
            tokio::spawn(async move {
                if let Ok(Ok(socket)) = open_task.await {
                    debug!("Socket opened after connection timeout, closing it");
                    socket.close(CLOSE_NORMAL, "connection timeout");
                }
            });
            return Err(ReSocketError::timeout("connection timeout"));
        }
    };

    match resolver {
        None => Ok(Established {
            socket,
            held: Vec::new(),
        }),
        Some(resolver) => resolve(resolver, socket, deadline).await,
    }
}

async fn resolve(
    resolver: Arc<dyn ConnectionResolver>,
    socket: RawSocket,
    deadline: Instant,
) -> Result<Established> {
    let (sender, mut events, url, protocol) = socket.into_parts();
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let (decision_tx, mut decision_rx) = oneshot::channel();

    let pending = PendingConnection::new(sender.clone(), message_rx, url.clone(), protocol.clone());
    tokio::spawn(async move {
        resolver
            .resolve(pending, ResolverDecision::new(decision_tx))
            .await;
    });

    let mut held = Vec::new();

    let outcome = loop {
        tokio::select! {
            decision = &mut decision_rx => {
                break match decision {
                    Ok(result) => result,
                    Err(_) => Err(ReSocketError::Rejected(
                        "resolver dropped the decision".into(),
                    )),
                };
            }
            event = events.recv() => match event {
                Some(RawEvent::Message(message)) => {
                    let _ = message_tx.send(message.clone());
                    held.push(message);
                }
                Some(RawEvent::Error(error)) => break Err(ReSocketError::WebSocket(error)),
                Some(RawEvent::Close { code, reason }) => {
                    break Err(ReSocketError::ConnectionClosed { code, reason })
                }
                None => {
                    break Err(ReSocketError::ConnectionClosed {
                        code: CLOSE_ABNORMAL,
                        reason: "socket dropped before acceptance".into(),
                    })
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                break Err(ReSocketError::timeout("connection timeout"));
            }
        }
    };

    match outcome {
        Ok(()) => Ok(Established {
            socket: RawSocket::new(sender, events, url, protocol),
            held,
        }),
        Err(error) => {
            // decision_rx drops on return, so a late accept() reports false
            debug!("Pending connection to {} not accepted: {}", url, error);
            let _ = sender.close(CLOSE_NORMAL, "connection not accepted");
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{SocketCommand, SocketSender};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

    /// Opens one scripted socket after a delay
    struct OneShotTransport {
        delay: Duration,
        parts: Mutex<Option<(UnboundedSender<SocketCommand>, UnboundedReceiver<RawEvent>)>>,
    }

    #[async_trait]
    impl Transport for OneShotTransport {
        async fn open(&self, request: OpenRequest) -> Result<RawSocket> {
            tokio::time::sleep(self.delay).await;
            let (tx, rx) = self
                .parts
                .lock()
                .take()
                .ok_or_else(|| ReSocketError::WebSocket("already opened".into()))?;
            Ok(RawSocket::new(SocketSender::new(tx), rx, request.url, None))
        }
    }

    fn scripted(
        delay: Duration,
    ) -> (
        Arc<OneShotTransport>,
        UnboundedReceiver<SocketCommand>,
        UnboundedSender<RawEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(OneShotTransport {
            delay,
            parts: Mutex::new(Some((cmd_tx, event_rx))),
        });
        (transport, cmd_rx, event_tx)
    }

    fn request() -> OpenRequest {
        OpenRequest {
            url: "ws://test".into(),
            protocols: Vec::new(),
        }
    }

    struct AcceptAfterFirst;

    #[async_trait]
    impl ConnectionResolver for AcceptAfterFirst {
        async fn resolve(&self, mut conn: PendingConnection, decision: ResolverDecision) {
            if conn.next_message().await.is_some() {
                decision.accept();
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepts_without_resolver() {
        let (transport, _cmd_rx, _event_tx) = scripted(Duration::from_millis(10));
        let established = establish(transport, None, request(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(established.socket.url(), "ws://test");
        assert!(established.held.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_closes_late_socket() {
        let (transport, mut cmd_rx, _event_tx) = scripted(Duration::from_secs(5));
        let result = establish(transport, None, request(), Duration::from_secs(1)).await;
        assert_eq!(result.unwrap_err(), ReSocketError::timeout("connection timeout"));

        let command = cmd_rx.recv().await;
        assert!(matches!(command, Some(SocketCommand::Close { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_holds_messages_until_accept() {
        let (transport, _cmd_rx, event_tx) = scripted(Duration::ZERO);
        event_tx.send(RawEvent::Message("welcome".into())).unwrap();

        let established = establish(
            transport,
            Some(Arc::new(AcceptAfterFirst)),
            request(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(established.held, vec![WsMessage::from("welcome")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_before_accept_fails() {
        let (transport, mut cmd_rx, event_tx) = scripted(Duration::ZERO);
        event_tx
            .send(RawEvent::Close {
                code: 4001,
                reason: "nope".into(),
            })
            .unwrap();

        let result = establish(
            transport,
            Some(Arc::new(AcceptAfterFirst)),
            request(),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            result.unwrap_err(),
            ReSocketError::ConnectionClosed {
                code: 4001,
                reason: "nope".into()
            }
        );
        assert!(matches!(cmd_rx.recv().await, Some(SocketCommand::Close { .. })));
    }
}
