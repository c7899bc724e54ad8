//! Default [`Transport`] over tokio-tungstenite
//!
//! Each opened socket gets one pump task that owns the stream:
//!
//! ```text
//!   SocketCommand rx ──> write half ──> server
//!   RawEvent tx      <── read half  <── server
//! ```
//!
//! Control frames (ping/pong/close handshake) are answered by tungstenite.

use crate::error::{ReSocketError, Result};
use crate::message::WsMessage;
use crate::transport::{
    OpenRequest, RawEvent, RawSocket, SocketCommand, SocketSender, Transport, CLOSE_ABNORMAL,
    CLOSE_NORMAL,
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Build the client handshake request
pub(crate) fn build_request(request: &OpenRequest) -> Result<Request> {
    let mut client_request = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| ReSocketError::WebSocket(format!("invalid url {}: {}", request.url, e)))?;

    if !request.protocols.is_empty() {
        let value = HeaderValue::from_str(&request.protocols.join(", ")).map_err(|e| {
            ReSocketError::Configuration(format!("invalid sub-protocol list: {}", e))
        })?;
        client_request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    Ok(client_request)
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, request: OpenRequest) -> Result<RawSocket> {
        let client_request = build_request(&request)?;

        let (ws_stream, response) = connect_async(client_request)
            .await
            .map_err(|e| ReSocketError::WebSocket(e.to_string()))?;

        let protocol = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        debug!("Socket open to {} (protocol: {:?})", request.url, protocol);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump(ws_stream, command_rx, event_tx));

        Ok(RawSocket::new(
            SocketSender::new(command_tx),
            event_rx,
            request.url,
            protocol,
        ))
    }
}

/// Forward frames both ways until either side closes
async fn pump<S>(
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    event_tx: mpsc::UnboundedSender<RawEvent>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((CLOSE_NORMAL, String::new()));
                    let _ = event_tx.send(RawEvent::Close { code, reason });
                    let _ = write.close().await;
                    return;
                }
                Some(Ok(message)) => {
                    if let Some(message) = from_tungstenite(message) {
                        let _ = event_tx.send(RawEvent::Message(message));
                    }
                }
                Some(Err(e)) => {
                    warn!("WebSocket read error: {}", e);
                    let _ = event_tx.send(RawEvent::Error(e.to_string()));
                    let _ = event_tx.send(RawEvent::Close {
                        code: CLOSE_ABNORMAL,
                        reason: e.to_string(),
                    });
                    return;
                }
                None => {
                    let _ = event_tx.send(RawEvent::Close {
                        code: CLOSE_ABNORMAL,
                        reason: "stream ended".into(),
                    });
                    return;
                }
            },
            command = command_rx.recv() => match command {
                Some(SocketCommand::Send(message)) => {
                    if let Err(e) = write.send(to_tungstenite(message)).await {
                        warn!("WebSocket write error: {}", e);
                        let _ = event_tx.send(RawEvent::Error(e.to_string()));
                    }
                }
                Some(SocketCommand::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: Cow::Owned(reason),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    let _ = write.close().await;
                    return;
                }
                None => {
                    // Every handle dropped
                    let _ = write.close().await;
                    return;
                }
            },
        }
    }
}

pub(crate) fn to_tungstenite(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}

pub(crate) fn from_tungstenite(message: Message) -> Option<WsMessage> {
    match message {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(data) => Some(WsMessage::Binary(data)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_adds_protocol_header() {
        let request = build_request(&OpenRequest {
            url: "ws://localhost:9001/ws".into(),
            protocols: vec!["v1".into(), "v2".into()],
        })
        .unwrap();

        assert_eq!(
            request.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "v1, v2"
        );
        assert_eq!(request.uri().path(), "/ws");
    }

    #[test]
    fn test_build_request_without_protocols() {
        let request = build_request(&OpenRequest {
            url: "ws://localhost:9001".into(),
            protocols: Vec::new(),
        })
        .unwrap();
        assert!(request.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }

    #[test]
    fn test_build_request_rejects_bad_url() {
        let result = build_request(&OpenRequest {
            url: "not a url".into(),
            protocols: Vec::new(),
        });
        assert!(matches!(result, Err(ReSocketError::WebSocket(_))));
    }

    #[test]
    fn test_message_conversion_skips_control_frames() {
        assert_eq!(
            from_tungstenite(Message::Text("hi".into())),
            Some(WsMessage::from("hi"))
        );
        assert_eq!(from_tungstenite(Message::Ping(vec![1])), None);
        assert_eq!(
            to_tungstenite(WsMessage::from(vec![1u8, 2])),
            Message::Binary(vec![1, 2])
        );
    }
}
