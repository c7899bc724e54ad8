//! Heartbeat Reply Detection
//!
//! Servers answer the heartbeat ping in different ways (a bare "pong", a
//! JSON object, an echo of the ping), so matching the reply is pluggable.

use crate::message::WsMessage;

/// Trait for recognizing the heartbeat reply in the message stream
///
/// # Example
///
/// ```rust,ignore
/// struct JsonPong;
///
/// impl PongDetector for JsonPong {
///     fn is_pong(&self, message: &WsMessage) -> bool {
///         message
///             .as_text()
///             .and_then(|t| serde_json::from_str::<serde_json::Value>(t).ok())
///             .map_or(false, |v| v["type"] == "pong")
///     }
/// }
/// ```
pub trait PongDetector: Send + Sync {
    /// Returns true if the message answers the outstanding ping
    fn is_pong(&self, message: &WsMessage) -> bool;
}

/// Matches text messages equal to the configured reply
#[derive(Debug, Clone)]
pub struct TextPongDetector {
    pong_text: String,
}

impl TextPongDetector {
    pub fn new(pong_text: impl Into<String>) -> Self {
        Self {
            pong_text: pong_text.into(),
        }
    }

    pub fn pong_text(&self) -> &str {
        &self.pong_text
    }
}

impl PongDetector for TextPongDetector {
    fn is_pong(&self, message: &WsMessage) -> bool {
        message.as_text() == Some(self.pong_text.as_str())
    }
}

impl<F> PongDetector for F
where
    F: Fn(&WsMessage) -> bool + Send + Sync,
{
    fn is_pong(&self, message: &WsMessage) -> bool {
        self(message)
    }
}
