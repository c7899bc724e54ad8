//! Application-level heartbeat
//!
//! # Cycle
//!
//! ```text
//!   connected ──(interval elapsed)──> ping ──(reply)──> connected
//!                                      │
//!                              (ping timeout / send failed)
//!                                      v
//!                                 ping_backoff ──(misses < max)──> ping
//!                                      │
//!                               (misses >= max)
//!                                      v
//!                                 auth_backoff
//! ```
//!
//! The timers themselves are owned by the engine; this module holds the
//! ping/reply configuration and the missed-ping counter.

use crate::message::WsMessage;
use crate::pong_detector::{PongDetector, TextPongDetector};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_PING_MESSAGE: &str = "ping";
pub const DEFAULT_PONG_MESSAGE: &str = "pong";

/// Heartbeat settings, present only when a heartbeat interval is configured
#[derive(Clone)]
pub struct HeartbeatConfig {
    pub(crate) interval: Duration,
    pub(crate) ping_timeout: Duration,
    pub(crate) max_missed_pings: u32,
    pub(crate) ping_message: WsMessage,
    pub(crate) pong_detector: Arc<dyn PongDetector>,
}

impl HeartbeatConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            max_missed_pings: 0,
            ping_message: WsMessage::from(DEFAULT_PING_MESSAGE),
            pong_detector: Arc::new(TextPongDetector::new(DEFAULT_PONG_MESSAGE)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }

    pub fn max_missed_pings(&self) -> u32 {
        self.max_missed_pings
    }

    /// The ping to send
    pub fn ping_message(&self) -> WsMessage {
        self.ping_message.clone()
    }

    /// Whether `message` answers the ping
    #[inline]
    pub fn is_reply(&self, message: &WsMessage) -> bool {
        self.pong_detector.is_pong(message)
    }
}

impl std::fmt::Debug for HeartbeatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatConfig")
            .field("interval", &self.interval)
            .field("ping_timeout", &self.ping_timeout)
            .field("max_missed_pings", &self.max_missed_pings)
            .field("ping_message", &self.ping_message)
            .finish_non_exhaustive()
    }
}

/// What to do after a missed reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingVerdict {
    /// Ping again right away
    Retry,
    /// Give up on this socket and go through `auth_backoff`
    Escalate,
}

/// Consecutive missed heartbeat replies
#[derive(Debug, Clone, Copy)]
pub struct MissedPings {
    count: u32,
    threshold: u32,
}

impl MissedPings {
    /// A threshold of 0 escalates on the first miss, same as 1
    pub fn new(max_missed_pings: u32) -> Self {
        Self {
            count: 0,
            threshold: max_missed_pings.max(1),
        }
    }

    pub fn record_miss(&mut self) -> PingVerdict {
        self.count = self.count.saturating_add(1);
        if self.count >= self.threshold {
            PingVerdict::Escalate
        } else {
            PingVerdict::Retry
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalates_after_exactly_n_misses() {
        let mut missed = MissedPings::new(3);
        assert_eq!(missed.record_miss(), PingVerdict::Retry);
        assert_eq!(missed.record_miss(), PingVerdict::Retry);
        assert_eq!(missed.record_miss(), PingVerdict::Escalate);
        assert_eq!(missed.count(), 3);
    }

    #[test]
    fn test_zero_threshold_escalates_immediately() {
        let mut missed = MissedPings::new(0);
        assert_eq!(missed.record_miss(), PingVerdict::Escalate);
    }

    #[test]
    fn test_reset_clears_count() {
        let mut missed = MissedPings::new(2);
        missed.record_miss();
        missed.reset();
        assert_eq!(missed.count(), 0);
        assert_eq!(missed.record_miss(), PingVerdict::Retry);
    }

    #[test]
    fn test_default_ping_and_reply() {
        let config = HeartbeatConfig::new(Duration::from_secs(5));
        assert_eq!(config.ping_message(), WsMessage::from("ping"));
        assert!(config.is_reply(&WsMessage::from("pong")));
        assert!(!config.is_reply(&WsMessage::from("ping")));
        assert_eq!(config.ping_timeout(), DEFAULT_PING_TIMEOUT);
    }
}
