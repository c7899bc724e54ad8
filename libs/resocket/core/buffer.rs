//! Outbound buffering while no live socket exists
//!
//! Messages are kept in send order and flushed on the next successful
//! connection. A capped queue drops new messages once full; it never evicts
//! what it already holds.

use crate::message::WsMessage;
use std::collections::VecDeque;

/// What happens to `send()` while disconnected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Drop the message
    #[default]
    Disabled,
    Unbounded,
    /// Keep at most this many messages
    Capped(usize),
}

/// Outcome of [`ReSocket::send`](crate::ReSocket::send)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the live socket
    Sent,
    /// Queued until the next connection
    Buffered,
    /// Discarded (buffering disabled or queue full)
    Dropped,
}

#[derive(Debug, Default)]
pub struct OutboundQueue {
    policy: BufferPolicy,
    messages: VecDeque<WsMessage>,
    bytes: usize,
}

impl OutboundQueue {
    pub fn new(policy: BufferPolicy) -> Self {
        Self {
            policy,
            messages: VecDeque::new(),
            bytes: 0,
        }
    }

    /// Try to enqueue a message
    pub fn offer(&mut self, message: WsMessage) -> SendOutcome {
        let admit = match self.policy {
            BufferPolicy::Disabled => false,
            BufferPolicy::Unbounded => true,
            BufferPolicy::Capped(max) => self.messages.len() < max,
        };

        if !admit {
            return SendOutcome::Dropped;
        }

        self.bytes += message.len();
        self.messages.push_back(message);
        SendOutcome::Buffered
    }

    /// Take every queued message, oldest first
    pub fn drain(&mut self) -> Vec<WsMessage> {
        self.bytes = 0;
        self.messages.drain(..).collect()
    }

    /// Total payload size of the queued messages
    pub fn buffered_bytes(&self) -> usize {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }
}
