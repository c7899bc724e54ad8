//! # ReSocket
//!
//! A resilient WebSocket session layer. Raw sockets fail silently, drop on
//! network changes and say nothing about whether the other end is still
//! alive; a `ReSocket` keeps one logical connection healthy on top of them.
//!
//! ## Features
//!
//! - **Reconnection**: Bounded, growing backoff with an optional retry budget
//! - **Auth step**: Async params resolved before every attempt, fed into the URL
//! - **Connection resolver**: Defer acceptance of an open socket, holding inbound messages
//! - **Heartbeat**: Application-level ping/pong with a missed-reply threshold
//! - **Buffering**: Queue outbound messages while disconnected, replay in order
//! - **Health signal**: `lost / restored / failed`, distinct from raw connect events
//! - **Actor engine**: One task owns the session; stale completions never mutate state

pub mod core;
pub mod traits;

// Trait modules are addressable from the crate root
pub use traits::{
    error, message, params, platform, pong_detector, reconnect, resolver, transport,
};

// Re-export all traits
pub use traits::*;

// Re-export core session functionality
pub use crate::core::{
    builder, can_transition, project_status, BufferOption, BufferPolicy, CloseInfo,
    DisconnectReason, EventNotifier, FineState, HeartbeatConfig, LostConnectionStatus, ReSocket,
    ReSocketBuilder, ReadyState, SendOutcome, SessionConfig, SessionOptions, SessionStatus,
    SocketEvent, StateChange, TungsteniteTransport,
};
