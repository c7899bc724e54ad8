//! # ReSocket core
//!
//! The session engine and everything around it: configuration, the
//! type-state builder, connection establishment, heartbeat bookkeeping,
//! buffering, the lost-connection detector and the default transport.
//!
//! ## Example
//!
//! ```rust,ignore
//! use resocket::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let socket = ReSocket::builder()
//!         .url("wss://api.example.com/ws")
//!         .params(params_fn(|_info| async {
//!             let mut params = Params::new();
//!             params.insert("token".into(), fetch_token().await?.into());
//!             Ok(params)
//!         }))
//!         .heartbeat(Duration::from_secs(15))
//!         .max_missed_pings(2)
//!         .buffer(BufferPolicy::Unbounded)
//!         .close_codes([4000])
//!         .build()
//!         .await?;
//!
//!     let events = socket.subscribe();
//!     socket.send("hello").await?;
//!
//!     while let Ok(event) = events.recv() {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod builder;
pub(crate) mod cancel;
pub mod client;
pub mod config;
pub(crate) mod engine;
pub(crate) mod establisher;
pub mod events;
pub mod heartbeat;
pub mod lost_connection;
pub mod notifier;
pub mod state;
pub mod tungstenite;

// Re-export main types
pub use buffer::{BufferPolicy, OutboundQueue, SendOutcome};
pub use builder::{states, ReSocketBuilder};
pub use client::ReSocket;
pub use config::{BufferOption, SessionConfig, SessionOptions};
pub use events::{CloseInfo, DisconnectReason, SocketEvent, StateChange};
pub use heartbeat::{HeartbeatConfig, MissedPings, PingVerdict};
pub use lost_connection::LostConnectionState;
pub use notifier::EventNotifier;
pub use state::{
    can_transition, project_status, AtomicSessionStatus, FineState, LostConnectionStatus,
    ReadyState, SessionStatus,
};
pub use tungstenite::TungsteniteTransport;

/// Create a new session builder
///
/// Same as [`ReSocket::builder`].
pub fn builder() -> ReSocketBuilder<builder::states::NoUrl> {
    ReSocketBuilder::new()
}
