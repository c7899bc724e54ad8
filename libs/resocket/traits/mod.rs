//! # ReSocket Traits
//!
//! Pluggable seams and shared types for the resocket session layer:
//!
//! - **Transport**: Open raw sockets (default: tokio-tungstenite)
//! - **ParamsProvider**: Resolve auth params before each connection attempt
//! - **UrlBuilder**: Compute the URL of each attempt
//! - **ConnectionResolver**: Defer acceptance of an opened socket
//! - **ReconnectionStrategy**: Delay between attempts
//! - **PongDetector**: Recognize heartbeat replies
//! - **PlatformNotifier**: Focus / online / offline signals

pub mod error;
pub mod message;
pub mod params;
pub mod platform;
pub mod pong_detector;
pub mod reconnect;
pub mod resolver;
pub mod transport;

pub use error::{ReSocketError, Result};
pub use message::WsMessage;
pub use params::{default_url, params_fn, Params, ParamsFn, ParamsProvider, RetryInfo, UrlBuilder, UrlInfo};
pub use platform::{
    ManualPlatformNotifier, PlatformCallback, PlatformNotifier, PlatformSignal, SubscriptionId,
};
pub use pong_detector::{PongDetector, TextPongDetector};
pub use reconnect::{ExponentialBackoff, ReconnectionStrategy};
pub use resolver::{ConnectionResolver, PendingConnection, ResolverDecision};
pub use transport::{
    OpenRequest, RawEvent, RawSocket, SocketCommand, SocketSender, Transport, CLOSE_ABNORMAL,
    CLOSE_NORMAL,
};
