use crate::core::buffer::BufferPolicy;
use crate::core::heartbeat::HeartbeatConfig;
use crate::params::{ParamsProvider, UrlBuilder};
use crate::platform::PlatformNotifier;
use crate::reconnect::ReconnectionStrategy;
use crate::resolver::ConnectionResolver;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_PARAMS_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Configuration of one [`ReSocket`](crate::ReSocket) session
///
/// Assembled by the type-state builder; see [`ReSocket::builder`](crate::ReSocket::builder).
pub struct SessionConfig {
    /// Base URL (ws:// or wss://)
    pub(crate) url: String,

    /// Sub-protocols requested on every connection
    pub(crate) protocols: Vec<String>,

    pub(crate) transport: Arc<dyn Transport>,

    /// Computes the URL of each attempt; defaults to base URL + params query
    pub(crate) url_builder: Option<Arc<dyn UrlBuilder>>,

    /// Resolved on every entry to `auth`
    pub(crate) params: Option<Arc<dyn ParamsProvider>>,

    pub(crate) resolver: Option<Arc<dyn ConnectionResolver>>,

    pub(crate) reconnect_strategy: Arc<dyn ReconnectionStrategy>,

    /// `None` retries forever
    pub(crate) max_retries: Option<u32>,

    pub(crate) connection_timeout: Duration,

    pub(crate) params_timeout: Duration,

    /// Stay in `initial` until `reconnect()` / `open()`
    pub(crate) start_closed: bool,

    pub(crate) lost_connection_timeout: Duration,

    /// Server close codes that end the session in `closed` instead of retrying
    pub(crate) close_codes: Vec<u16>,

    pub(crate) buffer: BufferPolicy,

    pub(crate) heartbeat: Option<HeartbeatConfig>,

    pub(crate) platform: Option<Arc<dyn PlatformNotifier>>,

    pub(crate) ignore_focus_events: bool,

    pub(crate) ignore_network_events: bool,

    /// Trace transitions and buffering at debug level
    pub(crate) debug: bool,
}

impl SessionConfig {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    pub fn has_params(&self) -> bool {
        self.params.is_some()
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    pub fn has_heartbeat(&self) -> bool {
        self.heartbeat.is_some()
    }

    pub fn heartbeat(&self) -> Option<&HeartbeatConfig> {
        self.heartbeat.as_ref()
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    pub fn params_timeout(&self) -> Duration {
        self.params_timeout
    }

    pub fn start_closed(&self) -> bool {
        self.start_closed
    }

    pub fn lost_connection_timeout(&self) -> Duration {
        self.lost_connection_timeout
    }

    pub fn close_codes(&self) -> &[u16] {
        &self.close_codes
    }

    pub fn buffer(&self) -> BufferPolicy {
        self.buffer
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Buffering as written in an options file: `true`/`false` or
/// `{ "max_enqueued_messages": n }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BufferOption {
    Enabled(bool),
    Capped { max_enqueued_messages: usize },
}

impl Default for BufferOption {
    fn default() -> Self {
        BufferOption::Enabled(false)
    }
}

impl From<BufferOption> for BufferPolicy {
    fn from(option: BufferOption) -> Self {
        match option {
            BufferOption::Enabled(false) => BufferPolicy::Disabled,
            BufferOption::Enabled(true) => BufferPolicy::Unbounded,
            BufferOption::Capped {
                max_enqueued_messages,
            } => BufferPolicy::Capped(max_enqueued_messages),
        }
    }
}

/// Plain-data session options, loadable from JSON or any serde format
///
/// Durations are in milliseconds. Every field is optional; missing fields
/// take the documented defaults. Apply with
/// [`ReSocketBuilder::options`](crate::core::builder::ReSocketBuilder::options).
///
/// ```json
/// {
///   "max_retries": 10,
///   "heartbeat_interval_ms": 15000,
///   "max_missed_pings": 2,
///   "buffer": { "max_enqueued_messages": 100 },
///   "close_codes": [4000]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub protocols: Vec<String>,
    /// `None` uses 1s plus up to 4s of random jitter
    pub min_reconnection_delay_ms: Option<u64>,
    pub max_reconnection_delay_ms: u64,
    pub reconnection_delay_grow_factor: f64,
    pub max_retries: Option<u32>,
    pub connection_timeout_ms: u64,
    pub params_timeout_ms: u64,
    pub ping_timeout_ms: u64,
    pub start_closed: bool,
    pub lost_connection_timeout_ms: u64,
    pub close_codes: Vec<u16>,
    pub buffer: BufferOption,
    /// Enables the heartbeat when set
    pub heartbeat_interval_ms: Option<u64>,
    #[serde(alias = "max_missed_pingss")]
    pub max_missed_pings: u32,
    pub ping_message: String,
    pub pong_message: String,
    pub ignore_focus_events: bool,
    pub ignore_network_events: bool,
    pub debug: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            protocols: Vec::new(),
            min_reconnection_delay_ms: None,
            max_reconnection_delay_ms: crate::reconnect::DEFAULT_MAX_RECONNECTION_DELAY
                .as_millis() as u64,
            reconnection_delay_grow_factor: crate::reconnect::DEFAULT_RECONNECTION_DELAY_GROW_FACTOR,
            max_retries: None,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT.as_millis() as u64,
            params_timeout_ms: DEFAULT_PARAMS_TIMEOUT.as_millis() as u64,
            ping_timeout_ms: crate::core::heartbeat::DEFAULT_PING_TIMEOUT.as_millis() as u64,
            start_closed: false,
            lost_connection_timeout_ms: crate::core::lost_connection::DEFAULT_LOST_CONNECTION_TIMEOUT
                .as_millis() as u64,
            close_codes: Vec::new(),
            buffer: BufferOption::default(),
            heartbeat_interval_ms: None,
            max_missed_pings: 0,
            ping_message: crate::core::heartbeat::DEFAULT_PING_MESSAGE.to_string(),
            pong_message: crate::core::heartbeat::DEFAULT_PONG_MESSAGE.to_string(),
            ignore_focus_events: false,
            ignore_network_events: false,
            debug: false,
        }
    }
}

impl SessionOptions {
    /// Parse options from a JSON document
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::error::ReSocketError::Configuration(e.to_string()))
    }
}
