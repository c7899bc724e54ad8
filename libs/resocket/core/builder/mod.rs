pub mod states;

use crate::core::buffer::BufferPolicy;
use crate::core::client::ReSocket;
use crate::core::config::{
    SessionConfig, SessionOptions, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_PARAMS_TIMEOUT,
};
use crate::core::heartbeat::{HeartbeatConfig, DEFAULT_PING_TIMEOUT, DEFAULT_PONG_MESSAGE};
use crate::core::lost_connection::DEFAULT_LOST_CONNECTION_TIMEOUT;
use crate::core::tungstenite::TungsteniteTransport;
use crate::error::{ReSocketError, Result};
use crate::message::WsMessage;
use crate::params::{ParamsProvider, UrlBuilder};
use crate::platform::PlatformNotifier;
use crate::pong_detector::{PongDetector, TextPongDetector};
use crate::reconnect::{
    ExponentialBackoff, ReconnectionStrategy, DEFAULT_MAX_RECONNECTION_DELAY,
    DEFAULT_RECONNECTION_DELAY_GROW_FACTOR,
};
use crate::resolver::ConnectionResolver;
use crate::transport::Transport;
use states::*;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Everything the builder collects, independent of the type state
struct Settings {
    url: Option<String>,
    protocols: Vec<String>,
    transport: Option<Arc<dyn Transport>>,
    url_builder: Option<Arc<dyn UrlBuilder>>,
    params: Option<Arc<dyn ParamsProvider>>,
    resolver: Option<Arc<dyn ConnectionResolver>>,
    min_reconnection_delay: Option<Duration>,
    max_reconnection_delay: Duration,
    reconnection_delay_grow_factor: f64,
    delay_fn: Option<Arc<dyn ReconnectionStrategy>>,
    max_retries: Option<u32>,
    connection_timeout: Duration,
    params_timeout: Duration,
    start_closed: bool,
    lost_connection_timeout: Duration,
    close_codes: Vec<u16>,
    buffer: BufferPolicy,
    heartbeat_interval: Option<Duration>,
    ping_timeout: Duration,
    max_missed_pings: u32,
    ping_message: WsMessage,
    pong_detector: Option<Arc<dyn PongDetector>>,
    platform: Option<Arc<dyn PlatformNotifier>>,
    ignore_focus_events: bool,
    ignore_network_events: bool,
    debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: None,
            protocols: Vec::new(),
            transport: None,
            url_builder: None,
            params: None,
            resolver: None,
            min_reconnection_delay: None,
            max_reconnection_delay: DEFAULT_MAX_RECONNECTION_DELAY,
            reconnection_delay_grow_factor: DEFAULT_RECONNECTION_DELAY_GROW_FACTOR,
            delay_fn: None,
            max_retries: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            params_timeout: DEFAULT_PARAMS_TIMEOUT,
            start_closed: false,
            lost_connection_timeout: DEFAULT_LOST_CONNECTION_TIMEOUT,
            close_codes: Vec::new(),
            buffer: BufferPolicy::Disabled,
            heartbeat_interval: None,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            max_missed_pings: 0,
            ping_message: WsMessage::from(crate::core::heartbeat::DEFAULT_PING_MESSAGE),
            pong_detector: None,
            platform: None,
            ignore_focus_events: false,
            ignore_network_events: false,
            debug: false,
        }
    }
}

/// Type-state builder for [`ReSocket`]
///
/// The base URL must be set before the session can be built; everything else
/// has a default.
pub struct ReSocketBuilder<U: UrlState> {
    _state: PhantomData<U>,
    settings: Settings,
}

impl ReSocketBuilder<NoUrl> {
    pub fn new() -> Self {
        Self {
            _state: PhantomData,
            settings: Settings::default(),
        }
    }

    /// Base URL (ws:// or wss://)
    pub fn url(self, url: impl Into<String>) -> ReSocketBuilder<HasUrl> {
        let mut settings = self.settings;
        settings.url = Some(url.into());
        ReSocketBuilder {
            _state: PhantomData,
            settings,
        }
    }
}

impl Default for ReSocketBuilder<NoUrl> {
    fn default() -> Self {
        Self::new()
    }
}

// Optional configuration methods
impl<U: UrlState> ReSocketBuilder<U> {
    /// Request a sub-protocol (may be called repeatedly)
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.settings.protocols.push(protocol.into());
        self
    }

    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the default tokio-tungstenite transport
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.settings.transport = Some(Arc::new(transport));
        self
    }

    /// Compute the URL of each attempt
    pub fn url_builder(mut self, builder: impl UrlBuilder + 'static) -> Self {
        self.settings.url_builder = Some(Arc::new(builder));
        self
    }

    /// Resolve params before each attempt
    pub fn params(mut self, provider: impl ParamsProvider + 'static) -> Self {
        self.settings.params = Some(Arc::new(provider));
        self
    }

    /// Defer acceptance of opened sockets
    pub fn connection_resolver(mut self, resolver: impl ConnectionResolver) -> Self {
        self.settings.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn min_reconnection_delay(mut self, delay: Duration) -> Self {
        self.settings.min_reconnection_delay = Some(delay);
        self
    }

    pub fn max_reconnection_delay(mut self, delay: Duration) -> Self {
        self.settings.max_reconnection_delay = delay;
        self
    }

    pub fn reconnection_delay_grow_factor(mut self, factor: f64) -> Self {
        self.settings.reconnection_delay_grow_factor = factor;
        self
    }

    /// Replace the exponential formula entirely
    ///
    /// Accepts any [`ReconnectionStrategy`], including `Fn(u32) -> Duration`.
    pub fn delay_fn(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.settings.delay_fn = Some(Arc::new(strategy));
        self
    }

    /// Give up (enter `failed`) after this many consecutive failures
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.settings.max_retries = Some(max_retries);
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connection_timeout = timeout;
        self
    }

    pub fn params_timeout(mut self, timeout: Duration) -> Self {
        self.settings.params_timeout = timeout;
        self
    }

    /// Stay in `initial` until `reconnect()` / `open()`
    pub fn start_closed(mut self, start_closed: bool) -> Self {
        self.settings.start_closed = start_closed;
        self
    }

    pub fn lost_connection_timeout(mut self, timeout: Duration) -> Self {
        self.settings.lost_connection_timeout = timeout;
        self
    }

    /// Server close codes that end the session in `closed`
    pub fn close_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.settings.close_codes = codes.into_iter().collect();
        self
    }

    pub fn buffer(mut self, policy: BufferPolicy) -> Self {
        self.settings.buffer = policy;
        self
    }

    /// Enable the heartbeat with this interval
    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.settings.heartbeat_interval = Some(interval);
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.settings.ping_timeout = timeout;
        self
    }

    /// Consecutive missed replies before reconnecting (0 behaves as 1)
    pub fn max_missed_pings(mut self, max: u32) -> Self {
        self.settings.max_missed_pings = max;
        self
    }

    pub fn ping_message(mut self, message: impl Into<WsMessage>) -> Self {
        self.settings.ping_message = message.into();
        self
    }

    /// Exact text of the heartbeat reply
    pub fn pong_message(mut self, message: impl Into<String>) -> Self {
        self.settings.pong_detector = Some(Arc::new(TextPongDetector::new(message)));
        self
    }

    /// Custom heartbeat reply matching
    pub fn pong_detector(mut self, detector: impl PongDetector + 'static) -> Self {
        self.settings.pong_detector = Some(Arc::new(detector));
        self
    }

    /// Source of focus / online / offline signals
    pub fn platform_notifier<N>(mut self, notifier: Arc<N>) -> Self
    where
        N: PlatformNotifier + 'static,
    {
        self.settings.platform = Some(notifier);
        self
    }

    pub fn ignore_focus_events(mut self, ignore: bool) -> Self {
        self.settings.ignore_focus_events = ignore;
        self
    }

    pub fn ignore_network_events(mut self, ignore: bool) -> Self {
        self.settings.ignore_network_events = ignore;
        self
    }

    /// Trace transitions and buffering at debug level
    pub fn debug(mut self, debug: bool) -> Self {
        self.settings.debug = debug;
        self
    }

    /// Apply plain-data options, overriding earlier plain settings
    pub fn options(mut self, options: SessionOptions) -> Self {
        let s = &mut self.settings;
        if !options.protocols.is_empty() {
            s.protocols = options.protocols;
        }
        if let Some(ms) = options.min_reconnection_delay_ms {
            s.min_reconnection_delay = Some(Duration::from_millis(ms));
        }
        s.max_reconnection_delay = Duration::from_millis(options.max_reconnection_delay_ms);
        s.reconnection_delay_grow_factor = options.reconnection_delay_grow_factor;
        s.max_retries = options.max_retries;
        s.connection_timeout = Duration::from_millis(options.connection_timeout_ms);
        s.params_timeout = Duration::from_millis(options.params_timeout_ms);
        s.ping_timeout = Duration::from_millis(options.ping_timeout_ms);
        s.start_closed = options.start_closed;
        s.lost_connection_timeout = Duration::from_millis(options.lost_connection_timeout_ms);
        s.close_codes = options.close_codes;
        s.buffer = options.buffer.into();
        s.heartbeat_interval = options.heartbeat_interval_ms.map(Duration::from_millis);
        s.max_missed_pings = options.max_missed_pings;
        s.ping_message = WsMessage::Text(options.ping_message);
        s.pong_detector = Some(Arc::new(TextPongDetector::new(options.pong_message)));
        s.ignore_focus_events = options.ignore_focus_events;
        s.ignore_network_events = options.ignore_network_events;
        s.debug = options.debug;
        self
    }
}

impl ReSocketBuilder<HasUrl> {
    /// Validate the settings into a [`SessionConfig`]
    pub fn into_config(self) -> Result<SessionConfig> {
        let s = self.settings;

        let url = s
            .url
            .ok_or_else(|| ReSocketError::Configuration("url is required".into()))?;

        if !s.reconnection_delay_grow_factor.is_finite() || s.reconnection_delay_grow_factor < 1.0
        {
            return Err(ReSocketError::Configuration(format!(
                "reconnection delay grow factor must be >= 1.0, got {}",
                s.reconnection_delay_grow_factor
            )));
        }
        for (name, value) in [
            ("connection timeout", s.connection_timeout),
            ("params timeout", s.params_timeout),
            ("ping timeout", s.ping_timeout),
            ("lost connection timeout", s.lost_connection_timeout),
        ] {
            if value.is_zero() {
                return Err(ReSocketError::Configuration(format!(
                    "{} must be non-zero",
                    name
                )));
            }
        }

        let heartbeat = match s.heartbeat_interval {
            Some(interval) if interval.is_zero() => {
                return Err(ReSocketError::Configuration(
                    "heartbeat interval must be non-zero".into(),
                ))
            }
            Some(interval) => Some(HeartbeatConfig {
                interval,
                ping_timeout: s.ping_timeout,
                max_missed_pings: s.max_missed_pings,
                ping_message: s.ping_message,
                pong_detector: s
                    .pong_detector
                    .unwrap_or_else(|| Arc::new(TextPongDetector::new(DEFAULT_PONG_MESSAGE))),
            }),
            None => None,
        };

        let reconnect_strategy = s.delay_fn.unwrap_or_else(|| {
            Arc::new(ExponentialBackoff::new(
                s.min_reconnection_delay
                    .unwrap_or_else(ExponentialBackoff::jittered_min_delay),
                s.max_reconnection_delay,
                s.reconnection_delay_grow_factor,
            ))
        });

        Ok(SessionConfig {
            url,
            protocols: s.protocols,
            transport: s
                .transport
                .unwrap_or_else(|| Arc::new(TungsteniteTransport::new())),
            url_builder: s.url_builder,
            params: s.params,
            resolver: s.resolver,
            reconnect_strategy,
            max_retries: s.max_retries,
            connection_timeout: s.connection_timeout,
            params_timeout: s.params_timeout,
            start_closed: s.start_closed,
            lost_connection_timeout: s.lost_connection_timeout,
            close_codes: s.close_codes,
            buffer: s.buffer,
            heartbeat,
            platform: s.platform,
            ignore_focus_events: s.ignore_focus_events,
            ignore_network_events: s.ignore_network_events,
            debug: s.debug,
        })
    }

    /// Build the session and start it
    ///
    /// Unless `start_closed` is set, the first connection attempt starts
    /// immediately.
    pub async fn build(self) -> Result<ReSocket> {
        let config = self.into_config()?;
        Ok(ReSocket::spawn(config))
    }
}

impl ReSocket {
    /// Create a new session builder
    pub fn builder() -> ReSocketBuilder<NoUrl> {
        ReSocketBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReSocket::builder()
            .url("ws://localhost:9001")
            .into_config()
            .unwrap();

        assert_eq!(config.url(), "ws://localhost:9001");
        assert!(!config.has_heartbeat());
        assert!(!config.has_params());
        assert_eq!(config.max_retries(), None);
        assert_eq!(config.connection_timeout(), Duration::from_secs(10));
        assert_eq!(config.params_timeout(), Duration::from_secs(10));
        assert_eq!(config.lost_connection_timeout(), Duration::from_secs(5));
        assert_eq!(config.buffer(), BufferPolicy::Disabled);
        assert!(!config.start_closed());
    }

    #[test]
    fn test_heartbeat_settings() {
        let config = ReSocket::builder()
            .url("ws://localhost:9001")
            .heartbeat(Duration::from_secs(15))
            .max_missed_pings(2)
            .ping_message("PING")
            .pong_message("PONG")
            .into_config()
            .unwrap();

        let heartbeat = config.heartbeat().unwrap();
        assert_eq!(heartbeat.interval(), Duration::from_secs(15));
        assert_eq!(heartbeat.max_missed_pings(), 2);
        assert_eq!(heartbeat.ping_message(), WsMessage::from("PING"));
        assert!(heartbeat.is_reply(&WsMessage::from("PONG")));
    }

    #[test]
    fn test_rejects_shrinking_backoff() {
        let result = ReSocket::builder()
            .url("ws://localhost:9001")
            .reconnection_delay_grow_factor(0.5)
            .into_config();
        assert!(matches!(result, Err(ReSocketError::Configuration(_))));
    }

    #[test]
    fn test_rejects_zero_durations() {
        let result = ReSocket::builder()
            .url("ws://localhost:9001")
            .heartbeat(Duration::ZERO)
            .into_config();
        assert!(matches!(result, Err(ReSocketError::Configuration(_))));

        let result = ReSocket::builder()
            .url("ws://localhost:9001")
            .connection_timeout(Duration::ZERO)
            .into_config();
        assert!(matches!(result, Err(ReSocketError::Configuration(_))));
    }

    #[test]
    fn test_options_apply() {
        let options = SessionOptions::from_json(
            r#"{"max_retries": 3, "buffer": {"max_enqueued_messages": 5},
                "heartbeat_interval_ms": 1000, "close_codes": [4000]}"#,
        )
        .unwrap();

        let config = ReSocket::builder()
            .url("ws://localhost:9001")
            .options(options)
            .into_config()
            .unwrap();

        assert_eq!(config.max_retries(), Some(3));
        assert_eq!(config.buffer(), BufferPolicy::Capped(5));
        assert_eq!(config.close_codes(), &[4000]);
        assert_eq!(
            config.heartbeat().map(|h| h.interval()),
            Some(Duration::from_secs(1))
        );
    }
}
