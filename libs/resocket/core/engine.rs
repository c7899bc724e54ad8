//! Transition engine
//!
//! One task owns the session. Commands, task settlements, socket events and
//! platform signals all arrive on a single inbox and are handled one at a
//! time, so a transition always runs to completion before the next event is
//! looked at.
//!
//! ```text
//!  ReSocket handle ──Command──┐
//!  spawned tasks ───Settled───┤
//!  socket forwarder ─Socket───┼──> inbox ──> Engine ──> EventNotifier<SocketEvent>
//!  platform hooks ──Platform──┘                    └──> EventNotifier<StateChange>
//! ```
//!
//! Each transition:
//! 1. validates `from -> to` against the table
//! 2. cleans up the state being left (closes the socket unless staying in
//!    the connected family)
//! 3. drains the pending cancellation token
//! 4. assigns the new state and announces it
//! 5. runs the side-effect of the new state
//! 6. republishes the coarse status if it changed

use crate::core::buffer::{OutboundQueue, SendOutcome};
use crate::core::cancel::{PendingKind, PendingSlot};
use crate::core::client::{LiveInfo, SharedSession};
use crate::core::config::SessionConfig;
use crate::core::establisher::{establish, Established};
use crate::core::events::{CloseInfo, DisconnectReason, SocketEvent, StateChange};
use crate::core::heartbeat::{MissedPings, PingVerdict};
use crate::core::notifier::EventNotifier;
use crate::core::state::{can_transition, project_status, FineState, SessionStatus};
use crate::error::{ReSocketError, Result};
use crate::message::WsMessage;
use crate::params::{default_url, Params, RetryInfo, UrlInfo};
use crate::platform::{PlatformSignal, SubscriptionId};
use crate::transport::{OpenRequest, RawEvent, SocketSender, CLOSE_ABNORMAL, CLOSE_NORMAL};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Request from a [`ReSocket`](crate::ReSocket) handle
#[derive(Debug)]
pub(crate) enum Command {
    Reconnect(oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<Result<()>>),
    Stop(Option<oneshot::Sender<Result<()>>>),
    Send(WsMessage, oneshot::Sender<Result<SendOutcome>>),
}

/// Result of an asynchronous side-effect
#[derive(Debug)]
pub(crate) enum Settlement {
    Params(Result<Params>),
    Handshake(Result<Established>),
    TimerElapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SocketId(u64);

#[derive(Debug)]
pub(crate) enum Inbox {
    Command(Command),
    Settled { token: u64, settlement: Settlement },
    Socket { socket: SocketId, event: RawEvent },
    Platform(PlatformSignal),
}

#[derive(Debug)]
pub(crate) enum ConnectedVia {
    /// A fresh socket from the connection state
    Handshake(Established),
    /// The heartbeat reply arrived
    Heartbeat,
}

/// Transition request, carrying what the target state needs
#[derive(Debug)]
pub(crate) enum Transition {
    Auth,
    AuthBackoff(ReSocketError),
    Connection(Option<Params>),
    ConnectionBackoff(ReSocketError),
    Connected(ConnectedVia),
    Ping,
    PingBackoff,
    Failed(ReSocketError),
    Closed(Option<CloseInfo>),
    Stopped,
}

impl Transition {
    pub(crate) fn target(&self) -> FineState {
        match self {
            Transition::Auth => FineState::Auth,
            Transition::AuthBackoff(_) => FineState::AuthBackoff,
            Transition::Connection(_) => FineState::Connection,
            Transition::ConnectionBackoff(_) => FineState::ConnectionBackoff,
            Transition::Connected(_) => FineState::Connected,
            Transition::Ping => FineState::Ping,
            Transition::PingBackoff => FineState::PingBackoff,
            Transition::Failed(_) => FineState::Failed,
            Transition::Closed(_) => FineState::Closed,
            Transition::Stopped => FineState::Stopped,
        }
    }
}

/// The socket owned while in the connected family
struct LiveSocket {
    id: SocketId,
    sender: SocketSender,
    forwarder: AbortHandle,
}

impl LiveSocket {
    fn close(self, code: u16, reason: &str) {
        let _ = self.sender.close(code, reason);
        self.forwarder.abort();
    }
}

pub(crate) struct Engine {
    config: Arc<SessionConfig>,
    shared: Arc<SharedSession>,
    events: Arc<EventNotifier<SocketEvent>>,
    transitions: Arc<EventNotifier<StateChange>>,
    inbox: mpsc::UnboundedSender<Inbox>,
    status_tx: mpsc::UnboundedSender<SessionStatus>,
    state: FineState,
    status: SessionStatus,
    live: Option<LiveSocket>,
    next_socket_id: u64,
    success_count: u64,
    auth_retries: u32,
    connection_retries: u32,
    missed: MissedPings,
    pending: PendingSlot,
    queue: OutboundQueue,
    platform_subscription: Option<SubscriptionId>,
}

impl Engine {
    pub(crate) fn new(
        config: Arc<SessionConfig>,
        shared: Arc<SharedSession>,
        events: Arc<EventNotifier<SocketEvent>>,
        transitions: Arc<EventNotifier<StateChange>>,
        inbox: mpsc::UnboundedSender<Inbox>,
        status_tx: mpsc::UnboundedSender<SessionStatus>,
    ) -> Self {
        let missed = MissedPings::new(
            config
                .heartbeat
                .as_ref()
                .map_or(0, |heartbeat| heartbeat.max_missed_pings),
        );
        let queue = OutboundQueue::new(config.buffer);

        Self {
            config,
            shared,
            events,
            transitions,
            inbox,
            status_tx,
            state: FineState::Initial,
            status: SessionStatus::Initial,
            live: None,
            next_socket_id: 0,
            success_count: 0,
            auth_retries: 0,
            connection_retries: 0,
            missed,
            pending: PendingSlot::default(),
            queue,
            platform_subscription: None,
        }
    }

    /// Engine main loop, exits on entering `stopped`
    pub(crate) async fn run(mut self, mut inbox_rx: mpsc::UnboundedReceiver<Inbox>) {
        self.attach_platform();

        if !self.config.start_closed {
            if let Err(e) = self.transition(Transition::Auth) {
                warn!("Initial connect rejected: {}", e);
            }
        }

        while let Some(message) = inbox_rx.recv().await {
            match message {
                Inbox::Command(command) => self.on_command(command),
                Inbox::Settled { token, settlement } => self.on_settled(token, settlement),
                Inbox::Socket { socket, event } => self.on_socket_event(socket, event),
                Inbox::Platform(signal) => self.on_platform_signal(signal),
            }

            if self.state == FineState::Stopped {
                break;
            }
        }

        self.pending.drain();
        if let Some(live) = self.live.take() {
            live.close(CLOSE_NORMAL, "session stopped");
        }
        self.detach_platform();
        info!("Session task exiting");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Reconnect(reply) => {
                let _ = reply.send(self.transition(Transition::Auth));
            }
            Command::Close(reply) => {
                let _ = reply.send(self.transition(Transition::Closed(None)));
            }
            Command::Stop(reply) => {
                let result = self.transition(Transition::Stopped);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Command::Send(message, reply) => {
                let _ = reply.send(self.send(message));
            }
        }
    }

    fn on_settled(&mut self, token: u64, settlement: Settlement) {
        let Some(kind) = self.pending.settle(token) else {
            self.release_stale(settlement);
            return;
        };

        let next = match settlement {
            Settlement::Params(Ok(params)) => Transition::Connection(Some(params)),
            Settlement::Params(Err(e)) if e.is_stop_retry() => Transition::Failed(e),
            Settlement::Params(Err(e)) => Transition::AuthBackoff(e),
            Settlement::Handshake(Ok(established)) => {
                Transition::Connected(ConnectedVia::Handshake(established))
            }
            // Closed by the server before acceptance with a terminal code
            Settlement::Handshake(Err(ReSocketError::ConnectionClosed { code, reason }))
                if self.config.close_codes.contains(&code) =>
            {
                let info = CloseInfo::new(code, reason);
                info!("Socket closed ({}) before acceptance: {}", info.code, info.reason);
                self.events.publish(SocketEvent::Close(info.clone()));
                Transition::Closed(Some(info))
            }
            Settlement::Handshake(Err(e)) if e.is_stop_retry() => Transition::Failed(e),
            Settlement::Handshake(Err(e)) => Transition::ConnectionBackoff(e),
            Settlement::TimerElapsed => match kind {
                PendingKind::Backoff => Transition::Auth,
                PendingKind::HeartbeatInterval => Transition::Ping,
                PendingKind::PongWait => Transition::PingBackoff,
                PendingKind::Params | PendingKind::Handshake => {
                    warn!("Timer settled a {:?} token", kind);
                    return;
                }
            },
        };

        if let Err(e) = self.transition(next) {
            warn!("Settlement of {:?} rejected: {}", kind, e);
        }
    }

    fn release_stale(&self, settlement: Settlement) {
        if let Settlement::Handshake(Ok(established)) = settlement {
            if self.config.debug {
                debug!(
                    "[stale] closing socket to {} from an abandoned handshake",
                    established.socket.url()
                );
            }
            established.socket.close(CLOSE_NORMAL, "stale connection");
        }
    }

    fn on_socket_event(&mut self, socket: SocketId, event: RawEvent) {
        if self.live.as_ref().map(|live| live.id) != Some(socket) {
            if self.config.debug {
                debug!("[stale] ignoring {:?} from a released socket", event);
            }
            return;
        }

        match event {
            RawEvent::Message(message) => {
                let is_reply = self.state == FineState::Ping
                    && self
                        .config
                        .heartbeat
                        .as_ref()
                        .map_or(false, |heartbeat| heartbeat.is_reply(&message));

                self.events.publish(SocketEvent::Message(message));

                if is_reply {
                    if let Err(e) = self.transition(Transition::Connected(ConnectedVia::Heartbeat)) {
                        warn!("Heartbeat reply rejected: {}", e);
                    }
                }
            }
            RawEvent::Error(error) => {
                warn!("Socket error: {}", error);
                self.events.publish(SocketEvent::Error(error));
            }
            RawEvent::Close { code, reason } => {
                let info = CloseInfo::new(code, reason);
                info!("Socket closed ({}): {}", info.code, info.reason);
                self.events.publish(SocketEvent::Close(info.clone()));

                // Already closed by the peer, nothing to send
                self.live = None;
                *self.shared.live.write() = None;

                let next = if self.config.close_codes.contains(&code) {
                    Some(Transition::Closed(Some(info)))
                } else if self.state.is_connected_family() {
                    Some(Transition::Auth)
                } else {
                    None
                };

                if let Some(next) = next {
                    if let Err(e) = self.transition(next) {
                        warn!("Close handling rejected: {}", e);
                    }
                } else {
                    self.refresh_status();
                }
            }
        }
    }

    fn on_platform_signal(&mut self, signal: PlatformSignal) {
        if can_transition(self.state, FineState::Ping, self.config.has_heartbeat()) {
            debug!("{:?} signal, probing connection", signal);
            if let Err(e) = self.transition(Transition::Ping) {
                warn!("Ping on {:?} rejected: {}", signal, e);
            }
        } else {
            debug!("{:?} signal ignored in {}", signal, self.state);
        }
    }

    /// Apply a transition and every follow-up it produces
    ///
    /// Only the error of the requested transition is returned; a rejected
    /// follow-up is logged.
    pub(crate) fn transition(&mut self, transition: Transition) -> Result<()> {
        let mut next = self.apply(transition)?;
        while let Some(follow_up) = next {
            next = match self.apply(follow_up) {
                Ok(next) => next,
                Err(e) => {
                    warn!("Follow-up transition rejected: {}", e);
                    None
                }
            };
        }
        Ok(())
    }

    fn apply(&mut self, transition: Transition) -> Result<Option<Transition>> {
        let from = self.state;
        let to = transition.target();

        if from == FineState::Stopped {
            return Err(ReSocketError::Stopped);
        }
        if !can_transition(from, to, self.config.has_heartbeat()) {
            return Err(ReSocketError::InvalidTransition { from, to });
        }

        self.leave(from, to);
        self.pending.drain();

        self.state = to;
        *self.shared.state.write() = to;
        if self.config.debug {
            debug!("[transition] {} -> {}", from, to);
        }
        self.transitions.publish(StateChange { from, to });

        let follow_up = self.enter(transition);
        self.refresh_status();
        Ok(follow_up)
    }

    fn leave(&mut self, from: FineState, to: FineState) {
        if !to.is_connected_family() {
            if let Some(live) = self.live.take() {
                *self.shared.live.write() = None;
                live.close(CLOSE_NORMAL, "normal closure");
            }
            if from.is_connected_family() {
                self.missed.reset();
            }
        }

        if matches!(from, FineState::Failed | FineState::Closed) && to != FineState::Stopped {
            self.attach_platform();
        }
    }

    fn enter(&mut self, transition: Transition) -> Option<Transition> {
        match transition {
            Transition::Auth => self.enter_auth(),
            Transition::AuthBackoff(error) => {
                self.auth_retries = self.auth_retries.saturating_add(1);
                self.missed.reset();
                self.enter_backoff(error)
            }
            Transition::Connection(params) => self.enter_connection(params),
            Transition::ConnectionBackoff(error) => {
                self.connection_retries = self.connection_retries.saturating_add(1);
                self.enter_backoff(error)
            }
            Transition::Connected(via) => self.enter_connected(via),
            Transition::Ping => self.enter_ping(),
            Transition::PingBackoff => match self.missed.record_miss() {
                PingVerdict::Retry => {
                    debug!("Missed pong ({} so far), probing again", self.missed.count());
                    Some(Transition::Ping)
                }
                PingVerdict::Escalate => {
                    warn!("Missed {} pongs, reconnecting", self.missed.count());
                    Some(Transition::AuthBackoff(ReSocketError::timeout(
                        "no pong received",
                    )))
                }
            },
            Transition::Failed(error) => {
                self.detach_platform();
                warn!("Session failed: {}", error);
                self.events
                    .publish(SocketEvent::Disconnect(DisconnectReason::Failed(error)));
                None
            }
            Transition::Closed(info) => {
                self.detach_platform();
                info!("Session closed");
                self.events
                    .publish(SocketEvent::Disconnect(DisconnectReason::Closed(info)));
                None
            }
            Transition::Stopped => {
                self.detach_platform();
                self.shared.stopped.store(true, Ordering::Release);
                info!("Session stopped");
                self.events
                    .publish(SocketEvent::Disconnect(DisconnectReason::Stopped));
                None
            }
        }
    }

    fn enter_auth(&mut self) -> Option<Transition> {
        let Some(provider) = self.config.params.clone() else {
            return Some(Transition::Connection(None));
        };

        let info = self.retry_info();
        let timeout = self.config.params_timeout;
        let inbox = self.inbox.clone();
        let token = self.pending.issue(PendingKind::Params);

        let handle = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, provider.params(info)).await {
                Ok(result) => result,
                Err(_) => Err(ReSocketError::timeout("params timeout")),
            };
            let _ = inbox.send(Inbox::Settled {
                token,
                settlement: Settlement::Params(result),
            });
        });
        self.pending.attach(token, handle.abort_handle());
        None
    }

    fn enter_backoff(&mut self, error: ReSocketError) -> Option<Transition> {
        self.sync_retry_count();

        if error.is_stop_retry() {
            return Some(Transition::Failed(error));
        }

        let retries = self.total_retries();
        if let Some(max_retries) = self.config.max_retries {
            if retries >= max_retries {
                warn!("Max retry attempts reached ({})", max_retries);
                return Some(Transition::Failed(ReSocketError::stop_retry(
                    "max retry attempt reached",
                )));
            }
        }

        let delay = self.config.reconnect_strategy.next_delay(retries);
        info!("Retrying in {:?} (attempt {}): {}", delay, retries, error);
        self.start_timer(PendingKind::Backoff, delay);
        None
    }

    fn enter_connection(&mut self, params: Option<Params>) -> Option<Transition> {
        let info = UrlInfo {
            retry_info: self.retry_info(),
            url: self.config.url.clone(),
            params,
        };
        let url = match &self.config.url_builder {
            Some(builder) => builder.build_url(info),
            None => default_url(&info.url, info.params.as_ref()),
        };

        debug!("Connecting to {}", url);

        let request = OpenRequest {
            url,
            protocols: self.config.protocols.clone(),
        };
        let transport = Arc::clone(&self.config.transport);
        let resolver = self.config.resolver.clone();
        let timeout = self.config.connection_timeout;
        let inbox = self.inbox.clone();

        // Not abortable; a late socket comes back through release_stale
        let token = self.pending.issue(PendingKind::Handshake);
        tokio::spawn(async move {
            let result = establish(transport, resolver, request, timeout).await;
            if let Err(mpsc::error::SendError(Inbox::Settled {
                settlement: Settlement::Handshake(Ok(established)),
                ..
            })) = inbox.send(Inbox::Settled {
                token,
                settlement: Settlement::Handshake(result),
            }) {
                established.socket.close(CLOSE_NORMAL, "session stopped");
            }
        });
        None
    }

    fn enter_connected(&mut self, via: ConnectedVia) -> Option<Transition> {
        match via {
            ConnectedVia::Handshake(Established { socket, held }) => {
                self.auth_retries = 0;
                self.connection_retries = 0;
                self.sync_retry_count();
                self.success_count += 1;

                let (sender, events, url, protocol) = socket.into_parts();
                self.next_socket_id += 1;
                let id = SocketId(self.next_socket_id);
                let forwarder = tokio::spawn(forward_socket_events(id, events, self.inbox.clone()));

                info!("Connected to {}", url);
                *self.shared.live.write() = Some(LiveInfo {
                    url: url.clone(),
                    protocol: protocol.clone(),
                });
                self.live = Some(LiveSocket {
                    id,
                    sender,
                    forwarder: forwarder.abort_handle(),
                });

                self.events.publish(SocketEvent::Open { url, protocol });
                self.flush_queue();
                for message in held {
                    self.events.publish(SocketEvent::Message(message));
                }
            }
            ConnectedVia::Heartbeat => {
                self.missed.reset();
            }
        }

        if let Some(interval) = self.config.heartbeat.as_ref().map(|h| h.interval) {
            self.start_timer(PendingKind::HeartbeatInterval, interval);
        }
        None
    }

    fn enter_ping(&mut self) -> Option<Transition> {
        let (ping, ping_timeout) = match self.config.heartbeat.as_ref() {
            Some(heartbeat) => (heartbeat.ping_message(), heartbeat.ping_timeout),
            None => return None,
        };

        let sent = self
            .live
            .as_ref()
            .map_or(false, |live| live.sender.try_send(ping).is_ok());
        if !sent {
            debug!("Could not send ping");
            return Some(Transition::PingBackoff);
        }

        self.mark_sent();
        self.start_timer(PendingKind::PongWait, ping_timeout);
        None
    }

    fn send(&mut self, message: WsMessage) -> Result<SendOutcome> {
        if self.state == FineState::Stopped {
            return Err(ReSocketError::Stopped);
        }

        let message = match self.live.as_ref() {
            Some(live) => match live.sender.try_send(message) {
                Ok(()) => {
                    self.mark_sent();
                    return Ok(SendOutcome::Sent);
                }
                Err(message) => message,
            },
            None => message,
        };

        let outcome = self.queue.offer(message);
        if self.config.debug {
            debug!(
                "[buffering] {:?}, {} queued ({} bytes)",
                outcome,
                self.queue.len(),
                self.queue.buffered_bytes()
            );
        }
        self.sync_buffered();
        Ok(outcome)
    }

    /// Replay buffered messages on the fresh socket, oldest first
    fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let Some(live) = self.live.as_ref() else {
            return;
        };

        let mut flushed = 0usize;
        let mut queued = self.queue.drain().into_iter();
        while let Some(message) = queued.next() {
            if let Err(message) = live.sender.try_send(message) {
                // Socket already gone; keep the rest for the next connection
                self.queue.offer(message);
                for rest in queued.by_ref() {
                    self.queue.offer(rest);
                }
                break;
            }
            flushed += 1;
        }

        if self.config.debug {
            debug!("[buffering] flushed {} queued messages", flushed);
        }
        if flushed > 0 {
            self.mark_sent();
        }
        self.sync_buffered();
    }

    fn start_timer(&mut self, kind: PendingKind, delay: Duration) {
        let inbox = self.inbox.clone();
        let token = self.pending.issue(kind);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(Inbox::Settled {
                token,
                settlement: Settlement::TimerElapsed,
            });
        });
        self.pending.attach(token, handle.abort_handle());
    }

    fn refresh_status(&mut self) {
        let status = project_status(self.state, self.success_count > 0, self.live.is_some());
        if status == self.status {
            return;
        }

        debug!("Status {} -> {}", self.status, status);
        self.status = status;
        self.shared.status.set(status);
        self.events.publish(SocketEvent::StatusChange(status));
        let _ = self.status_tx.send(status);
    }

    fn attach_platform(&mut self) {
        if self.platform_subscription.is_some() {
            return;
        }
        let Some(notifier) = self.config.platform.clone() else {
            return;
        };

        let inbox = self.inbox.clone();
        let ignore_focus = self.config.ignore_focus_events;
        let ignore_network = self.config.ignore_network_events;

        let id = notifier.subscribe(Arc::new(move |signal: PlatformSignal| {
            let ignored = if signal.is_network() {
                ignore_network
            } else {
                ignore_focus
            };
            if !ignored {
                let _ = inbox.send(Inbox::Platform(signal));
            }
        }));
        self.platform_subscription = Some(id);
    }

    fn detach_platform(&mut self) {
        if let (Some(id), Some(notifier)) =
            (self.platform_subscription.take(), self.config.platform.as_ref())
        {
            notifier.unsubscribe(id);
        }
    }

    fn retry_info(&self) -> RetryInfo {
        RetryInfo {
            retry_count: self.total_retries(),
            params_retry_count: self.auth_retries,
            connection_retry_count: self.connection_retries,
        }
    }

    #[inline]
    fn total_retries(&self) -> u32 {
        self.auth_retries.saturating_add(self.connection_retries)
    }

    fn sync_retry_count(&self) {
        self.shared
            .retry_count
            .store(self.total_retries(), Ordering::Release);
    }

    fn sync_buffered(&self) {
        self.shared
            .buffered_amount
            .store(self.queue.buffered_bytes(), Ordering::Release);
    }

    fn mark_sent(&self) {
        *self.shared.last_message_sent.lock() = Some(std::time::Instant::now());
    }
}

/// Relay one socket's events into the inbox, tagged with its id
///
/// Synthesizes an abnormal close if the stream ends without one.
async fn forward_socket_events(
    id: SocketId,
    mut events: mpsc::UnboundedReceiver<RawEvent>,
    inbox: mpsc::UnboundedSender<Inbox>,
) {
    while let Some(event) = events.recv().await {
        let closing = matches!(event, RawEvent::Close { .. });
        if inbox.send(Inbox::Socket { socket: id, event }).is_err() || closing {
            return;
        }
    }

    let _ = inbox.send(Inbox::Socket {
        socket: id,
        event: RawEvent::Close {
            code: CLOSE_ABNORMAL,
            reason: "connection lost".into(),
        },
    });
}
