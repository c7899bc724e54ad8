//! Session states and the transition table
//!
//! The engine tracks a fine-grained [`FineState`]; applications usually only
//! care about the coarse [`SessionStatus`] projected from it.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Precise phase of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FineState {
    Initial,
    Auth,
    AuthBackoff,
    Connection,
    ConnectionBackoff,
    Connected,
    Ping,
    PingBackoff,
    Failed,
    Closed,
    /// Terminal
    Stopped,
}

impl FineState {
    pub const ALL: [FineState; 11] = [
        FineState::Initial,
        FineState::Auth,
        FineState::AuthBackoff,
        FineState::Connection,
        FineState::ConnectionBackoff,
        FineState::Connected,
        FineState::Ping,
        FineState::PingBackoff,
        FineState::Failed,
        FineState::Closed,
        FineState::Stopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FineState::Initial => "initial",
            FineState::Auth => "auth",
            FineState::AuthBackoff => "auth_backoff",
            FineState::Connection => "connection",
            FineState::ConnectionBackoff => "connection_backoff",
            FineState::Connected => "connected",
            FineState::Ping => "ping",
            FineState::PingBackoff => "ping_backoff",
            FineState::Failed => "failed",
            FineState::Closed => "closed",
            FineState::Stopped => "stopped",
        }
    }

    /// States that own a live socket
    #[inline]
    pub fn is_connected_family(&self) -> bool {
        matches!(
            self,
            FineState::Connected | FineState::Ping | FineState::PingBackoff
        )
    }

    /// States in which the session is not trying to connect
    #[inline]
    pub fn is_inactive(&self) -> bool {
        matches!(
            self,
            FineState::Initial | FineState::Failed | FineState::Closed | FineState::Stopped
        )
    }
}

impl fmt::Display for FineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible status of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionStatus {
    /// Never connected and not trying to
    Initial = 0,
    /// Trying to connect for the first time
    Connecting = 1,
    Connected = 2,
    /// Trying to connect again after at least one success
    Reconnecting = 3,
    /// Failed or stopped
    Disconnected = 4,
    /// Closed after at least one success
    Closed = 5,
}

impl SessionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionStatus::Initial,
            1 => SessionStatus::Connecting,
            2 => SessionStatus::Connected,
            3 => SessionStatus::Reconnecting,
            4 => SessionStatus::Disconnected,
            _ => SessionStatus::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initial => "initial",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Reconnecting => "reconnecting",
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secondary health signal raised by the lost-connection detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LostConnectionStatus {
    /// Not connected for longer than the lost-connection timeout
    Lost,
    /// Connected again after a `Lost`
    Restored,
    /// The session gave up (failed, closed or stopped)
    Failed,
}

/// Browser-style ready state of the underlying socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

/// Check whether `from -> to` is in the transition table
///
/// `closed`, `failed` and `stopped` are reachable from anywhere, as is
/// `auth` (a forced reconnect). Nothing leaves `stopped`.
pub fn can_transition(from: FineState, to: FineState, heartbeat_enabled: bool) -> bool {
    use FineState::*;

    if from == Stopped {
        return false;
    }

    match to {
        Closed | Failed | Stopped | Auth => true,
        AuthBackoff => matches!(from, Auth | PingBackoff),
        Connection => from == Auth,
        ConnectionBackoff => from == Connection,
        Connected => matches!(from, Connection | Ping),
        Ping => heartbeat_enabled && matches!(from, Connected | PingBackoff),
        PingBackoff => from == Ping,
        Initial => false,
    }
}

/// Project a fine state onto the public status
///
/// # Arguments
/// * `state` - Current fine state
/// * `has_succeeded` - Whether any connection has ever been established
/// * `socket_attached` - Whether a live socket is attached
pub fn project_status(
    state: FineState,
    has_succeeded: bool,
    socket_attached: bool,
) -> SessionStatus {
    let connecting = if has_succeeded {
        SessionStatus::Reconnecting
    } else {
        SessionStatus::Connecting
    };

    match state {
        FineState::Auth | FineState::AuthBackoff | FineState::ConnectionBackoff => connecting,
        FineState::Connection if socket_attached => SessionStatus::Connected,
        FineState::Connection => connecting,
        FineState::Connected | FineState::Ping | FineState::PingBackoff => {
            SessionStatus::Connected
        }
        FineState::Stopped | FineState::Failed => SessionStatus::Disconnected,
        FineState::Initial | FineState::Closed if has_succeeded => SessionStatus::Closed,
        FineState::Initial | FineState::Closed => SessionStatus::Initial,
    }
}

/// Lock-free session status cell
///
/// Written by the engine task, read by any handle without locking.
#[derive(Debug)]
pub struct AtomicSessionStatus {
    inner: AtomicU8,
}

impl AtomicSessionStatus {
    pub fn new(status: SessionStatus) -> Self {
        Self {
            inner: AtomicU8::new(status as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> SessionStatus {
        SessionStatus::from_u8(self.inner.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, status: SessionStatus) {
        self.inner.store(status as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get() == SessionStatus::Connected
    }
}

impl Default for AtomicSessionStatus {
    fn default() -> Self {
        Self::new(SessionStatus::Initial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FineState::*;

    #[test]
    fn test_nothing_leaves_stopped() {
        for to in FineState::ALL {
            assert!(!can_transition(Stopped, to, true), "stopped -> {}", to);
        }
    }

    #[test]
    fn test_initial_is_never_a_target() {
        for from in FineState::ALL {
            assert!(!can_transition(from, Initial, true));
        }
    }

    #[test]
    fn test_terminal_targets_reachable_from_anywhere() {
        for from in FineState::ALL.into_iter().filter(|s| *s != Stopped) {
            for to in [Closed, Failed, Stopped, Auth] {
                assert!(can_transition(from, to, false), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_happy_path_edges() {
        assert!(can_transition(Auth, Connection, false));
        assert!(can_transition(Auth, AuthBackoff, false));
        assert!(can_transition(Connection, Connected, false));
        assert!(can_transition(Connection, ConnectionBackoff, false));
        assert!(can_transition(Ping, Connected, true));
        assert!(can_transition(Ping, PingBackoff, true));
        assert!(can_transition(PingBackoff, AuthBackoff, true));
    }

    #[test]
    fn test_rejected_edges() {
        assert!(!can_transition(Initial, Connection, true));
        assert!(!can_transition(Connection, Ping, true));
        assert!(!can_transition(Connected, Connection, true));
        assert!(!can_transition(AuthBackoff, Connection, true));
        assert!(!can_transition(Connected, PingBackoff, true));
        assert!(!can_transition(Closed, Connected, true));
    }

    #[test]
    fn test_ping_requires_heartbeat() {
        assert!(can_transition(Connected, Ping, true));
        assert!(can_transition(PingBackoff, Ping, true));
        assert!(!can_transition(Connected, Ping, false));
        assert!(!can_transition(PingBackoff, Ping, false));
    }

    #[test]
    fn test_projection_before_first_success() {
        assert_eq!(project_status(Initial, false, false), SessionStatus::Initial);
        assert_eq!(project_status(Auth, false, false), SessionStatus::Connecting);
        assert_eq!(project_status(AuthBackoff, false, false), SessionStatus::Connecting);
        assert_eq!(project_status(Connection, false, false), SessionStatus::Connecting);
        assert_eq!(project_status(Closed, false, false), SessionStatus::Initial);
        assert_eq!(project_status(Failed, false, false), SessionStatus::Disconnected);
    }

    #[test]
    fn test_projection_after_success() {
        assert_eq!(project_status(Auth, true, false), SessionStatus::Reconnecting);
        assert_eq!(
            project_status(ConnectionBackoff, true, false),
            SessionStatus::Reconnecting
        );
        assert_eq!(project_status(Connection, true, true), SessionStatus::Connected);
        assert_eq!(project_status(Connected, true, true), SessionStatus::Connected);
        assert_eq!(project_status(PingBackoff, true, true), SessionStatus::Connected);
        assert_eq!(project_status(Closed, true, false), SessionStatus::Closed);
        assert_eq!(project_status(Initial, true, false), SessionStatus::Closed);
        assert_eq!(project_status(Stopped, true, false), SessionStatus::Disconnected);
    }

    #[test]
    fn test_atomic_status_roundtrip() {
        let status = AtomicSessionStatus::default();
        assert_eq!(status.get(), SessionStatus::Initial);
        status.set(SessionStatus::Reconnecting);
        assert_eq!(status.get(), SessionStatus::Reconnecting);
        status.set(SessionStatus::Connected);
        assert!(status.is_connected());
    }

    #[test]
    fn test_display_is_snake_case() {
        assert_eq!(ConnectionBackoff.to_string(), "connection_backoff");
        assert_eq!(SessionStatus::Reconnecting.to_string(), "reconnecting");
    }
}
