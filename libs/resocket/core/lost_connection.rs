//! Lost-connection detector
//!
//! Watches the coarse status stream and raises a slower, UI-friendly
//! `lost / restored / failed` signal. Short blips (a reconnect that succeeds
//! within the timeout) never surface as `lost`.

use crate::core::events::SocketEvent;
use crate::core::notifier::EventNotifier;
use crate::core::state::{LostConnectionStatus, SessionStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_LOST_CONNECTION_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Keep,
    Start,
    Cancel,
}

/// Reaction to one status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaction {
    pub timer: TimerAction,
    pub announce: Option<LostConnectionStatus>,
}

impl Reaction {
    const NONE: Reaction = Reaction {
        timer: TimerAction::Keep,
        announce: None,
    };
}

/// Pure detector state, driven by [`run_detector`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LostConnectionState {
    timer_running: bool,
    has_fired: bool,
}

impl LostConnectionState {
    pub fn on_status(&mut self, status: SessionStatus) -> Reaction {
        match status {
            SessionStatus::Connecting | SessionStatus::Reconnecting => {
                if self.timer_running || self.has_fired {
                    return Reaction::NONE;
                }
                self.timer_running = true;
                Reaction {
                    timer: TimerAction::Start,
                    announce: None,
                }
            }
            SessionStatus::Connected => {
                self.timer_running = false;
                let restored = std::mem::take(&mut self.has_fired);
                Reaction {
                    timer: TimerAction::Cancel,
                    announce: restored.then_some(LostConnectionStatus::Restored),
                }
            }
            SessionStatus::Disconnected | SessionStatus::Closed => {
                self.timer_running = false;
                self.has_fired = false;
                Reaction {
                    timer: TimerAction::Cancel,
                    announce: Some(LostConnectionStatus::Failed),
                }
            }
            SessionStatus::Initial => Reaction::NONE,
        }
    }

    pub fn on_timer_elapsed(&mut self) -> Option<LostConnectionStatus> {
        if !self.timer_running {
            return None;
        }
        self.timer_running = false;
        self.has_fired = true;
        Some(LostConnectionStatus::Lost)
    }

    pub fn has_fired(&self) -> bool {
        self.has_fired
    }

    pub fn timer_running(&self) -> bool {
        self.timer_running
    }
}

/// Detector task, fed with every coarse status change
///
/// Exits when the status sender is dropped.
pub(crate) async fn run_detector(
    timeout: Duration,
    mut status_rx: mpsc::UnboundedReceiver<SessionStatus>,
    events: Arc<EventNotifier<SocketEvent>>,
) {
    let mut state = LostConnectionState::default();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            status = status_rx.recv() => {
                let Some(status) = status else { break };
                let reaction = state.on_status(status);
                match reaction.timer {
                    TimerAction::Start => deadline = Some(Instant::now() + timeout),
                    TimerAction::Cancel => deadline = None,
                    TimerAction::Keep => {}
                }
                if let Some(announce) = reaction.announce {
                    debug!("Lost-connection signal: {:?}", announce);
                    events.publish(SocketEvent::LostConnection(announce));
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                if let Some(announce) = state.on_timer_elapsed() {
                    debug!("No connection for {:?}, signalling lost", timeout);
                    events.publish(SocketEvent::LostConnection(announce));
                }
            }
        }
    }

    debug!("Lost-connection detector exiting");
}
