//! Single-slot cancellation of the in-flight asynchronous state
//!
//! Only one asynchronous side-effect (params fetch, handshake, backoff or
//! heartbeat timer) is in flight at a time. Its settlement carries the token
//! id it was issued with; a settlement whose id no longer matches the slot is
//! stale and must not touch session state.

use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingKind {
    Params,
    /// Not abortable: a late socket has to be released, not leaked
    Handshake,
    Backoff,
    HeartbeatInterval,
    PongWait,
}

#[derive(Debug)]
pub(crate) struct CancelToken {
    id: u64,
    kind: PendingKind,
    abort: Option<AbortHandle>,
}

impl CancelToken {
    fn cancel(self) {
        if let Some(abort) = self.abort {
            abort.abort();
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PendingSlot {
    next_id: u64,
    current: Option<CancelToken>,
}

impl PendingSlot {
    /// Reserve a token for a task about to be spawned
    ///
    /// Any previous token is cancelled.
    pub(crate) fn issue(&mut self, kind: PendingKind) -> u64 {
        self.drain();
        self.next_id = self.next_id.wrapping_add(1);
        self.current = Some(CancelToken {
            id: self.next_id,
            kind,
            abort: None,
        });
        self.next_id
    }

    /// Attach the spawned task's abort handle to its token
    ///
    /// If the token was already drained the task is aborted right away.
    pub(crate) fn attach(&mut self, id: u64, abort: AbortHandle) {
        match self.current.as_mut() {
            Some(token) if token.id == id => token.abort = Some(abort),
            _ => abort.abort(),
        }
    }

    /// Cancel whatever is pending, returning its kind
    pub(crate) fn drain(&mut self) -> Option<PendingKind> {
        self.current.take().map(|token| {
            let kind = token.kind;
            token.cancel();
            kind
        })
    }

    /// Claim a settlement
    ///
    /// Returns the kind if `id` is the current token, clearing the slot.
    /// Returns `None` for a stale settlement.
    pub(crate) fn settle(&mut self, id: u64) -> Option<PendingKind> {
        match self.current.as_ref() {
            Some(token) if token.id == id => self.current.take().map(|token| token.kind),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> Option<PendingKind> {
        self.current.as_ref().map(|token| token.kind)
    }
}
