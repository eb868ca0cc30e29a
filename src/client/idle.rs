//! Idle-mode state and the cross-task cancel handle.

use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::protocol::IdleFlags;

/// Notification hook supplied when entering idle. Called at most once.
pub type IdleCallback = Box<dyn FnOnce(IdleFlags) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStatus {
    /// Normal command dispatch.
    Active,
    /// `idle` was sent; waiting for the server to report a change.
    Waiting,
}

/// Result of [`super::Connection::resume_idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleProgress {
    /// The notification is not complete yet; wait for `readable()` again.
    Pending,
    /// The notification arrived and the callback ran.
    Notified(IdleFlags),
}

/// Ends a blocking idle wait from another task or thread.
///
/// Each call to [`IdleCanceller::cancel`] ends one wait. A cancel issued
/// after the connection entered idle mode is remembered until the wait
/// picks it up; one issued while the connection was active is dropped when
/// it next enters idle mode.
#[derive(Clone, Default)]
pub struct IdleCanceller {
    notify: Arc<Notify>,
}

impl IdleCanceller {
    pub fn cancel(&self) {
        self.notify.notify_one();
    }

    pub(crate) async fn cancelled(&self) {
        self.notify.notified().await
    }

    /// Drop a cancel left over from before this idle period. Returns whether
    /// one was pending.
    pub(crate) fn discard_stale(&self) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.enable()
    }
}

impl fmt::Debug for IdleCanceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleCanceller").finish_non_exhaustive()
    }
}

pub(crate) struct IdleState {
    pub status: IdleStatus,
    pub callback: Option<IdleCallback>,
    /// Flags decoded from `changed:` lines received so far.
    pub accumulated: IdleFlags,
    /// A command issued while waiting, sent once the connection is active.
    pub pending: Option<String>,
    pub canceller: IdleCanceller,
}

impl Default for IdleState {
    fn default() -> Self {
        Self {
            status: IdleStatus::Active,
            callback: None,
            accumulated: IdleFlags::empty(),
            pending: None,
            canceller: IdleCanceller::default(),
        }
    }
}

impl IdleState {
    pub fn is_waiting(&self) -> bool {
        self.status == IdleStatus::Waiting
    }

    pub fn enter(&mut self, callback: IdleCallback) {
        self.status = IdleStatus::Waiting;
        self.callback = Some(callback);
        self.accumulated = IdleFlags::empty();
    }

    /// Leave idle mode, handing back the callback if it has not run.
    pub fn leave(&mut self) -> Option<IdleCallback> {
        self.status = IdleStatus::Active;
        self.accumulated = IdleFlags::empty();
        self.callback.take()
    }
}
