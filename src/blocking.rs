//! Blocking Command Support
//!
//! A blocking command (BLPOP, BRPOPLPUSH, BZPOPMIN, ...) first tries its
//! non-blocking variant. When nothing is available it leaves a change
//! listener on the database and the calling session suspends, without the
//! server lock, until the listener delivers a result or the deadline passes.
//!
//! ## State Machine
//!
//! ```text
//!            ┌──────────── data available ──────────────┐
//!   TRY ─────┤                                          ▼
//!            └── empty ──> WAIT ── change ──> re-TRY ─> SATISFIED
//!                           │  ▲                │
//!                           │  └── still empty ─┘
//!                           └── deadline ──> TIMEOUT (nil)
//! ```
//!
//! The retry runs inside the listener, under the server lock, as part of the
//! command that made the change. Listeners run in registration order and a
//! satisfied listener removes itself, so one pushed element wakes exactly
//! one waiter, the one that has waited longest.
//!
//! Waiting is available in two flavors sharing the same slot: a thread
//! parks on a condition variable, an async task awaits a `Notify`.

use crate::error::CommandResult;
use crate::reply::Reply;
use crate::server::Server;
use crate::storage::ListenerId;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::debug;

/// Where a listener drops the result of a satisfied blocking command.
#[derive(Debug, Default)]
pub struct WaitSlot {
    result: Mutex<Option<CommandResult>>,
    condvar: Condvar,
    notify: Notify,
}

impl WaitSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the result and wakes the waiter, whichever flavor it is.
    pub fn complete(&self, result: CommandResult) {
        *self.result.lock() = Some(result);
        self.condvar.notify_all();
        self.notify.notify_one();
    }

    pub fn is_complete(&self) -> bool {
        self.result.lock().is_some()
    }

    pub fn take(&self) -> Option<CommandResult> {
        self.result.lock().take()
    }

    /// Parks the thread until the slot is filled or the deadline passes.
    /// Returns true if the slot was filled.
    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut result = self.result.lock();
        while result.is_none() {
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut result, deadline).timed_out() {
                        return result.is_some();
                    }
                }
                None => self.condvar.wait(&mut result),
            }
        }
        true
    }

    /// Async counterpart of `wait_until`.
    async fn wait_until_async(&self, deadline: Option<Instant>) -> bool {
        loop {
            if self.is_complete() {
                return true;
            }
            let notified = self.notify.notified();
            match deadline {
                Some(deadline) => {
                    let deadline = tokio::time::Instant::from_std(deadline);
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.is_complete();
                    }
                }
                None => notified.await,
            }
        }
    }
}

/// A blocking command that found nothing and registered a listener.
#[derive(Debug)]
pub struct PendingWait {
    /// Database the listener is registered on
    pub db: usize,
    pub listener: ListenerId,
    pub slot: Arc<WaitSlot>,
    /// None waits forever
    pub deadline: Option<Instant>,
    /// Reply on timeout (nil or nil array depending on the command)
    pub timeout_reply: Reply,
}

/// A session suspended on a `PendingWait`.
///
/// Dropping it before it resolves (a cancelled future, an unwinding
/// thread) deregisters the listener, so no stale waiter can steal an
/// element later.
pub struct BlockedCall<'a> {
    server: &'a Server,
    wait: PendingWait,
    resolved: bool,
}

impl<'a> BlockedCall<'a> {
    pub fn new(server: &'a Server, wait: PendingWait) -> Self {
        Self {
            server,
            wait,
            resolved: false,
        }
    }

    /// Blocks the calling thread until the command completes or times out.
    pub fn wait(mut self) -> CommandResult {
        self.wait.slot.wait_until(self.wait.deadline);
        self.resolve()
    }

    /// Suspends the calling task until the command completes or times out.
    pub async fn wait_async(mut self) -> CommandResult {
        self.wait.slot.wait_until_async(self.wait.deadline).await;
        self.resolve()
    }

    /// Deregisters the listener and settles the outcome. Under the lock no
    /// listener can run concurrently, so a result that arrived between the
    /// timeout and this call is still delivered rather than lost.
    fn resolve(&mut self) -> CommandResult {
        let mut state = self.server.lock();
        state.db(self.wait.db).remove_change_listener(self.wait.listener);
        self.resolved = true;
        match self.wait.slot.take() {
            Some(result) => {
                debug!(listener = self.wait.listener, "Blocking command satisfied");
                result
            }
            None => {
                debug!(listener = self.wait.listener, "Blocking command timed out");
                Ok(self.wait.timeout_reply.clone())
            }
        }
    }
}

impl Drop for BlockedCall<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            let mut state = self.server.lock();
            state.db(self.wait.db).remove_change_listener(self.wait.listener);
            debug!(listener = self.wait.listener, "Blocking command cancelled");
        }
    }
}
