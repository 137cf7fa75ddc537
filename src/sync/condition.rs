//! Condition variables bound to a [`Mutex`](super::Mutex).
//!
//! A [`Condition`] is created by [`Mutex::new_condition`](super::Mutex::new_condition)
//! and may only be used by the thread holding that mutex. Waiting releases
//! the mutex completely and parks the thread on the condition's own list; a
//! signal moves the longest waiter to the mutex's wait list, where it
//! re-acquires like any other queued thread. Every wait returns with the
//! mutex held again.
//!
//! Spurious returns are possible in principle, so callers wait in a loop on
//! their predicate:
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use qlock::Mutex;
//!
//! let mutex = Arc::new(Mutex::new());
//! let ready = Arc::new(AtomicBool::new(false));
//! let cond = Arc::new(mutex.new_condition());
//!
//! let waiter = {
//!     let (mutex, ready, cond) = (mutex.clone(), ready.clone(), cond.clone());
//!     std::thread::spawn(move || {
//!         mutex.lock();
//!         while !ready.load(Ordering::Relaxed) {
//!             cond.wait().unwrap();
//!         }
//!         mutex.unlock().unwrap();
//!     })
//! };
//!
//! mutex.lock();
//! ready.store(true, Ordering::Relaxed);
//! cond.signal().unwrap();
//! mutex.unlock().unwrap();
//! waiter.join().unwrap();
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::engine::SyncEngine;
use super::node::ConditionId;
use crate::error::LockError;

/// Wait/signal queue tied to one mutex.
///
/// Every method fails with [`LockError::IllegalMonitorState`] unless the
/// calling thread holds the mutex the condition was created from.
pub struct Condition {
    engine: Arc<SyncEngine>,
    id: ConditionId,
}

impl Condition {
    pub(crate) fn new(engine: Arc<SyncEngine>) -> Self {
        let id = engine.create_condition();
        Self { engine, id }
    }

    pub(crate) fn is_bound_to(&self, engine: &Arc<SyncEngine>) -> bool {
        Arc::ptr_eq(&self.engine, engine)
    }

    /// Releases the mutex and waits until signalled or interrupted.
    ///
    /// Fails with [`LockError::Interrupted`] if the thread is interrupted on
    /// entry or before a signal arrives; the mutex is re-held in that case
    /// too. An interruption that arrives after the signal is left pending on
    /// the thread and the wait returns `Ok(())`.
    pub fn wait(&self) -> Result<(), LockError> {
        self.engine.wait_on(self.id, true, None).map(drop)
    }

    /// Releases the mutex and waits until signalled. Interruptions do not
    /// end the wait; the flag stays set for the caller.
    pub fn wait_uninterruptibly(&self) -> Result<(), LockError> {
        self.engine.wait_on(self.id, false, None).map(drop)
    }

    /// Waits for at most `timeout`. Returns `Ok(false)` if it elapsed first.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, LockError> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => self.engine.wait_on(self.id, true, None),
        }
    }

    /// Waits until `deadline`. Returns `Ok(false)` if it passed first.
    pub fn wait_until(&self, deadline: Instant) -> Result<bool, LockError> {
        self.engine.wait_on(self.id, true, Some(deadline))
    }

    /// Moves the longest-waiting thread, if any, to the mutex's wait list.
    ///
    /// The thread runs once it re-acquires the mutex, which cannot happen
    /// before the signaller releases it.
    pub fn signal(&self) -> Result<(), LockError> {
        self.engine.signal(self.id)
    }

    /// Moves every waiting thread to the mutex's wait list, oldest first.
    pub fn signal_all(&self) -> Result<(), LockError> {
        self.engine.signal_all(self.id)
    }

    /// True if any thread is waiting on this condition. Advisory.
    pub fn has_waiters(&self) -> Result<bool, LockError> {
        self.wait_queue_length().map(|len| len > 0)
    }

    /// Number of threads waiting on this condition. Advisory.
    pub fn wait_queue_length(&self) -> Result<usize, LockError> {
        self.engine.condition_waiters(self.id)
    }
}

impl Drop for Condition {
    fn drop(&mut self) {
        self.engine.drop_condition(self.id);
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("lock", &self.engine.name())
            .field("id", &self.id)
            .finish()
    }
}
