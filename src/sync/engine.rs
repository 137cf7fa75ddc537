//! Acquire, release and condition-wait protocols.
//!
//! [`SyncEngine`] owns the lock word, the wait queue and the metrics for one
//! lock. The [`Mutex`](super::Mutex) facade and every
//! [`Condition`](super::Condition) created from it share the engine by `Arc`.
//!
//! # Protocol
//!
//! Acquire: one CAS on the lock word. On failure the thread pushes itself onto
//! the wait list tail with a lock-free CAS and loops: while its node is first
//! it retries the CAS, otherwise it parks. Any thread calling acquire tries
//! the CAS before queueing, so a fresh caller can barge past parked waiters.
//!
//! Release: CAS the lock word back to free, then, if the waiter count is
//! non-zero, unpark the first waiter. Release never waits for the queue bit;
//! when another thread holds it, that thread performs the wake. The woken
//! thread competes for the lock like anyone else; ownership is never handed
//! over.
//!
//! A waiter that gives up (timeout, interruption) unlinks its node and, if it
//! was first, unparks the next waiter: the release that woke it may otherwise
//! be lost.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::metrics::LockMetrics;
use super::node::{ConditionId, NodeId, NodeStatus};
use super::queue::WaitQueue;
use super::state::LockState;
use super::LockMetricsSnapshot;
use crate::config::LockConfig;
use crate::error::LockError;
use crate::thread::{self, ThreadHandle, ThreadToken};

/// Below this much remaining time a timed waiter spins instead of parking.
const SPIN_FOR_TIMEOUT_THRESHOLD: Duration = Duration::from_micros(1);

/// Whether an interruption aborts a queued acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupts {
    /// The flag is left untouched and stays set for the caller to observe.
    Deferred,
    /// The flag is consumed and the acquire fails.
    Abort,
}

/// How a queued acquire ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Acquired,
    TimedOut,
    Interrupted,
}

/// State shared by a lock and its conditions.
#[derive(Debug)]
pub(crate) struct SyncEngine {
    state: LockState,
    queue: WaitQueue,
    metrics: LockMetrics,
    name: &'static str,
}

impl SyncEngine {
    pub(crate) fn new(config: &LockConfig) -> Self {
        Self {
            state: LockState::new(),
            queue: WaitQueue::new(config.arena_capacity, config.queue_spin_limit),
            metrics: LockMetrics::default(),
            name: config.name,
        }
    }

    /// Blocks until the lock is acquired. Interruptions are deferred.
    pub(crate) fn acquire(&self) {
        let me = thread::current();
        if self.fast_acquire(me.token()) {
            return;
        }
        let outcome = self.acquire_slow(&me, None, Interrupts::Deferred);
        debug_assert_eq!(outcome, Outcome::Acquired);
    }

    /// Blocks until the lock is acquired or the caller is interrupted.
    pub(crate) fn acquire_interruptibly(&self) -> Result<(), LockError> {
        let me = thread::current();
        if me.take_interrupt() {
            return Err(LockError::Interrupted);
        }
        if self.fast_acquire(me.token()) {
            return Ok(());
        }
        match self.acquire_slow(&me, None, Interrupts::Abort) {
            Outcome::Acquired => Ok(()),
            Outcome::Interrupted | Outcome::TimedOut => Err(LockError::Interrupted),
        }
    }

    /// Single CAS; never queues.
    pub(crate) fn try_acquire(&self) -> bool {
        self.fast_acquire(thread::current().token())
    }

    /// Blocks for at most `timeout`. `Ok(false)` once the deadline passes.
    pub(crate) fn try_acquire_timed(&self, timeout: Duration) -> Result<bool, LockError> {
        let me = thread::current();
        if me.take_interrupt() {
            return Err(LockError::Interrupted);
        }
        if self.fast_acquire(me.token()) {
            return Ok(true);
        }
        if timeout.is_zero() {
            return Ok(false);
        }
        // An unrepresentable deadline waits without one.
        let deadline = Instant::now().checked_add(timeout);
        match self.acquire_slow(&me, deadline, Interrupts::Abort) {
            Outcome::Acquired => Ok(true),
            Outcome::TimedOut => Ok(false),
            Outcome::Interrupted => Err(LockError::Interrupted),
        }
    }

    /// Releases the lock held by the calling thread and wakes the first
    /// waiter, if any.
    pub(crate) fn release(&self) -> Result<(), LockError> {
        self.release_for(thread::current().token())
    }

    fn release_for(&self, me: ThreadToken) -> Result<(), LockError> {
        self.state.try_release(me)?;
        // SeqCst load after the SeqCst release CAS: a waiter that is not
        // counted yet will see the lock free on its own CAS.
        if self.queue.queued() > 0 {
            self.wake_first();
        }
        Ok(())
    }

    fn wake_first(&self) {
        match self.queue.wake_first() {
            Some(successor) => trace!(lock = self.name, %successor, "woke first waiter"),
            None => trace!(lock = self.name, "wake left to queue bit holder"),
        }
    }

    #[inline]
    fn fast_acquire(&self, me: ThreadToken) -> bool {
        let acquired = self.state.try_acquire(me);
        if acquired {
            self.metrics.record_acquire();
        }
        acquired
    }

    fn acquire_slow(
        &self,
        me: &ThreadHandle,
        deadline: Option<Instant>,
        interrupts: Interrupts,
    ) -> Outcome {
        let queued_at = Instant::now();
        let arrival = self.queue.enqueue(me.clone());
        let node = self.queue.lock().admit(&arrival);
        trace!(lock = self.name, thread = %me.token(), ?node, "queued for lock");
        let outcome = self.acquire_queued(me, node, deadline, interrupts);
        match outcome {
            Outcome::Acquired => self.metrics.record_contended(queued_at),
            Outcome::TimedOut => self.metrics.record_timeout(),
            Outcome::Interrupted => self.metrics.record_interrupt(),
        }
        outcome
    }

    /// Core loop for a thread whose node is already in the wait list.
    ///
    /// On `Acquired` the node has been removed and the caller owns the lock.
    /// On `TimedOut`/`Interrupted` the node has been cancelled.
    fn acquire_queued(
        &self,
        me: &ThreadHandle,
        node: NodeId,
        deadline: Option<Instant>,
        interrupts: Interrupts,
    ) -> Outcome {
        loop {
            {
                let mut queue = self.queue.lock();
                if queue.is_first(node) && self.state.try_acquire(me.token()) {
                    queue.remove(node);
                    return Outcome::Acquired;
                }
            }

            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.cancel(node);
                        debug!(
                            lock = self.name,
                            thread = %me.token(),
                            "timed out waiting for lock"
                        );
                        return Outcome::TimedOut;
                    }
                    if deadline - now < SPIN_FOR_TIMEOUT_THRESHOLD {
                        std::hint::spin_loop();
                    } else {
                        self.metrics.record_park();
                        thread::park_until(Some(deadline));
                    }
                }
                None => {
                    self.metrics.record_park();
                    thread::park_until(None);
                }
            }

            if interrupts == Interrupts::Abort && me.take_interrupt() {
                self.cancel(node);
                debug!(lock = self.name, thread = %me.token(), "interrupted waiting for lock");
                return Outcome::Interrupted;
            }
        }
    }

    /// Unlinks a waiter that gave up, waking the next one if it was first.
    fn cancel(&self, node: NodeId) {
        let successor = self.queue.lock().cancel(node);
        if let Some(thread) = successor {
            trace!(
                lock = self.name,
                successor = %thread.token(),
                "cancelled head, waking successor"
            );
            thread.unpark();
        }
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.state.is_held()
    }

    pub(crate) fn is_held_by_current_thread(&self) -> bool {
        self.state.is_held_by(thread::current().token())
    }

    pub(crate) fn owner(&self) -> Option<ThreadToken> {
        self.state.owner()
    }

    pub(crate) fn queue_length(&self) -> usize {
        self.queue.queued()
    }

    pub(crate) fn queued_threads(&self) -> Vec<ThreadToken> {
        self.queue.lock().queued_threads()
    }

    pub(crate) fn metrics(&self) -> LockMetricsSnapshot {
        self.metrics.snapshot(self.name)
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    // ── Conditions ──────────────────────────────────────────────────────

    pub(crate) fn create_condition(&self) -> ConditionId {
        self.queue.lock().create_condition()
    }

    pub(crate) fn drop_condition(&self, cond: ConditionId) {
        self.queue.lock().drop_condition(cond);
    }

    fn ensure_held(&self) -> Result<(), LockError> {
        if self.is_held_by_current_thread() {
            Ok(())
        } else {
            Err(LockError::IllegalMonitorState)
        }
    }

    /// Releases the lock, waits on `cond` and re-acquires before returning.
    ///
    /// Returns `Ok(true)` after a signal and `Ok(false)` when `deadline`
    /// passed first. With `interruptible`, an interruption that lands before
    /// a signal yields `Err(Interrupted)`; one that lands after is left set
    /// on the thread. The lock is held again in every non-`IllegalMonitorState`
    /// outcome.
    pub(crate) fn wait_on(
        &self,
        cond: ConditionId,
        interruptible: bool,
        deadline: Option<Instant>,
    ) -> Result<bool, LockError> {
        let me = thread::current();
        if interruptible && me.take_interrupt() {
            return Err(LockError::Interrupted);
        }
        self.ensure_held()?;

        let node = self
            .queue
            .lock()
            .enqueue_condition(cond, me.clone())
            .ok_or(LockError::ForeignCondition)?;
        if let Err(err) = self.release_for(me.token()) {
            self.queue.lock().remove(node);
            return Err(err);
        }
        trace!(lock = self.name, thread = %me.token(), ?node, "waiting on condition");

        let mut timed_out = false;
        let mut interrupted = false;
        loop {
            let status = self.queue.lock().status(node);
            if status.is_none_or(NodeStatus::in_wait_list) {
                break;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        timed_out = self.queue.lock().transfer_cancelled(node);
                        break;
                    }
                    if deadline - now < SPIN_FOR_TIMEOUT_THRESHOLD {
                        std::hint::spin_loop();
                    } else {
                        thread::park_until(Some(deadline));
                    }
                }
                None => thread::park_until(None),
            }
            if interruptible && me.take_interrupt() {
                interrupted = self.queue.lock().transfer_cancelled(node);
                if !interrupted {
                    // A signal got there first.
                    me.reassert_interrupt();
                }
                break;
            }
        }

        if timed_out || interrupted {
            debug!(
                lock = self.name,
                thread = %me.token(),
                timed_out,
                interrupted,
                "condition wait cancelled"
            );
        }

        let outcome = self.acquire_queued(&me, node, None, Interrupts::Deferred);
        debug_assert_eq!(outcome, Outcome::Acquired);
        self.metrics.record_condition_wait();

        if interrupted {
            Err(LockError::Interrupted)
        } else {
            Ok(!timed_out)
        }
    }

    /// Moves the longest waiter on `cond` to the wait list.
    pub(crate) fn signal(&self, cond: ConditionId) -> Result<(), LockError> {
        self.ensure_held()?;
        if self.queue.lock().signal_first(cond) {
            trace!(lock = self.name, ?cond, "signalled condition waiter");
        }
        Ok(())
    }

    /// Moves every waiter on `cond` to the wait list, in order.
    pub(crate) fn signal_all(&self, cond: ConditionId) -> Result<(), LockError> {
        self.ensure_held()?;
        let moved = self.queue.lock().signal_all(cond);
        if moved > 0 {
            trace!(lock = self.name, ?cond, moved, "signalled all condition waiters");
        }
        Ok(())
    }

    pub(crate) fn condition_waiters(&self, cond: ConditionId) -> Result<usize, LockError> {
        self.ensure_held()?;
        self.queue
            .lock()
            .condition_len(cond)
            .ok_or(LockError::ForeignCondition)
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        debug_assert_eq!(self.queue.lock().node_count(), 0, "lock dropped with waiters");
    }
}
