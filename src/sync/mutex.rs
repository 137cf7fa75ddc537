//! Non-reentrant exclusive lock with explicit lock/unlock.
//!
//! [`Mutex`] guards no data of its own: the holder calls [`Mutex::unlock`]
//! when done, and unlocking from any other thread fails with
//! [`LockError::IllegalMonitorState`]. The lock is not reentrant; a holder
//! that calls [`Mutex::lock`] again blocks forever.
//!
//! # Acquisition modes
//!
//! | Method | Blocks | Interruption | Timeout |
//! |---|---|---|---|
//! | [`lock`](Mutex::lock) | yes | deferred, flag kept | no |
//! | [`lock_interruptibly`](Mutex::lock_interruptibly) | yes | `Err(Interrupted)` | no |
//! | [`try_lock`](Mutex::try_lock) | no | ignored | no |
//! | [`try_lock_for`](Mutex::try_lock_for) | yes | `Err(Interrupted)` | `Ok(false)` |
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use qlock::Mutex;
//!
//! let mutex = Arc::new(Mutex::new());
//! mutex.lock();
//!
//! let contender = {
//!     let mutex = Arc::clone(&mutex);
//!     std::thread::spawn(move || mutex.try_lock_for(Duration::from_millis(10)))
//! };
//! assert_eq!(contender.join().unwrap(), Ok(false));
//!
//! mutex.unlock().unwrap();
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::condition::Condition;
use super::engine::SyncEngine;
use super::LockMetricsSnapshot;
use crate::config::LockConfig;
use crate::error::{ConfigError, LockError};
use crate::thread::ThreadToken;

/// Explicit lock/unlock surface shared by lock implementations.
///
/// Lets code take any lock generically:
///
/// ```
/// use qlock::{Lock, Mutex};
///
/// fn critical<L: Lock>(lock: &L, work: impl FnOnce()) -> Result<(), qlock::LockError> {
///     lock.lock_interruptibly()?;
///     work();
///     lock.unlock()
/// }
///
/// critical(&Mutex::new(), || {}).unwrap();
/// ```
pub trait Lock {
    /// Blocks until the lock is held. An interruption while waiting does not
    /// abort the call and remains pending afterwards.
    fn lock(&self);

    /// Blocks until the lock is held or the thread is interrupted.
    fn lock_interruptibly(&self) -> Result<(), LockError>;

    /// Acquires the lock only if it is free right now.
    fn try_lock(&self) -> bool;

    /// Blocks for at most `timeout`; `Ok(false)` if it elapsed first.
    fn try_lock_for(&self, timeout: Duration) -> Result<bool, LockError>;

    /// Releases the lock held by the calling thread.
    fn unlock(&self) -> Result<(), LockError>;

    /// Creates a condition bound to this lock.
    fn new_condition(&self) -> Condition;
}

/// Exclusive, non-reentrant, non-fair lock.
pub struct Mutex {
    engine: Arc<SyncEngine>,
}

impl Mutex {
    /// Creates an unlocked mutex with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            engine: Arc::new(SyncEngine::new(&LockConfig::default())),
        }
    }

    /// Creates an unlocked mutex from a validated configuration.
    pub fn with_config(config: LockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            engine: Arc::new(SyncEngine::new(&config)),
        })
    }

    /// Acquires the lock, blocking as long as necessary.
    ///
    /// The caller tries once before joining the queue and may therefore
    /// acquire ahead of threads that are already waiting. If the thread is
    /// interrupted while blocked it keeps waiting, and the interruption is
    /// still pending when this returns.
    pub fn lock(&self) {
        self.engine.acquire();
    }

    /// Acquires the lock unless the thread is interrupted first.
    ///
    /// A pending interruption on entry fails immediately. On
    /// [`LockError::Interrupted`] the interruption flag has been cleared and
    /// the thread holds nothing.
    pub fn lock_interruptibly(&self) -> Result<(), LockError> {
        self.engine.acquire_interruptibly()
    }

    /// Acquires the lock if it is free, without ever queueing.
    #[must_use]
    pub fn try_lock(&self) -> bool {
        self.engine.try_acquire()
    }

    /// Acquires the lock, waiting at most `timeout`.
    ///
    /// `Duration::ZERO` is a single attempt. Interruption behaves as in
    /// [`lock_interruptibly`](Self::lock_interruptibly).
    pub fn try_lock_for(&self, timeout: Duration) -> Result<bool, LockError> {
        self.engine.try_acquire_timed(timeout)
    }

    /// Releases the lock and wakes the longest-waiting thread, if any.
    pub fn unlock(&self) -> Result<(), LockError> {
        self.engine.release()
    }

    /// Creates a [`Condition`] bound to this mutex.
    #[must_use]
    pub fn new_condition(&self) -> Condition {
        Condition::new(Arc::clone(&self.engine))
    }

    /// True if some thread holds the lock. Advisory.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.engine.is_locked()
    }

    /// True if the calling thread holds the lock. Exact.
    #[must_use]
    pub fn is_held_by_current_thread(&self) -> bool {
        self.engine.is_held_by_current_thread()
    }

    /// Token of the holding thread, if any. Advisory.
    #[must_use]
    pub fn owner(&self) -> Option<ThreadToken> {
        self.engine.owner()
    }

    /// True if any thread may be waiting to acquire. Advisory: threads join
    /// and leave the queue concurrently.
    #[must_use]
    pub fn has_queued_threads(&self) -> bool {
        self.engine.queue_length() > 0
    }

    /// Estimated number of threads waiting to acquire.
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.engine.queue_length()
    }

    /// Tokens of the waiting threads, longest waiter first. A snapshot.
    #[must_use]
    pub fn queued_threads(&self) -> Vec<ThreadToken> {
        self.engine.queued_threads()
    }

    /// True if any thread waits on `condition`.
    ///
    /// Fails with [`LockError::ForeignCondition`] if `condition` was created
    /// by another mutex, and with [`LockError::IllegalMonitorState`] if the
    /// caller does not hold this one.
    pub fn has_waiters(&self, condition: &Condition) -> Result<bool, LockError> {
        self.wait_queue_length(condition).map(|len| len > 0)
    }

    /// Number of threads waiting on `condition`. Errors as in
    /// [`has_waiters`](Self::has_waiters).
    pub fn wait_queue_length(&self, condition: &Condition) -> Result<usize, LockError> {
        if !condition.is_bound_to(&self.engine) {
            return Err(LockError::ForeignCondition);
        }
        condition.wait_queue_length()
    }

    /// Snapshot of this lock's contention counters.
    #[must_use]
    pub fn metrics(&self) -> LockMetricsSnapshot {
        self.engine.metrics()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("name", &self.engine.name())
            .field("locked", &self.is_locked())
            .field("owner", &self.owner())
            .field("queued", &self.queue_length())
            .finish()
    }
}

impl Lock for Mutex {
    fn lock(&self) {
        Self::lock(self);
    }

    fn lock_interruptibly(&self) -> Result<(), LockError> {
        Self::lock_interruptibly(self)
    }

    fn try_lock(&self) -> bool {
        Self::try_lock(self)
    }

    fn try_lock_for(&self, timeout: Duration) -> Result<bool, LockError> {
        Self::try_lock_for(self, timeout)
    }

    fn unlock(&self) -> Result<(), LockError> {
        Self::unlock(self)
    }

    fn new_condition(&self) -> Condition {
        Self::new_condition(self)
    }
}
