//! Thread identity, interruption and the park capability.
//!
//! The lock never schedules threads itself. It consumes three services from
//! this module:
//!
//! - a process-unique [`ThreadToken`] used as the owner identity,
//! - an interruption flag per thread that a parked waiter can observe,
//! - park-until-deadline for the current thread and unpark for a handle.
//!
//! Parking is delegated to `std::thread::park`/`park_timeout`, which keep a
//! single wake-up permit per thread: an unpark that lands before the park
//! makes the next park return immediately, so a wake-up is never lost. Both
//! calls may also return spuriously, and every caller re-checks its
//! condition in a loop.
//!
//! # Interruption
//!
//! ```
//! use qlock::thread;
//!
//! let me = thread::current();
//! me.interrupt();
//! assert!(me.is_interrupted());
//! assert!(thread::interrupted()); // tests and clears
//! assert!(!me.is_interrupted());
//! ```

use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: ThreadHandle = ThreadHandle::for_current();
}

/// Process-unique identity of a thread, used as the lock owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadToken(NonZeroU64);

impl ThreadToken {
    /// Returns the raw non-zero value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Rebuilds a token from its raw value; `0` means "no thread".
    #[inline]
    pub(crate) const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    fn next() -> Self {
        let raw = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        // A u64 counter starting at 1 cannot reach zero in practice.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MAX))
    }
}

impl fmt::Display for ThreadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

#[derive(Debug)]
struct HandleInner {
    token: ThreadToken,
    thread: std::thread::Thread,
    interrupted: AtomicBool,
}

/// Shared handle to a thread: identity, interruption flag and unpark target.
///
/// Obtained with [`current`]; clone it and send it to another thread to
/// interrupt this one.
#[derive(Debug, Clone)]
pub struct ThreadHandle {
    inner: Arc<HandleInner>,
}

impl ThreadHandle {
    fn for_current() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                token: ThreadToken::next(),
                thread: std::thread::current(),
                interrupted: AtomicBool::new(false),
            }),
        }
    }

    /// Returns this thread's token.
    #[inline]
    #[must_use]
    pub fn token(&self) -> ThreadToken {
        self.inner.token
    }

    /// Returns the thread's name, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.thread.name()
    }

    /// Requests interruption of this thread.
    ///
    /// Sets the flag and unparks the thread so that a blocked interruptible
    /// acquire or condition wait observes it promptly.
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        self.inner.thread.unpark();
    }

    /// Returns true if an interruption is pending. Does not clear it.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Consumes a pending interruption.
    #[inline]
    pub(crate) fn take_interrupt(&self) -> bool {
        self.inner.interrupted.swap(false, Ordering::SeqCst)
    }

    /// Restores an interruption that was consumed but deliberately deferred.
    pub(crate) fn reassert_interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
    }

    /// Wakes the thread if it is parked, or lets its next park return.
    #[inline]
    pub(crate) fn unpark(&self) {
        self.inner.thread.unpark();
    }
}

impl PartialEq for ThreadHandle {
    fn eq(&self, other: &Self) -> bool {
        self.token() == other.token()
    }
}

impl Eq for ThreadHandle {}

/// Returns the handle for the calling thread.
#[must_use]
pub fn current() -> ThreadHandle {
    CURRENT
        .try_with(Clone::clone)
        .unwrap_or_else(|_| ThreadHandle::for_current())
}

/// Tests and clears the calling thread's interruption flag.
#[must_use]
pub fn interrupted() -> bool {
    current().take_interrupt()
}

/// Parks the calling thread until it is unparked, `deadline` passes, or a
/// spurious wake-up occurs. A deadline already in the past returns at once.
pub(crate) fn park_until(deadline: Option<Instant>) {
    match deadline {
        None => std::thread::park(),
        Some(deadline) => {
            let now = Instant::now();
            if deadline > now {
                std::thread::park_timeout(deadline - now);
            }
        }
    }
}
