//! Exclusive lock built on an atomic state word and an explicit FIFO wait
//! queue.
//!
//! `qlock` implements the classic queued-synchronizer design from scratch: a
//! single CAS-managed state word decides who holds the lock, while threads
//! that lose the race are recorded as nodes in a wait queue and parked until
//! a release wakes them. Condition variables share the same node storage, so
//! a signal is a transfer of a node from a condition list to the wait list.
//!
//! # Primitives
//!
//! - [`Mutex`]: non-reentrant exclusive lock with blocking, interruptible,
//!   non-blocking and timed acquisition
//! - [`Condition`]: wait/signal bound to one [`Mutex`]
//! - [`thread`]: thread identity, interruption and the park capability the
//!   lock consumes
//!
//! # Fairness
//!
//! The lock is deliberately non-fair. A thread calling [`Mutex::lock`] always
//! tries the CAS before joining the queue and may barge ahead of threads that
//! are already parked. Queue order decides which waiter is woken first, not
//! which thread wins.
//!
//! # Example
//!
//! ```
//! use qlock::Mutex;
//!
//! let mutex = Mutex::new();
//! mutex.lock();
//! assert!(mutex.is_locked());
//! assert!(!mutex.try_lock());
//! mutex.unlock().expect("held by this thread");
//! assert!(!mutex.is_locked());
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod error;
pub mod sync;
pub mod thread;
pub(crate) mod util;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::LockConfig;
pub use error::{ConfigError, LockError};
pub use sync::{Condition, Lock, LockMetricsSnapshot, Mutex};
pub use thread::{ThreadHandle, ThreadToken};
