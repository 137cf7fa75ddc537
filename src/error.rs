//! Error types for lock operations and configuration.
//!
//! Lock errors are small `Copy` values: they describe a programming error
//! (`IllegalMonitorState`, `ForeignCondition`) or an aborted wait
//! (`Interrupted`). Timeouts are not errors; timed operations report them as
//! `Ok(false)`.

use thiserror::Error;

/// Error returned by lock and condition operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum LockError {
    /// The calling thread does not hold the lock (or the lock is not held at
    /// all). Never retried; always a bug in the caller.
    #[error("illegal monitor state: calling thread does not hold the lock")]
    IllegalMonitorState,
    /// A blocking acquire or condition wait was aborted by an interruption.
    #[error("interrupted while waiting")]
    Interrupted,
    /// The condition passed in was created by a different lock.
    #[error("condition is not bound to this lock")]
    ForeignCondition,
}

impl LockError {
    /// Returns true if this error reports a caller bug rather than an
    /// aborted wait.
    #[must_use]
    pub const fn is_programming_error(self) -> bool {
        matches!(self, Self::IllegalMonitorState | Self::ForeignCondition)
    }
}

/// Error returned when a [`LockConfig`](crate::LockConfig) is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Spin limit above the supported maximum.
    #[error("queue spin limit {0} exceeds the maximum of 16")]
    InvalidSpinLimit(u32),
    /// The node arena needs room for at least one waiter.
    #[error("arena capacity must be non-zero")]
    ZeroArenaCapacity,
    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value found in the environment.
        value: String,
    },
    /// A `QLOCK_*` override names no known setting.
    #[error("unknown config override: {0}")]
    InvalidOverride(String),
}
