//! The lock and its condition variables.
//!
//! # Layers
//!
//! - `state`: the CAS lock word and owner token
//! - `node`, `queue`: wait nodes in an arena; lock-free arrival at the wait
//!   list tail, unlinks and condition lists under a queue bit
//! - `engine`: acquire/release/wait protocols over the two
//! - [`Mutex`], [`Condition`], [`Lock`]: the public surface
//! - [`LockMetricsSnapshot`]: counters, live with the `lock-metrics` feature
//!
//! # Wake-up discipline
//!
//! Threads are only ever woken after the queue bit has been released, and a
//! woken thread re-checks everything it needs under the bit. Release never
//! waits for the bit: a wake it cannot deliver is left to the holder. Waking
//! a thread never hands it the lock.

mod condition;
mod engine;
mod metrics;
mod mutex;
mod node;
mod queue;
mod state;

pub use condition::Condition;
pub use metrics::LockMetricsSnapshot;
pub use mutex::{Lock, Mutex};
