//! Atomic lock word and owner record.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::LockError;
use crate::thread::ThreadToken;

const FREE: u32 = 0;
const HELD: u32 = 1;
const NO_OWNER: u64 = 0;

/// The lock word: `0` free, `1` held, changed only by CAS.
///
/// The owner is written only by the thread that won the 0→1 transition and
/// cleared by that thread before the 1→0 transition. Other threads read it
/// only for advisory queries.
#[derive(Debug)]
pub(crate) struct LockState {
    state: AtomicU32,
    owner: AtomicU64,
}

impl LockState {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU32::new(FREE),
            owner: AtomicU64::new(NO_OWNER),
        }
    }

    /// One CAS attempt 0→1. Records `me` as owner on success.
    #[inline]
    pub(crate) fn try_acquire(&self, me: ThreadToken) -> bool {
        if self
            .state
            .compare_exchange(FREE, HELD, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(me.get(), Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Releases the lock held by `me`.
    ///
    /// Fails with `IllegalMonitorState` when the lock is free or held by
    /// another thread; state is left untouched in that case.
    #[inline]
    pub(crate) fn try_release(&self, me: ThreadToken) -> Result<(), LockError> {
        if !self.is_held_by(me) {
            return Err(LockError::IllegalMonitorState);
        }
        self.owner.store(NO_OWNER, Ordering::Relaxed);
        self.state
            .compare_exchange(HELD, FREE, Ordering::SeqCst, Ordering::Relaxed)
            .map(drop)
            .map_err(|_| LockError::IllegalMonitorState)
    }

    #[inline]
    pub(crate) fn is_held(&self) -> bool {
        self.state.load(Ordering::SeqCst) == HELD
    }

    /// Exact for the calling thread: only `me` could have stored `me`.
    #[inline]
    pub(crate) fn is_held_by(&self, me: ThreadToken) -> bool {
        self.state.load(Ordering::Acquire) == HELD
            && self.owner.load(Ordering::Relaxed) == me.get()
    }

    /// Advisory: may be stale by the time the caller looks at it.
    pub(crate) fn owner(&self) -> Option<ThreadToken> {
        ThreadToken::from_raw(self.owner.load(Ordering::Relaxed))
    }
}
