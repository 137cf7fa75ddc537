//! Bounded exponential spin, then yield.

/// Backoff for short critical sections guarded by a CAS flag.
///
/// Each [`snooze`](Self::snooze) doubles the spin count until `2^limit`
/// spins; after that every call yields to the scheduler so a preempted flag
/// holder can run. Only the spin phase is bounded: the caller keeps yielding
/// for as long as it keeps snoozing.
#[derive(Debug)]
pub(crate) struct Backoff {
    step: u32,
    limit: u32,
}

impl Backoff {
    #[inline]
    pub(crate) const fn new(limit: u32) -> Self {
        Self { step: 0, limit }
    }

    #[inline]
    pub(crate) fn snooze(&mut self) {
        if self.step <= self.limit {
            for _ in 0..1u32 << self.step {
                std::hint::spin_loop();
            }
            self.step += 1;
        } else {
            std::thread::yield_now();
        }
    }

    /// True once spinning has given way to yielding.
    #[cfg(test)]
    pub(crate) const fn is_yielding(&self) -> bool {
        self.step > self.limit
    }
}
