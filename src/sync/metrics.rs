//! Feature-gated contention counters.
//!
//! With the `lock-metrics` feature every [`Mutex`](super::Mutex) keeps
//! counters for acquisitions, contended acquisitions, parks, timeouts,
//! interruptions, condition waits and time spent queued. Without it the recorder is a
//! zero-sized no-op and [`LockMetricsSnapshot`] reports zeros apart from the
//! lock name.
//!
//! ```
//! use qlock::{LockConfig, Mutex};
//!
//! let m = Mutex::with_config(LockConfig::default().with_name("orders")).unwrap();
//! m.lock();
//! m.unlock().unwrap();
//! let snap = m.metrics();
//! assert_eq!(snap.name, "orders");
//! #[cfg(feature = "lock-metrics")]
//! assert_eq!(snap.acquisitions, 1);
//! ```

/// Point-in-time copy of a lock's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockMetricsSnapshot {
    /// Name from the lock's [`LockConfig`](crate::LockConfig).
    pub name: &'static str,
    /// Successful acquisitions, fast path and queued.
    pub acquisitions: u64,
    /// Acquisitions that had to join the wait queue.
    pub contentions: u64,
    /// Times a waiter parked while queued for the lock.
    pub parks: u64,
    /// Timed acquisitions that gave up at their deadline.
    pub timeouts: u64,
    /// Queued acquisitions abandoned because of an interruption.
    pub interrupts: u64,
    /// Completed condition waits, whether signalled, timed out or
    /// interrupted. The re-acquire that ends each wait is not counted as an
    /// acquisition.
    pub condition_waits: u64,
    /// Cumulative nanoseconds spent queued by contended acquisitions.
    pub wait_ns: u64,
    /// Longest single queued wait in nanoseconds.
    pub max_wait_ns: u64,
}

#[cfg(feature = "lock-metrics")]
mod inner {
    use super::LockMetricsSnapshot;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    #[derive(Debug, Default)]
    pub(crate) struct LockMetrics {
        acquisitions: AtomicU64,
        contentions: AtomicU64,
        parks: AtomicU64,
        timeouts: AtomicU64,
        interrupts: AtomicU64,
        condition_waits: AtomicU64,
        wait_ns: AtomicU64,
        max_wait_ns: AtomicU64,
    }

    impl LockMetrics {
        fn update_max(current: &AtomicU64, value: u64) {
            let mut old = current.load(Ordering::Relaxed);
            while value > old {
                match current.compare_exchange_weak(
                    old,
                    value,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(actual) => old = actual,
                }
            }
        }

        #[inline]
        pub(crate) fn record_acquire(&self) {
            self.acquisitions.fetch_add(1, Ordering::Relaxed);
        }

        pub(crate) fn record_contended(&self, queued_at: Instant) {
            let waited = u64::try_from(queued_at.elapsed().as_nanos()).unwrap_or(u64::MAX);
            self.acquisitions.fetch_add(1, Ordering::Relaxed);
            self.contentions.fetch_add(1, Ordering::Relaxed);
            self.wait_ns.fetch_add(waited, Ordering::Relaxed);
            Self::update_max(&self.max_wait_ns, waited);
        }

        #[inline]
        pub(crate) fn record_park(&self) {
            self.parks.fetch_add(1, Ordering::Relaxed);
        }

        pub(crate) fn record_timeout(&self) {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }

        pub(crate) fn record_interrupt(&self) {
            self.interrupts.fetch_add(1, Ordering::Relaxed);
        }

        pub(crate) fn record_condition_wait(&self) {
            self.condition_waits.fetch_add(1, Ordering::Relaxed);
        }

        pub(crate) fn snapshot(&self, name: &'static str) -> LockMetricsSnapshot {
            LockMetricsSnapshot {
                name,
                acquisitions: self.acquisitions.load(Ordering::Relaxed),
                contentions: self.contentions.load(Ordering::Relaxed),
                parks: self.parks.load(Ordering::Relaxed),
                timeouts: self.timeouts.load(Ordering::Relaxed),
                interrupts: self.interrupts.load(Ordering::Relaxed),
                condition_waits: self.condition_waits.load(Ordering::Relaxed),
                wait_ns: self.wait_ns.load(Ordering::Relaxed),
                max_wait_ns: self.max_wait_ns.load(Ordering::Relaxed),
            }
        }
    }
}

#[cfg(not(feature = "lock-metrics"))]
mod inner {
    use super::LockMetricsSnapshot;
    use std::time::Instant;

    #[derive(Debug, Default)]
    pub(crate) struct LockMetrics;

    impl LockMetrics {
        #[inline]
        pub(crate) fn record_acquire(&self) {}

        #[inline]
        pub(crate) fn record_contended(&self, _queued_at: Instant) {}

        #[inline]
        pub(crate) fn record_park(&self) {}

        #[inline]
        pub(crate) fn record_timeout(&self) {}

        #[inline]
        pub(crate) fn record_interrupt(&self) {}

        #[inline]
        pub(crate) fn record_condition_wait(&self) {}

        pub(crate) fn snapshot(&self, name: &'static str) -> LockMetricsSnapshot {
            LockMetricsSnapshot {
                name,
                ..LockMetricsSnapshot::default()
            }
        }
    }
}

pub(crate) use inner::LockMetrics;
