//! Mutex conformance suite.
//!
//! Test coverage:
//! - MUTEX-001: try_lock while held / after unlock
//! - MUTEX-002: blocked lock() proceeds after unlock
//! - MUTEX-003: timed lock against a permanently held lock
//! - MUTEX-004: unlock without ownership
//! - MUTEX-005: interrupting lock_interruptibly()
//! - MUTEX-006: mutual exclusion under contention
//! - MUTEX-007: exactly one try_lock winner after unlock
//! - MUTEX-008: cancelled waiters leave the queue intact
//! - MUTEX-009: uninterruptible lock keeps the interruption pending
//! - MUTEX-010: a fresh caller barges past a queued waiter
//!
//! Run with: `cargo test --test mutex_conformance`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use qlock::{LockError, Mutex, thread};

mod common {
    use std::time::{Duration, Instant};

    pub fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_test_writer()
            .try_init();
    }

    /// Polls `condition` until it holds or `timeout` elapses.
    pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        condition()
    }
}

macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST START ===");
    };
}

macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST COMPLETE ===");
    };
}

macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            tracing::error!(
                message = $msg,
                expected = ?$expected,
                actual = ?$actual,
                "Assertion failed"
            );
        }
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

const PATIENCE: Duration = Duration::from_secs(5);

fn init_test(name: &str) {
    common::init_test_logging();
    test_phase!(name);
}

/// Spawns a thread and returns its handle once it has started running `f`.
fn spawn_with_handle<T: Send + 'static>(
    f: impl FnOnce() -> T + Send + 'static,
) -> (qlock::ThreadHandle, JoinHandle<T>) {
    let (tx, rx) = mpsc::channel();
    let join = std::thread::spawn(move || {
        tx.send(thread::current()).expect("send handle");
        f()
    });
    let handle = rx.recv().expect("recv handle");
    (handle, join)
}

/// MUTEX-001: A locks, B try_lock → false; A unlocks; B try_lock → true.
#[test]
fn mutex_001_try_lock_tracks_holder() {
    init_test("mutex_001_try_lock_tracks_holder");
    let mutex = Arc::new(Mutex::new());
    let (to_b, b_rx) = mpsc::channel::<()>();
    let (to_a, a_rx) = mpsc::channel::<bool>();

    mutex.lock();
    let b = {
        let mutex = Arc::clone(&mutex);
        std::thread::spawn(move || {
            to_a.send(mutex.try_lock()).expect("send");
            b_rx.recv().expect("recv");
            let second = mutex.try_lock();
            if second {
                mutex.unlock().expect("b holds lock");
            }
            second
        })
    };

    let first = a_rx.recv().expect("recv");
    assert_with_log!(!first, "try_lock while held", false, first);
    mutex.unlock().expect("a holds lock");
    to_b.send(()).expect("send");
    let second = b.join().expect("b panicked");
    assert_with_log!(second, "try_lock after unlock", true, second);
    test_complete!("mutex_001_try_lock_tracks_holder");
}

/// MUTEX-002: A holds; B blocks in lock(); A unlocks; B returns holding it.
#[test]
fn mutex_002_blocked_lock_proceeds_after_unlock() {
    init_test("mutex_002_blocked_lock_proceeds_after_unlock");
    let mutex = Arc::new(Mutex::new());
    mutex.lock();

    let b = {
        let mutex = Arc::clone(&mutex);
        std::thread::spawn(move || {
            mutex.lock();
            let held = mutex.is_held_by_current_thread();
            mutex.unlock().expect("b holds lock");
            held
        })
    };

    let queued = common::wait_for(PATIENCE, || mutex.has_queued_threads());
    assert_with_log!(queued, "b queued", true, queued);
    mutex.unlock().expect("a holds lock");
    let held = b.join().expect("b panicked");
    assert_with_log!(held, "b held the lock", true, held);
    let locked = mutex.is_locked();
    assert_with_log!(!locked, "released", false, locked);
    test_complete!("mutex_002_blocked_lock_proceeds_after_unlock");
}

/// MUTEX-003: try_lock_for(100ms) against a held lock returns false after
/// at least 100ms and never true.
#[test]
fn mutex_003_timed_lock_times_out() {
    init_test("mutex_003_timed_lock_times_out");
    let mutex = Arc::new(Mutex::new());
    mutex.lock();

    let b = {
        let mutex = Arc::clone(&mutex);
        std::thread::spawn(move || {
            let start = Instant::now();
            let got = mutex.try_lock_for(Duration::from_millis(100));
            (got, start.elapsed())
        })
    };
    let (got, elapsed) = b.join().expect("b panicked");
    assert_with_log!(got == Ok(false), "timed out", "Ok(false)", got);
    assert_with_log!(
        elapsed >= Duration::from_millis(100),
        "waited the full timeout",
        ">= 100ms",
        elapsed
    );
    let held = mutex.is_held_by_current_thread();
    assert_with_log!(held, "a still holds", true, held);
    let queued = mutex.queue_length();
    assert_with_log!(queued == 0, "no leftover node", 0, queued);
    mutex.unlock().expect("a holds lock");
    test_complete!("mutex_003_timed_lock_times_out");
}

/// MUTEX-004: unlock without ownership fails whatever the lock state.
#[test]
fn mutex_004_unlock_without_ownership() {
    init_test("mutex_004_unlock_without_ownership");
    let mutex = Arc::new(Mutex::new());

    let free = mutex.unlock();
    assert_with_log!(
        free == Err(LockError::IllegalMonitorState),
        "unlock while free",
        "IllegalMonitorState",
        free
    );

    mutex.lock();
    let foreign = {
        let mutex = Arc::clone(&mutex);
        std::thread::spawn(move || mutex.unlock())
            .join()
            .expect("thread panicked")
    };
    assert_with_log!(
        foreign == Err(LockError::IllegalMonitorState),
        "unlock by non-owner",
        "IllegalMonitorState",
        foreign
    );
    mutex.unlock().expect("owner unlocks");

    let twice = mutex.unlock();
    assert_with_log!(
        twice == Err(LockError::IllegalMonitorState),
        "second unlock",
        "IllegalMonitorState",
        twice
    );
    test_complete!("mutex_004_unlock_without_ownership");
}

/// MUTEX-005: interrupting a thread parked in lock_interruptibly() fails the
/// call and leaves the holder untouched.
#[test]
fn mutex_005_interrupt_parked_acquirer() {
    init_test("mutex_005_interrupt_parked_acquirer");
    let mutex = Arc::new(Mutex::new());
    mutex.lock();
    let me = thread::current().token();

    let (b_handle, b) = {
        let mutex = Arc::clone(&mutex);
        spawn_with_handle(move || {
            let result = mutex.lock_interruptibly();
            (result, thread::current().is_interrupted())
        })
    };
    assert!(common::wait_for(PATIENCE, || mutex.queue_length() == 1));
    b_handle.interrupt();

    let (result, flag) = b.join().expect("b panicked");
    assert_with_log!(
        result == Err(LockError::Interrupted),
        "lock_interruptibly interrupted",
        "Interrupted",
        result
    );
    assert_with_log!(!flag, "flag consumed", false, flag);
    let owner = mutex.owner();
    assert_with_log!(owner == Some(me), "owner unchanged", Some(me), owner);
    let queued = mutex.queue_length();
    assert_with_log!(queued == 0, "node unlinked", 0, queued);
    mutex.unlock().expect("a holds lock");
    test_complete!("mutex_005_interrupt_parked_acquirer");
}

/// MUTEX-006: at most one thread is ever inside the critical section.
#[test]
fn mutex_006_mutual_exclusion() {
    init_test("mutex_006_mutual_exclusion");
    const THREADS: usize = 8;
    const ROUNDS: usize = 1_000;

    let mutex = Arc::new(Mutex::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    // Non-atomic read-modify-write, only correct under the lock.
    let counter = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|i| {
            let (mutex, inside, overlaps, counter, start) = (
                Arc::clone(&mutex),
                Arc::clone(&inside),
                Arc::clone(&overlaps),
                Arc::clone(&counter),
                Arc::clone(&start),
            );
            std::thread::spawn(move || {
                start.wait();
                for round in 0..ROUNDS {
                    match (i + round) % 3 {
                        0 => mutex.lock(),
                        1 => mutex.lock_interruptibly().expect("not interrupted"),
                        _ => {
                            while !mutex
                                .try_lock_for(Duration::from_millis(1))
                                .expect("not interrupted")
                            {}
                        }
                    }
                    if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    let value = counter.load(Ordering::Relaxed);
                    std::hint::spin_loop();
                    counter.store(value + 1, Ordering::Relaxed);
                    inside.fetch_sub(1, Ordering::SeqCst);
                    mutex.unlock().expect("holder unlocks");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    let overlaps = overlaps.load(Ordering::SeqCst);
    assert_with_log!(overlaps == 0, "no overlapping holders", 0, overlaps);
    let total = counter.load(Ordering::SeqCst);
    assert_with_log!(total == THREADS * ROUNDS, "no lost updates", THREADS * ROUNDS, total);
    let queued = mutex.queue_length();
    assert_with_log!(queued == 0, "queue drained", 0, queued);
    test_complete!("mutex_006_mutual_exclusion");
}

/// MUTEX-007: after unlock, exactly one of many racing try_lock calls wins.
#[test]
fn mutex_007_single_try_lock_winner() {
    init_test("mutex_007_single_try_lock_winner");
    const RACERS: usize = 6;

    for _ in 0..20 {
        let mutex = Arc::new(Mutex::new());
        mutex.lock();
        let start = Arc::new(Barrier::new(RACERS + 1));
        let racers: Vec<_> = (0..RACERS)
            .map(|_| {
                let (mutex, start) = (Arc::clone(&mutex), Arc::clone(&start));
                std::thread::spawn(move || {
                    let early = mutex.try_lock();
                    start.wait();
                    start.wait();
                    (early, mutex.try_lock())
                })
            })
            .collect();
        start.wait();
        mutex.unlock().expect("a holds lock");
        start.wait();

        let results: Vec<(bool, bool)> = racers
            .into_iter()
            .map(|r| r.join().expect("racer panicked"))
            .collect();
        let early_wins = results.iter().filter(|(early, _)| *early).count();
        assert_with_log!(early_wins == 0, "no win while held", 0, early_wins);
        let wins = results.iter().filter(|(_, late)| *late).count();
        assert_with_log!(wins == 1, "exactly one winner", 1, wins);
    }
    test_complete!("mutex_007_single_try_lock_winner");
}

/// MUTEX-008: a timed-out head waiter hands the wake-up to the waiter
/// behind it, and the queue returns to its previous length.
#[test]
fn mutex_008_cancelled_waiter_keeps_queue_intact() {
    init_test("mutex_008_cancelled_waiter_keeps_queue_intact");
    let mutex = Arc::new(Mutex::new());
    mutex.lock();

    let timed = {
        let mutex = Arc::clone(&mutex);
        std::thread::spawn(move || mutex.try_lock_for(Duration::from_millis(50)))
    };
    assert!(common::wait_for(PATIENCE, || mutex.queue_length() == 1));

    let patient = {
        let mutex = Arc::clone(&mutex);
        std::thread::spawn(move || {
            mutex.lock();
            mutex.unlock().expect("patient holds lock");
        })
    };
    assert!(common::wait_for(PATIENCE, || mutex.queue_length() == 2));

    let timed_out = timed.join().expect("timed panicked");
    assert_with_log!(timed_out == Ok(false), "head timed out", "Ok(false)", timed_out);
    let queued = mutex.queue_length();
    assert_with_log!(queued == 1, "only patient waiter left", 1, queued);

    mutex.unlock().expect("a holds lock");
    patient.join().expect("patient panicked");
    let locked = mutex.is_locked();
    assert_with_log!(!locked, "released at end", false, locked);
    test_complete!("mutex_008_cancelled_waiter_keeps_queue_intact");
}

/// MUTEX-009: lock() keeps waiting through an interruption and returns with
/// it still pending.
#[test]
fn mutex_009_uninterruptible_lock_defers_interrupt() {
    init_test("mutex_009_uninterruptible_lock_defers_interrupt");
    let mutex = Arc::new(Mutex::new());
    mutex.lock();

    let (b_handle, b) = {
        let mutex = Arc::clone(&mutex);
        spawn_with_handle(move || {
            mutex.lock();
            let pending = thread::interrupted();
            mutex.unlock().expect("b holds lock");
            pending
        })
    };
    assert!(common::wait_for(PATIENCE, || mutex.queue_length() == 1));
    b_handle.interrupt();
    std::thread::sleep(Duration::from_millis(20));
    let queued = mutex.queue_length();
    assert_with_log!(queued == 1, "still queued after interrupt", 1, queued);

    mutex.unlock().expect("a holds lock");
    let pending = b.join().expect("b panicked");
    assert_with_log!(pending, "interruption still pending", true, pending);
    test_complete!("mutex_009_uninterruptible_lock_defers_interrupt");
}

/// MUTEX-010: the lock is not fair. After unlock, a fresh try_lock can win
/// while a woken waiter is still queued; the waiter stays queued and gets
/// the lock on the next unlock.
#[test]
fn mutex_010_fresh_caller_barges_past_queued_waiter() {
    init_test("mutex_010_fresh_caller_barges_past_queued_waiter");
    let mutex = Arc::new(Mutex::new());
    let mut barged = false;

    // The woken waiter may occasionally win the race; retry until the
    // barging path is seen.
    for _ in 0..50 {
        mutex.lock();
        let waiter = {
            let mutex = Arc::clone(&mutex);
            std::thread::spawn(move || {
                mutex.lock();
                mutex.unlock().expect("waiter holds lock");
            })
        };
        assert!(common::wait_for(PATIENCE, || mutex.queue_length() == 1));

        mutex.unlock().expect("a holds lock");
        if mutex.try_lock() {
            barged = true;
            let queued = mutex.queue_length();
            assert_with_log!(queued == 1, "waiter still queued behind barger", 1, queued);
            let held = mutex.is_held_by_current_thread();
            assert_with_log!(held, "barger holds the lock", true, held);
            mutex.unlock().expect("barger holds lock");
        }
        waiter.join().expect("waiter panicked");
        if barged {
            break;
        }
    }

    assert_with_log!(barged, "fresh try_lock won over queued waiter", true, barged);
    let queued = mutex.queue_length();
    assert_with_log!(queued == 0, "queue drained", 0, queued);
    test_complete!("mutex_010_fresh_caller_barges_past_queued_waiter");
}
