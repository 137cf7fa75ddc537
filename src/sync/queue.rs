//! Wait list and condition lists sharing one node arena.
//!
//! Every blocked thread is represented by one [`WaitNode`] in the arena. The
//! wait list and each condition list are doubly linked through the nodes'
//! `prev`/`next` indices and anchored by `first`/`last` indices; the anchors
//! play the role of sentinels and never stand for a waiter.
//!
//! # Arrival
//!
//! A thread joins the wait list with one CAS push of an [`Arrival`] onto the
//! intake stack, retried on contention. Appending never waits for another
//! thread. Whoever next holds the queue bit drains the intake and links the
//! arrivals at the wait list tail in push order.
//!
//! # Queue bit
//!
//! Unlinking, draining and condition edits are serialized by one flag taken
//! with CAS (see [`WaitQueue::lock`]). Critical sections are a handful of
//! index writes, never a park, never a call back into user code. The lock
//! state word itself is not under this bit: it is changed only by CAS in
//! [`super::state`].
//!
//! Release never takes the bit by waiting. [`WaitQueue::wake_first`] posts a
//! pending wake and tries the bit once; if it is held, the holder performs
//! the wake when it lets go. The holder clears the bit before it looks for a
//! pending wake, and the releaser posts before it tries the bit, so one of
//! the two always sees the other.
//!
//! The number of waiters in the wait list or the intake is mirrored in an
//! atomic counter with sequentially consistent updates. A releaser reads it
//! after its own SeqCst CAS of the state word, and a waiter increments it
//! before its own CAS, so either the releaser sees the waiter or the waiter's
//! CAS sees the lock free.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use super::node::{ConditionId, Membership, NodeId, NodeStatus, WaitNode};
use crate::thread::{ThreadHandle, ThreadToken};
use crate::util::{Arena, ArenaIndex, Backoff};

const UNLINKED: u64 = u64::MAX;

/// A waiter announced on the intake stack, not yet linked into the wait list.
#[derive(Debug)]
pub(crate) struct Arrival {
    thread: ThreadHandle,
    /// Packed [`NodeId`] once linked, `UNLINKED` before.
    node: AtomicU64,
    next: AtomicPtr<Arrival>,
}

impl Arrival {
    fn node(&self) -> Option<NodeId> {
        match self.node.load(Ordering::Acquire) {
            UNLINKED => None,
            bits => Some(ArenaIndex::from_bits(bits)),
        }
    }
}

/// Anchors of one doubly linked list of nodes.
#[derive(Debug, Default, Clone, Copy)]
struct NodeList {
    first: Option<NodeId>,
    last: Option<NodeId>,
    len: usize,
}

impl NodeList {
    fn push_back(&mut self, nodes: &mut Arena<WaitNode>, id: NodeId) {
        let prev = self.last;
        if let Some(node) = nodes.get_mut(id) {
            node.prev = prev;
            node.next = None;
        }
        match prev {
            Some(tail) => {
                if let Some(tail) = nodes.get_mut(tail) {
                    tail.next = Some(id);
                }
            }
            None => self.first = Some(id),
        }
        self.last = Some(id);
        self.len += 1;
    }

    /// Unlinks `id`, relinking its neighbours to each other.
    fn unlink(&mut self, nodes: &mut Arena<WaitNode>, id: NodeId) {
        let Some(node) = nodes.get_mut(id) else {
            return;
        };
        let prev = node.prev.take();
        let next = node.next.take();
        match prev {
            Some(p) => {
                if let Some(p) = nodes.get_mut(p) {
                    p.next = next;
                }
            }
            None => self.first = next,
        }
        match next {
            Some(n) => {
                if let Some(n) = nodes.get_mut(n) {
                    n.prev = prev;
                }
            }
            None => self.last = prev,
        }
        self.len -= 1;
    }

    fn iter(self, nodes: &Arena<WaitNode>) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.first, move |id| nodes.get(*id).and_then(|node| node.next))
    }
}

#[derive(Debug)]
struct Links {
    nodes: Arena<WaitNode>,
    wait: NodeList,
    conditions: Arena<NodeList>,
}

impl Links {
    /// Unlinks `id` from whichever list holds it, keeping the node alive.
    fn detach(&mut self, id: NodeId) -> Option<Membership> {
        let membership = self.nodes.get(id)?.membership;
        let Self {
            nodes,
            wait,
            conditions,
        } = self;
        match membership {
            Membership::Wait => wait.unlink(nodes, id),
            Membership::Condition(cond) => {
                if let Some(list) = conditions.get_mut(cond) {
                    list.unlink(nodes, id);
                }
            }
        }
        Some(membership)
    }

    /// Appends a detached node to the wait list as `Transferring`.
    fn attach_transferred(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.membership = Membership::Wait;
            node.status = NodeStatus::Transferring;
        }
        self.wait.push_back(&mut self.nodes, id);
    }
}

/// The lock's node storage plus the queue bit that guards it.
#[derive(Debug)]
pub(crate) struct WaitQueue {
    busy: AtomicBool,
    wake_pending: AtomicBool,
    queued: AtomicUsize,
    spin_limit: u32,
    /// Top of the intake stack; each entry is an `Arc<Arrival>` in raw form.
    intake: AtomicPtr<Arrival>,
    links: UnsafeCell<Links>,
}

// Safety: `links` is only reachable through a `QueueGuard`, and at most one
// guard exists at a time because it is created by winning the `busy` CAS.
unsafe impl Sync for WaitQueue {}

impl WaitQueue {
    pub(crate) fn new(capacity: usize, spin_limit: u32) -> Self {
        Self {
            busy: AtomicBool::new(false),
            wake_pending: AtomicBool::new(false),
            queued: AtomicUsize::new(0),
            spin_limit,
            intake: AtomicPtr::new(ptr::null_mut()),
            links: UnsafeCell::new(Links {
                nodes: Arena::with_capacity(capacity),
                wait: NodeList::default(),
                conditions: Arena::default(),
            }),
        }
    }

    /// Acquires the queue bit, spinning with backoff while it is held.
    pub(crate) fn lock(&self) -> QueueGuard<'_> {
        let mut backoff = Backoff::new(self.spin_limit);
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            while self.busy.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    /// One CAS on the queue bit.
    pub(crate) fn try_lock(&self) -> Option<QueueGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        let mut guard = QueueGuard { queue: self };
        guard.drain_intake();
        Some(guard)
    }

    /// Announces `thread` as a waiter at the wait list tail.
    ///
    /// One CAS on the intake stack, retried on contention; never takes the
    /// queue bit. The node id is known once a guard has been taken, see
    /// [`QueueGuard::admit`].
    pub(crate) fn enqueue(&self, thread: ThreadHandle) -> Arc<Arrival> {
        let arrival = Arc::new(Arrival {
            thread,
            node: AtomicU64::new(UNLINKED),
            next: AtomicPtr::new(ptr::null_mut()),
        });
        let raw = Arc::into_raw(Arc::clone(&arrival)).cast_mut();
        self.queued.fetch_add(1, Ordering::SeqCst);
        let mut top = self.intake.load(Ordering::Relaxed);
        loop {
            arrival.next.store(top, Ordering::Relaxed);
            match self
                .intake
                .compare_exchange_weak(top, raw, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return arrival,
                Err(current) => top = current,
            }
        }
    }

    /// Unparks the first waiter without waiting for the queue bit.
    ///
    /// Returns the woken thread when this call did the wake itself. `None`
    /// means the queue was empty or the wake was left to the current holder
    /// of the bit.
    pub(crate) fn wake_first(&self) -> Option<ThreadToken> {
        self.wake_pending.store(true, Ordering::SeqCst);
        let mut guard = self.try_lock()?;
        let successor = guard.take_pending_wake()?;
        drop(guard);
        successor.unpark();
        Some(successor.token())
    }

    /// Clears the queue bit, then performs any wake a releaser left behind.
    fn unlock(&self) {
        let mut successor: Option<ThreadHandle> = None;
        loop {
            self.busy.store(false, Ordering::SeqCst);
            if let Some(thread) = successor.take() {
                thread.unpark();
            }
            if !self.wake_pending.load(Ordering::SeqCst) {
                return;
            }
            // A failed CAS means a new holder exists and will see the flag.
            if self
                .busy
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }
            let mut guard = QueueGuard { queue: self };
            guard.drain_intake();
            successor = guard.take_pending_wake();
            // The bit is cleared at the top of the loop.
            std::mem::forget(guard);
        }
    }

    /// Takes the whole intake stack, oldest arrival first.
    fn take_intake(&self) -> Vec<Arc<Arrival>> {
        let mut top = self.intake.swap(ptr::null_mut(), Ordering::SeqCst);
        let mut arrivals = Vec::new();
        while !top.is_null() {
            // Safety: every pointer on the stack came from `Arc::into_raw` in
            // `enqueue`, and the swap above took each one exactly once.
            let arrival = unsafe { Arc::from_raw(top) };
            top = arrival.next.load(Ordering::Relaxed);
            arrivals.push(arrival);
        }
        arrivals.reverse();
        arrivals
    }

    /// Number of waiters in the wait list or the intake. Advisory under
    /// concurrency.
    #[inline]
    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

impl Drop for WaitQueue {
    fn drop(&mut self) {
        drop(self.take_intake());
    }
}

/// Exclusive access to the queue links; releases the queue bit on drop.
pub(crate) struct QueueGuard<'a> {
    queue: &'a WaitQueue,
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        self.queue.unlock();
    }
}

impl QueueGuard<'_> {
    fn links(&mut self) -> &mut Links {
        // Safety: this guard holds the queue bit, so no other reference to
        // the links exists; `&mut self` prevents aliasing within the guard.
        unsafe { &mut *self.queue.links.get() }
    }

    fn links_ref(&self) -> &Links {
        // Safety: as in `links`; shared borrow of the guard, shared access.
        unsafe { &*self.queue.links.get() }
    }

    /// Links every announced arrival at the wait list tail, in push order.
    fn drain_intake(&mut self) {
        for arrival in self.queue.take_intake() {
            let links = self.links();
            let id = links.nodes.insert(WaitNode::new(
                arrival.thread.clone(),
                NodeStatus::Waiting,
                Membership::Wait,
            ));
            links.wait.push_back(&mut links.nodes, id);
            arrival.node.store(id.to_bits(), Ordering::Release);
        }
    }

    /// Node id of `arrival`.
    ///
    /// Every guard drains the intake when it is taken, so an arrival pushed
    /// before the guard already has its node.
    pub(crate) fn admit(&mut self, arrival: &Arrival) -> NodeId {
        loop {
            if let Some(id) = arrival.node() {
                return id;
            }
            self.drain_intake();
        }
    }

    /// First waiter, if a releaser left a wake for this holder.
    fn take_pending_wake(&mut self) -> Option<ThreadHandle> {
        if self.queue.wake_pending.swap(false, Ordering::SeqCst) {
            self.first_waiter()
        } else {
            None
        }
    }

    /// True if `node` is the first node of the wait list.
    #[inline]
    pub(crate) fn is_first(&self, node: NodeId) -> bool {
        self.links_ref().wait.first == Some(node)
    }

    /// Handle of the first waiter, to be unparked after the guard drops.
    pub(crate) fn first_waiter(&self) -> Option<ThreadHandle> {
        let links = self.links_ref();
        let first = links.wait.first?;
        links.nodes.get(first).map(|node| node.thread.clone())
    }

    pub(crate) fn status(&self, node: NodeId) -> Option<NodeStatus> {
        self.links_ref().nodes.get(node).map(|node| node.status)
    }

    /// Unlinks `node` from its list and frees it.
    pub(crate) fn remove(&mut self, node: NodeId) -> Option<WaitNode> {
        let links = self.links();
        let membership = links.detach(node)?;
        let removed = links.nodes.remove(node);
        if membership == Membership::Wait {
            self.queue.queued.fetch_sub(1, Ordering::SeqCst);
        }
        removed
    }

    /// Marks `node` cancelled and removes it.
    ///
    /// Returns the new first waiter when the cancelled node was first, so
    /// the caller can wake it and the queue does not stall behind a lock
    /// that may already be free.
    pub(crate) fn cancel(&mut self, node: NodeId) -> Option<ThreadHandle> {
        let was_first = self.is_first(node);
        if let Some(entry) = self.links().nodes.get_mut(node) {
            entry.status = NodeStatus::Cancelled;
        }
        self.remove(node);
        if was_first { self.first_waiter() } else { None }
    }

    /// Live nodes across the wait list and every condition list.
    pub(crate) fn node_count(&self) -> usize {
        self.links_ref().nodes.len()
    }

    /// Tokens of the threads in the wait list, first to last.
    pub(crate) fn queued_threads(&self) -> Vec<ThreadToken> {
        let links = self.links_ref();
        links
            .wait
            .iter(&links.nodes)
            .filter_map(|id| links.nodes.get(id))
            .map(|node| node.thread.token())
            .collect()
    }

    /// Allocates an empty condition list.
    pub(crate) fn create_condition(&mut self) -> ConditionId {
        self.links().conditions.insert(NodeList::default())
    }

    /// Frees a condition list, dropping any nodes still parked on it.
    pub(crate) fn drop_condition(&mut self, cond: ConditionId) {
        let links = self.links();
        let Some(list) = links.conditions.remove(cond) else {
            return;
        };
        let stranded: Vec<NodeId> = list.iter(&links.nodes).collect();
        for id in stranded {
            links.nodes.remove(id);
        }
    }

    /// Appends a `Condition` node for `thread` to `cond`'s list.
    pub(crate) fn enqueue_condition(
        &mut self,
        cond: ConditionId,
        thread: ThreadHandle,
    ) -> Option<NodeId> {
        let links = self.links();
        if !links.conditions.contains(cond) {
            return None;
        }
        let id = links.nodes.insert(WaitNode::new(
            thread,
            NodeStatus::Condition,
            Membership::Condition(cond),
        ));
        let Links {
            nodes, conditions, ..
        } = links;
        if let Some(list) = conditions.get_mut(cond) {
            list.push_back(nodes, id);
        }
        Some(id)
    }

    /// Moves the first node of `cond` to the wait list. Returns false if the
    /// condition had no waiters.
    pub(crate) fn signal_first(&mut self, cond: ConditionId) -> bool {
        let first = self.links_ref().conditions.get(cond).and_then(|list| list.first);
        match first {
            Some(id) => {
                self.transfer(id);
                true
            }
            None => false,
        }
    }

    /// Moves every node of `cond` to the wait list, preserving order.
    pub(crate) fn signal_all(&mut self, cond: ConditionId) -> usize {
        let mut moved = 0;
        while self.signal_first(cond) {
            moved += 1;
        }
        moved
    }

    /// Moves `node` to the wait list if it is still parked on a condition.
    ///
    /// Used by a condition waiter that timed out or was interrupted. Returns
    /// false if a signal already transferred the node.
    pub(crate) fn transfer_cancelled(&mut self, node: NodeId) -> bool {
        if self.status(node) != Some(NodeStatus::Condition) {
            return false;
        }
        self.transfer(node);
        true
    }

    fn transfer(&mut self, node: NodeId) {
        let links = self.links();
        links.detach(node);
        links.attach_transferred(node);
        self.queue.queued.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of nodes parked on `cond`, or `None` for an unknown condition.
    pub(crate) fn condition_len(&self, cond: ConditionId) -> Option<usize> {
        self.links_ref().conditions.get(cond).map(|list| list.len)
    }
}
