//! Wait-queue node records.

use crate::thread::ThreadHandle;
use crate::util::ArenaIndex;

/// Index of a [`WaitNode`] in the lock's arena.
pub(crate) type NodeId = ArenaIndex;
/// Index of a condition's node list in the lock's arena.
pub(crate) type ConditionId = ArenaIndex;

/// Where a node currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeStatus {
    /// In the wait list, competing for the lock.
    Waiting,
    /// Being unlinked after an interruption or timeout.
    Cancelled,
    /// Parked on a condition list.
    Condition,
    /// Moved from a condition list to the wait list; re-acquiring.
    Transferring,
}

impl NodeStatus {
    /// True for statuses whose node belongs to the wait list.
    #[inline]
    pub(crate) const fn in_wait_list(self) -> bool {
        matches!(self, Self::Waiting | Self::Transferring)
    }
}

/// List a node is linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Membership {
    Wait,
    Condition(ConditionId),
}

/// One blocked thread. Linked by arena indices; owned by exactly one list.
#[derive(Debug)]
pub(crate) struct WaitNode {
    pub(crate) thread: ThreadHandle,
    pub(crate) status: NodeStatus,
    pub(crate) membership: Membership,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
}

impl WaitNode {
    pub(crate) fn new(thread: ThreadHandle, status: NodeStatus, membership: Membership) -> Self {
        Self {
            thread,
            status,
            membership,
            prev: None,
            next: None,
        }
    }
}
