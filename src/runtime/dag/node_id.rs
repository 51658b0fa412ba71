//! Node ID for the task graph
//!
//! Represents a slot in the graph arena. Unlike [`TaskId`], a `NodeId` is
//! recycled once its node is removed, so it must never leak out of the
//! graph's owner.
//!
//! [`TaskId`]: crate::runtime::task::TaskId

use std::fmt;

/// Index of a node in the [`TaskGraph`](super::TaskGraph) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Returns the arena index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}
