//! DAG Node for the task graph
//!
//! One node per cooperative task, holding index-based edges in both
//! directions plus markers for dependencies that were removed.

use std::fmt;

use smallvec::SmallVec;

use super::node_id::NodeId;
use crate::runtime::task::{Order, TaskId};

/// Edge list; most tasks declare only a handful of dependencies.
pub type Edges = SmallVec<[NodeId; 4]>;

/// A node in the task graph.
#[derive(Debug, Clone, PartialEq)]
pub struct DagNode {
    /// Task this node stands for
    task: TaskId,

    /// Execution order of the task
    order: Order,

    /// Nodes this node depends on (must run first)
    dependencies: Edges,

    /// Nodes that depend on this node
    dependents: Edges,

    /// Dependencies that were removed while this node still referenced them
    missing: SmallVec<[TaskId; 2]>,
}

impl DagNode {
    /// Create a node without edges.
    #[inline]
    pub fn new(
        task: TaskId,
        order: Order,
    ) -> Self {
        Self {
            task,
            order,
            dependencies: Edges::new(),
            dependents: Edges::new(),
            missing: SmallVec::new(),
        }
    }

    /// Get the task id.
    #[inline]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Get the execution order.
    #[inline]
    pub fn order(&self) -> Order {
        self.order
    }

    #[inline]
    pub(crate) fn set_order(
        &mut self,
        order: Order,
    ) {
        self.order = order;
    }

    /// Nodes this node depends on.
    #[inline]
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Nodes that depend on this node.
    #[inline]
    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    /// Removed dependencies still declared by this node.
    #[inline]
    pub fn missing(&self) -> &[TaskId] {
        &self.missing
    }

    /// Check if this node depends on the given node.
    #[inline]
    pub fn depends_on(
        &self,
        node_id: NodeId,
    ) -> bool {
        self.dependencies.contains(&node_id)
    }

    pub(crate) fn add_dependency(
        &mut self,
        dependency: NodeId,
    ) {
        self.dependencies.push(dependency);
    }

    pub(crate) fn add_dependent(
        &mut self,
        dependent: NodeId,
    ) {
        self.dependents.push(dependent);
    }

    pub(crate) fn remove_dependency(
        &mut self,
        dependency: NodeId,
    ) -> bool {
        let before = self.dependencies.len();
        self.dependencies.retain(|id| *id != dependency);
        before != self.dependencies.len()
    }

    pub(crate) fn remove_dependent(
        &mut self,
        dependent: NodeId,
    ) {
        self.dependents.retain(|id| *id != dependent);
    }

    pub(crate) fn add_missing(
        &mut self,
        task: TaskId,
    ) {
        if !self.missing.contains(&task) {
            self.missing.push(task);
        }
    }

    pub(crate) fn remove_missing(
        &mut self,
        task: TaskId,
    ) -> bool {
        let before = self.missing.len();
        self.missing.retain(|id| *id != task);
        before != self.missing.len()
    }

    /// Check if this node has no dependencies at all.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty() && self.missing.is_empty()
    }
}

impl fmt::Display for DagNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DagNode({} @ {})", self.task, self.order)
    }
}
