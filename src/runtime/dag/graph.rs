//! Task graph arena
//!
//! Nodes live in a `Vec` of slots; edges are slot indices. Freed slots are
//! recycled, so the graph also keeps a `TaskId → NodeId` index and callers
//! address nodes by task id.

use std::collections::HashMap;

use super::node::DagNode;
use super::node_id::NodeId;
use crate::runtime::task::{Order, TaskId};

/// Errors raised while editing the graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    /// The task has no node in this graph.
    #[error("{0} is not part of the task graph")]
    UnknownTask(TaskId),
    /// The task already has a node.
    #[error("{0} is already part of the task graph")]
    AlreadyPresent(TaskId),
}

/// Arena of task nodes with index-based dependency edges.
#[derive(Debug, Default)]
pub struct TaskGraph {
    slots: Vec<Option<DagNode>>,
    free: Vec<NodeId>,
    index: HashMap<TaskId, NodeId>,
}

impl TaskGraph {
    /// Create an empty graph.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the graph has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Check if the task has a node.
    #[inline]
    pub fn contains(
        &self,
        task: TaskId,
    ) -> bool {
        self.index.contains_key(&task)
    }

    /// Get the node of a task.
    pub fn node(
        &self,
        task: TaskId,
    ) -> Option<&DagNode> {
        self.index.get(&task).and_then(|id| self.get(*id))
    }

    #[inline]
    pub(crate) fn get(
        &self,
        id: NodeId,
    ) -> Option<&DagNode> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    #[inline]
    fn get_mut(
        &mut self,
        id: NodeId,
    ) -> Option<&mut DagNode> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    #[inline]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = (NodeId, &DagNode)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|node| (NodeId(i), node)))
    }

    fn node_id(
        &self,
        task: TaskId,
    ) -> Result<NodeId, DagError> {
        self.index
            .get(&task)
            .copied()
            .ok_or(DagError::UnknownTask(task))
    }

    /// Add a node for a task.
    pub fn add_node(
        &mut self,
        task: TaskId,
        order: Order,
    ) -> Result<NodeId, DagError> {
        if self.index.contains_key(&task) {
            return Err(DagError::AlreadyPresent(task));
        }

        let node = DagNode::new(task, order);
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id.index()] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        };
        self.index.insert(task, id);
        Ok(id)
    }

    /// Remove a task's node.
    ///
    /// Every dependent that still referenced the task keeps a "missing"
    /// marker instead of the edge, so it stays excluded until the caller
    /// drops the dependency explicitly.
    pub fn remove_node(
        &mut self,
        task: TaskId,
    ) -> Result<DagNode, DagError> {
        let id = self.node_id(task)?;
        let node = self.slots[id.index()]
            .take()
            .ok_or(DagError::UnknownTask(task))?;
        self.index.remove(&task);
        self.free.push(id);

        for &dependency in node.dependencies() {
            if let Some(dep) = self.get_mut(dependency) {
                dep.remove_dependent(id);
            }
        }
        for &dependent in node.dependents() {
            if let Some(parent) = self.get_mut(dependent) {
                parent.remove_dependency(id);
                parent.add_missing(task);
            }
        }

        Ok(node)
    }

    /// Declare that `task` depends on `dependency`.
    ///
    /// Returns `Ok(false)` if the edge already existed. Self edges are
    /// accepted; resolution reports them as cycles.
    pub fn add_edge(
        &mut self,
        task: TaskId,
        dependency: TaskId,
    ) -> Result<bool, DagError> {
        let from = self.node_id(task)?;
        let to = self.node_id(dependency)?;

        if self.get(from).is_some_and(|node| node.depends_on(to)) {
            return Ok(false);
        }
        if let Some(node) = self.get_mut(from) {
            node.add_dependency(to);
        }
        if let Some(node) = self.get_mut(to) {
            node.add_dependent(from);
        }
        Ok(true)
    }

    /// Drop a dependency, whether it is a live edge or a missing marker.
    ///
    /// Returns `Ok(false)` if no such dependency was declared.
    pub fn remove_edge(
        &mut self,
        task: TaskId,
        dependency: TaskId,
    ) -> Result<bool, DagError> {
        let from = self.node_id(task)?;

        if let Some(to) = self.index.get(&dependency).copied() {
            let removed = self
                .get_mut(from)
                .is_some_and(|node| node.remove_dependency(to));
            if removed {
                if let Some(node) = self.get_mut(to) {
                    node.remove_dependent(from);
                }
            }
            return Ok(removed);
        }

        Ok(self
            .get_mut(from)
            .is_some_and(|node| node.remove_missing(dependency)))
    }

    /// Update the execution order of a node.
    pub fn set_order(
        &mut self,
        task: TaskId,
        order: Order,
    ) -> Result<(), DagError> {
        let id = self.node_id(task)?;
        if let Some(node) = self.get_mut(id) {
            node.set_order(order);
        }
        Ok(())
    }

    /// Declared dependencies of a task, live ones first, then missing ones.
    pub fn dependencies_of(
        &self,
        task: TaskId,
    ) -> Vec<TaskId> {
        let Some(node) = self.node(task) else {
            return Vec::new();
        };
        node.dependencies()
            .iter()
            .filter_map(|id| self.get(*id).map(DagNode::task))
            .chain(node.missing().iter().copied())
            .collect()
    }

    /// Find a dependency cycle that runs through `task`, if any.
    ///
    /// The returned path starts and ends with `task`.
    pub fn cycle_through(
        &self,
        task: TaskId,
    ) -> Option<Vec<TaskId>> {
        let start = self.index.get(&task).copied()?;
        let mut visited = vec![false; self.slots.len()];
        // (node, next edge to explore)
        let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];

        while let Some((current, edge)) = stack.last().copied() {
            let node = self.get(current)?;
            match node.dependencies().get(edge) {
                Some(&next) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    if next == start {
                        let mut path: Vec<TaskId> = stack
                            .iter()
                            .filter_map(|(id, _)| self.get(*id).map(DagNode::task))
                            .collect();
                        path.push(task);
                        return Some(path);
                    }
                    if !visited[next.index()] {
                        visited[next.index()] = true;
                        stack.push((next, 0));
                    }
                }
                None => {
                    stack.pop();
                }
            }
        }

        None
    }
}
