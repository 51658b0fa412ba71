//! Per-tick batch resolution
//!
//! Computes one execution batch from the ready subset of the graph with an
//! iterative topological sort (Kahn). Among tasks that become ready at the
//! same time, the smaller [`Order`] goes first, then the smaller id.
//!
//! Edges to tasks that are not ready this tick (paused, not started, not in
//! the graph at all) count as satisfied: those tasks do no work this tick.
//!
//! Tasks that can never be released are excluded rather than failing the
//! whole tick:
//!
//! - [`Exclusion::Cycle`]: the task lies on a dependency cycle
//! - [`Exclusion::MissingDependency`]: a declared dependency was removed
//! - [`Exclusion::Blocked`]: the task waits on another excluded task

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use smallvec::SmallVec;

use super::graph::TaskGraph;
use super::node_id::NodeId;
use crate::runtime::task::{Order, TaskId};

/// Why a ready task was left out of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    /// The task depends on itself, directly or transitively.
    Cycle,
    /// Declared dependencies that are no longer registered.
    MissingDependency(SmallVec<[TaskId; 2]>),
    /// The task depends on this other excluded task.
    Blocked(TaskId),
}

impl Exclusion {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Exclusion::Cycle => "circular_dependency",
            Exclusion::MissingDependency(_) => "task_missing",
            Exclusion::Blocked(_) => "blocked",
        }
    }
}

/// A task excluded from the current batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excluded {
    /// The excluded task.
    pub task: TaskId,
    /// Why it was excluded.
    pub reason: Exclusion,
}

/// Outcome of one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Tasks to run, dependencies before dependents.
    pub batch: Vec<TaskId>,
    /// Ready tasks that could not be scheduled.
    pub excluded: Vec<Excluded>,
}

impl TaskGraph {
    /// Resolve one batch from the tasks for which `is_ready` holds.
    pub fn resolve<F>(
        &self,
        is_ready: F,
    ) -> Resolution
    where
        F: Fn(TaskId) -> bool,
    {
        let slots = self.slot_count();
        let mut ready = vec![false; slots];
        let mut indegree = vec![0usize; slots];
        let mut emitted = vec![false; slots];
        let mut heap: BinaryHeap<Reverse<(Order, TaskId, NodeId)>> = BinaryHeap::new();

        for (id, node) in self.nodes() {
            ready[id.index()] = is_ready(node.task());
        }

        for (id, node) in self.nodes() {
            if !ready[id.index()] {
                continue;
            }
            let mut pending = node
                .dependencies()
                .iter()
                .filter(|dep| ready[dep.index()])
                .count();
            // A removed dependency never completes.
            if !node.missing().is_empty() {
                pending += 1;
            }
            indegree[id.index()] = pending;
            if pending == 0 {
                heap.push(Reverse((node.order(), node.task(), id)));
            }
        }

        let mut batch = Vec::new();
        while let Some(Reverse((_, task, id))) = heap.pop() {
            emitted[id.index()] = true;
            batch.push(task);

            let Some(node) = self.get(id) else { continue };
            for &dependent in node.dependents() {
                if !ready[dependent.index()] || emitted[dependent.index()] {
                    continue;
                }
                let remaining = &mut indegree[dependent.index()];
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    if let Some(parent) = self.get(dependent) {
                        heap.push(Reverse((parent.order(), parent.task(), dependent)));
                    }
                }
            }
        }

        let leftover: Vec<bool> = (0..slots).map(|i| ready[i] && !emitted[i]).collect();
        let mut excluded = Vec::new();
        for (id, node) in self.nodes() {
            if !leftover[id.index()] {
                continue;
            }
            let reason = if !node.missing().is_empty() {
                Exclusion::MissingDependency(node.missing().iter().copied().collect())
            } else if self.on_cycle(id, &leftover) {
                Exclusion::Cycle
            } else {
                let blocker = node
                    .dependencies()
                    .iter()
                    .find(|dep| leftover[dep.index()])
                    .and_then(|dep| self.get(*dep))
                    .map(|dep| dep.task())
                    .unwrap_or(node.task());
                Exclusion::Blocked(blocker)
            };
            excluded.push(Excluded {
                task: node.task(),
                reason,
            });
        }
        excluded.sort_by_key(|e| e.task);

        Resolution { batch, excluded }
    }

    /// Check if `start` can reach itself through leftover nodes.
    fn on_cycle(
        &self,
        start: NodeId,
        leftover: &[bool],
    ) -> bool {
        let mut visited = vec![false; leftover.len()];
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else { continue };
            for &dep in node.dependencies() {
                if dep == start {
                    return true;
                }
                if leftover[dep.index()] && !visited[dep.index()] {
                    visited[dep.index()] = true;
                    stack.push(dep);
                }
            }
        }

        false
    }
}
