//! Registry of tracked tasks.
//!
//! Owned by the scheduler behind one mutex. The lock is never held while a
//! task callback runs: the task body is lent out of its entry for the
//! duration of the call (`body == None`) and returned afterwards.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use tracing::{info, warn};

use super::thread_adapter::ThreadAdapter;
use crate::runtime::dag::{Excluded, Exclusion, TaskGraph};
use crate::runtime::task::{Order, Task, TaskFlags, TaskId, TaskKind, TaskState};

/// Executable part of an entry.
pub(crate) enum Body {
    /// Ticked by the scheduler in dependency order.
    Cooperative(Box<dyn Task>),
    /// Ticked by its own worker thread.
    Threaded(ThreadAdapter),
}

/// Suspend/resume requested while the task was lent out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Suspend,
    Resume,
}

pub(crate) struct Entry {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) order: Order,
    pub(crate) kind: TaskKind,
    pub(crate) flags: TaskFlags,
    /// Scheduler-side state; thread tasks refine it through their adapter.
    pub(crate) state: TaskState,
    pub(crate) pending_removal: bool,
    pub(crate) deferred: Option<Transition>,
    pub(crate) body: Option<Body>,
}

impl Entry {
    /// Effective lifecycle state.
    pub(crate) fn current_state(&self) -> TaskState {
        match (&self.body, self.state) {
            (_, TaskState::Stopped) => TaskState::Stopped,
            (Some(Body::Threaded(adapter)), _) => adapter.state().task_state(),
            (_, state) => state,
        }
    }

    /// Check if the task may be ticked this cycle.
    pub(crate) fn is_ready(&self) -> bool {
        self.state == TaskState::Running
            && !self.pending_removal
            && matches!(self.body, Some(Body::Cooperative(_)))
    }
}

/// Read-only snapshot of a tracked task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub order: Order,
    pub kind: TaskKind,
    pub flags: TaskFlags,
    pub state: TaskState,
    pub pending_removal: bool,
    /// Declared dependencies, including removed ones.
    pub dependencies: Vec<TaskId>,
}

#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) entries: IndexMap<TaskId, Entry>,
    pub(crate) names: HashMap<String, TaskId>,
    /// Every task sorted by (order, id).
    pub(crate) ordered: BTreeSet<(Order, TaskId)>,
    pub(crate) graph: TaskGraph,
    /// Exclusions reported by the previous tick.
    reported: HashMap<TaskId, Exclusion>,
}

impl Registry {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn insert(
        &mut self,
        entry: Entry,
    ) {
        if !entry.flags.is_thread() {
            // Ids are fresh, so the node cannot already exist.
            let _ = self.graph.add_node(entry.id, entry.order);
        }
        self.names.insert(entry.name.clone(), entry.id);
        self.ordered.insert((entry.order, entry.id));
        self.entries.insert(entry.id, entry);
    }

    pub(crate) fn remove(
        &mut self,
        id: TaskId,
    ) -> Option<Entry> {
        let entry = self.entries.shift_remove(&id)?;
        self.names.remove(&entry.name);
        self.ordered.remove(&(entry.order, id));
        if self.graph.contains(id) {
            let _ = self.graph.remove_node(id);
        }
        self.reported.remove(&id);
        Some(entry)
    }

    pub(crate) fn set_order(
        &mut self,
        id: TaskId,
        order: Order,
    ) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        self.ordered.remove(&(entry.order, id));
        entry.order = order;
        self.ordered.insert((order, id));
        if self.graph.contains(id) {
            let _ = self.graph.set_order(id, order);
        }
    }

    pub(crate) fn info(
        &self,
        entry: &Entry,
    ) -> TaskInfo {
        TaskInfo {
            id: entry.id,
            name: entry.name.clone(),
            order: entry.order,
            kind: entry.kind,
            flags: entry.flags,
            state: entry.current_state(),
            pending_removal: entry.pending_removal,
            dependencies: self.graph.dependencies_of(entry.id),
        }
    }

    /// Log exclusions that changed since the previous tick.
    pub(crate) fn report_exclusions(
        &mut self,
        excluded: &[Excluded],
    ) {
        let mut current = HashMap::with_capacity(excluded.len());
        for item in excluded {
            if self.reported.get(&item.task) != Some(&item.reason) {
                let name = self.name_of(item.task);
                match &item.reason {
                    Exclusion::Cycle => {
                        warn!(task = %name, id = %item.task, "circular dependency; task skipped")
                    }
                    Exclusion::MissingDependency(missing) => warn!(
                        task = %name,
                        id = %item.task,
                        missing = ?missing,
                        "dependency no longer registered; task skipped"
                    ),
                    Exclusion::Blocked(by) => {
                        warn!(task = %name, id = %item.task, blocked_by = %by, "task skipped")
                    }
                }
            }
            current.insert(item.task, item.reason.clone());
        }

        for id in self.reported.keys() {
            if !current.contains_key(id) && self.entries.contains_key(id) {
                info!(task = %self.name_of(*id), id = %id, "task back in schedule");
            }
        }
        self.reported = current;
    }

    fn name_of(
        &self,
        id: TaskId,
    ) -> &str {
        self.entries
            .get(&id)
            .map(|e| e.name.as_str())
            .unwrap_or("?")
    }
}
