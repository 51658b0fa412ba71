//! Minimal task that does nothing.

use super::{Task, TaskKind, TaskResult};

/// A task whose callbacks all succeed without doing anything.
///
/// Useful as an aggregation anchor: make it depend on a group of tasks and
/// it runs after every member of the group each cycle.
#[derive(Debug, Clone)]
pub struct NoopTask {
    name: String,
    kind: TaskKind,
}

impl NoopTask {
    /// Create a user-kind no-op task.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TaskKind::User,
        }
    }

    /// Create a system-kind no-op task.
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TaskKind::System,
        }
    }
}

impl Task for NoopTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn tick(&mut self) -> TaskResult {
        Ok(())
    }
}
