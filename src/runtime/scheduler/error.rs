//! Scheduler errors.
//!
//! Every registry operation returns a [`SchedulerError`] synchronously.
//! Failures inside task callbacks during a tick are logged instead and never
//! surface here.

use thiserror::Error;

use crate::runtime::task::{TaskId, TaskState};

/// Lifecycle callback that was running when a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Add,
    Start,
    Tick,
    Suspend,
    Resume,
    Stop,
}

impl std::fmt::Display for Stage {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            Stage::Add => "on_add",
            Stage::Start => "on_start",
            Stage::Tick => "tick",
            Stage::Suspend => "on_suspend",
            Stage::Resume => "on_resume",
            Stage::Stop => "on_stop",
        };
        f.write_str(name)
    }
}

/// Why an operation was refused for lack of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forbidden {
    /// The operation targets a SYSTEM-kind task.
    SystemTask,
    /// The requested order lies in the reserved range.
    ReservedOrder(i32),
}

impl std::fmt::Display for Forbidden {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Forbidden::SystemTask => write!(f, "system task"),
            Forbidden::ReservedOrder(order) => write!(f, "reserved order {}", order),
        }
    }
}

/// Errors produced by the scheduler.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A task with the same name is already tracked.
    #[error("a task named `{name}` is already registered as {existing}")]
    Duplicate { name: String, existing: TaskId },

    /// A shutdown is draining the scheduler.
    #[error("`{name}` refused: scheduler is shutting down")]
    ShuttingDown { name: String },

    /// No task with this id is tracked.
    #[error("{id} not found")]
    NotFound { id: TaskId },

    /// The operation needs privileged access.
    #[error("`{name}`: {reason} requires privileged access")]
    Forbidden { name: String, reason: Forbidden },

    /// The task depends on itself, directly or transitively.
    #[error("circular dependency: {}", format_path(.path))]
    CircularDependency { path: Vec<TaskId> },

    /// A declared dependency was removed without removing its dependent.
    #[error("{id} depends on removed task(s) {missing:?}")]
    TaskMissing { id: TaskId, missing: Vec<TaskId> },

    /// `on_add` vetoed the registration.
    #[error("`{name}` rejected its registration: {source}")]
    Rejected {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A lifecycle callback returned an error; the transition was aborted.
    #[error("`{name}` {stage} failed: {source}")]
    Lifecycle {
        name: String,
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    /// A lifecycle callback panicked.
    #[error("`{name}` {stage} panicked: {message}")]
    Internal {
        name: String,
        stage: Stage,
        message: String,
    },

    /// The task is not in a state that allows the operation.
    #[error("{id} is {state}")]
    InvalidState { id: TaskId, state: TaskState },

    /// Thread tasks do not take part in the dependency graph.
    #[error("{id} runs on its own thread and cannot take part in dependencies")]
    ThreadExempt { id: TaskId },

    /// The worker thread could not be spawned.
    #[error("failed to spawn thread for `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl SchedulerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedulerError::Duplicate { .. } => "rejected_duplicate",
            SchedulerError::ShuttingDown { .. } => "shutting_down",
            SchedulerError::NotFound { .. } => "not_found",
            SchedulerError::Forbidden { .. } => "forbidden",
            SchedulerError::CircularDependency { .. } => "circular_dependency",
            SchedulerError::TaskMissing { .. } => "task_missing",
            SchedulerError::Rejected { .. } => "rejected",
            SchedulerError::Lifecycle { .. } => "lifecycle_failed",
            SchedulerError::Internal { .. } => "internal_error",
            SchedulerError::InvalidState { .. } => "invalid_state",
            SchedulerError::ThreadExempt { .. } => "thread_exempt",
            SchedulerError::Spawn { .. } => "spawn_failed",
        }
    }
}

/// Outcome of a guarded lifecycle call.
#[derive(Debug)]
pub(crate) enum CallFailure {
    Failed(anyhow::Error),
    Panicked(String),
}

impl CallFailure {
    pub(crate) fn into_error(
        self,
        name: &str,
        stage: Stage,
    ) -> SchedulerError {
        match self {
            CallFailure::Failed(source) if stage == Stage::Add => SchedulerError::Rejected {
                name: name.to_string(),
                source,
            },
            CallFailure::Failed(source) => SchedulerError::Lifecycle {
                name: name.to_string(),
                stage,
                source,
            },
            CallFailure::Panicked(message) => SchedulerError::Internal {
                name: name.to_string(),
                stage,
                message,
            },
        }
    }
}

impl std::fmt::Display for CallFailure {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            CallFailure::Failed(e) => write!(f, "{:#}", e),
            CallFailure::Panicked(msg) => write!(f, "panicked: {}", msg),
        }
    }
}
