//! Task classification: permission kind, behaviour flags and lifecycle state.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Permission class of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Built-in task installed by the embedding runtime. Adding, removing,
    /// suspending or resuming it requires privileged access.
    System,
    /// Ordinary task.
    #[default]
    User,
}

impl TaskKind {
    /// Check if this is a system task.
    #[inline]
    pub fn is_system(&self) -> bool {
        matches!(self, TaskKind::System)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            TaskKind::System => write!(f, "system"),
            TaskKind::User => write!(f, "user"),
        }
    }
}

bitflags! {
    /// Behaviour flags passed to [`Scheduler::submit`].
    ///
    /// [`Scheduler::submit`]: crate::runtime::scheduler::Scheduler::submit
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TaskFlags: u8 {
        /// Run `tick` in a loop on a dedicated OS thread.
        const THREAD = 0b0000_0001;
        /// Remove the task right after its first successful `tick`.
        const RUN_ONCE = 0b0000_0010;
    }
}

impl TaskFlags {
    /// Check if the task runs on its own thread.
    #[inline]
    pub fn is_thread(&self) -> bool {
        self.contains(TaskFlags::THREAD)
    }

    /// Check if the task is removed after one successful tick.
    #[inline]
    pub fn is_run_once(&self) -> bool {
        self.contains(TaskFlags::RUN_ONCE)
    }
}

/// Lifecycle state of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Registered but not started (or failed to start).
    Stopped,
    /// Started; ticked every cycle.
    Running,
    /// Suspended; retained but not ticked.
    Paused,
}

impl TaskState {
    /// Check if the task is currently running.
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            TaskState::Stopped => write!(f, "stopped"),
            TaskState::Running => write!(f, "running"),
            TaskState::Paused => write!(f, "paused"),
        }
    }
}
