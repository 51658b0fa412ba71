//! Task definitions for the scheduler.
//!
//! A [`Task`] is a unit of recurring work. The [`Scheduler`] owns every
//! registered task, drives its lifecycle callbacks and calls [`Task::tick`]
//! once per cycle while the task is running.
//!
//! # Lifecycle
//!
//! ```text
//! submit ─► on_add ─► STOPPED ─► on_start ─► RUNNING ◄──► PAUSED
//!                                              │  (on_suspend / on_resume)
//!                                              ▼
//!                                     pending removal ─► on_stop
//! ```
//!
//! [`Scheduler`]: crate::runtime::scheduler::Scheduler

pub mod builder;
pub mod id;
pub mod kind;
pub mod noop;
pub mod order;

pub use builder::{FnTask, TaskBuilder};
pub use id::{TaskId, TaskIdGenerator};
pub use kind::{TaskFlags, TaskKind, TaskState};
pub use noop::NoopTask;
pub use order::Order;

/// Result returned by every fallible task callback.
pub type TaskResult = anyhow::Result<()>;

/// A unit of work driven by the scheduler.
///
/// Only [`name`](Task::name) and [`tick`](Task::tick) are mandatory; every
/// other callback defaults to a successful no-op.
///
/// Side effects (emitting domain events, logging) are the task's own
/// business; the scheduler never inspects task-internal state.
pub trait Task: Send + 'static {
    /// Diagnostic name. Must be unique among the tasks tracked by one scheduler.
    fn name(&self) -> &str;

    /// Permission class of the task.
    fn kind(&self) -> TaskKind {
        TaskKind::User
    }

    /// Called once during registration with the id about to be assigned.
    ///
    /// Returning an error vetoes the registration.
    fn on_add(
        &mut self,
        _id: TaskId,
    ) -> TaskResult {
        Ok(())
    }

    /// Called on the first tick after acceptance.
    fn on_start(&mut self) -> TaskResult {
        Ok(())
    }

    /// One cycle of work.
    fn tick(&mut self) -> TaskResult;

    /// Called when the task moves from RUNNING to PAUSED.
    fn on_suspend(&mut self) -> TaskResult {
        Ok(())
    }

    /// Called when the task moves from PAUSED back to RUNNING.
    fn on_resume(&mut self) -> TaskResult {
        Ok(())
    }

    /// Called exactly once when the scheduler tears the task down.
    fn on_stop(&mut self) {}
}

impl std::fmt::Debug for dyn Task {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}
