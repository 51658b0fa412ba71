//! Closure-backed tasks.
//!
//! [`TaskBuilder`] assembles a [`FnTask`] from a tick closure plus optional
//! lifecycle hooks, so small tasks don't need a dedicated type.
//!
//! ```
//! use tickwork::runtime::task::{Task, TaskBuilder};
//!
//! let mut frames = 0u32;
//! let mut task = TaskBuilder::new("counter").build(move || {
//!     frames += 1;
//!     Ok(())
//! });
//! assert_eq!(task.name(), "counter");
//! assert!(task.tick().is_ok());
//! ```

use super::{Task, TaskId, TaskKind, TaskResult};

type Hook = Box<dyn FnMut() -> TaskResult + Send>;
type AddHook = Box<dyn FnMut(TaskId) -> TaskResult + Send>;
type StopHook = Box<dyn FnMut() + Send>;

/// A task whose callbacks are closures.
pub struct FnTask {
    name: String,
    kind: TaskKind,
    tick: Hook,
    on_add: Option<AddHook>,
    on_start: Option<Hook>,
    on_suspend: Option<Hook>,
    on_resume: Option<Hook>,
    on_stop: Option<StopHook>,
}

impl std::fmt::Debug for FnTask {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FnTask")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl FnTask {
    /// Create a user task that only ticks.
    pub fn new<F>(
        name: impl Into<String>,
        tick: F,
    ) -> Self
    where
        F: FnMut() -> TaskResult + Send + 'static,
    {
        TaskBuilder::new(name).build(tick)
    }
}

fn run_hook(hook: &mut Option<Hook>) -> TaskResult {
    match hook {
        Some(hook) => hook(),
        None => Ok(()),
    }
}

impl Task for FnTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn on_add(
        &mut self,
        id: TaskId,
    ) -> TaskResult {
        match &mut self.on_add {
            Some(hook) => hook(id),
            None => Ok(()),
        }
    }

    fn on_start(&mut self) -> TaskResult {
        run_hook(&mut self.on_start)
    }

    fn tick(&mut self) -> TaskResult {
        (self.tick)()
    }

    fn on_suspend(&mut self) -> TaskResult {
        run_hook(&mut self.on_suspend)
    }

    fn on_resume(&mut self) -> TaskResult {
        run_hook(&mut self.on_resume)
    }

    fn on_stop(&mut self) {
        if let Some(hook) = &mut self.on_stop {
            hook();
        }
    }
}

/// Builder for [`FnTask`].
pub struct TaskBuilder {
    name: String,
    kind: TaskKind,
    on_add: Option<AddHook>,
    on_start: Option<Hook>,
    on_suspend: Option<Hook>,
    on_resume: Option<Hook>,
    on_stop: Option<StopHook>,
}

impl TaskBuilder {
    /// Create a new task builder.
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TaskKind::User,
            on_add: None,
            on_start: None,
            on_suspend: None,
            on_resume: None,
            on_stop: None,
        }
    }

    /// Set the task kind.
    #[inline]
    pub fn kind(
        mut self,
        kind: TaskKind,
    ) -> Self {
        self.kind = kind;
        self
    }

    /// Set the registration hook. An error vetoes the registration.
    pub fn on_add<F>(
        mut self,
        hook: F,
    ) -> Self
    where
        F: FnMut(TaskId) -> TaskResult + Send + 'static,
    {
        self.on_add = Some(Box::new(hook));
        self
    }

    /// Set the start hook.
    pub fn on_start<F>(
        mut self,
        hook: F,
    ) -> Self
    where
        F: FnMut() -> TaskResult + Send + 'static,
    {
        self.on_start = Some(Box::new(hook));
        self
    }

    /// Set the suspend hook.
    pub fn on_suspend<F>(
        mut self,
        hook: F,
    ) -> Self
    where
        F: FnMut() -> TaskResult + Send + 'static,
    {
        self.on_suspend = Some(Box::new(hook));
        self
    }

    /// Set the resume hook.
    pub fn on_resume<F>(
        mut self,
        hook: F,
    ) -> Self
    where
        F: FnMut() -> TaskResult + Send + 'static,
    {
        self.on_resume = Some(Box::new(hook));
        self
    }

    /// Set the teardown hook.
    pub fn on_stop<F>(
        mut self,
        hook: F,
    ) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on_stop = Some(Box::new(hook));
        self
    }

    /// Build the task with the given tick closure.
    pub fn build<F>(
        self,
        tick: F,
    ) -> FnTask
    where
        F: FnMut() -> TaskResult + Send + 'static,
    {
        FnTask {
            name: self.name,
            kind: self.kind,
            tick: Box::new(tick),
            on_add: self.on_add,
            on_start: self.on_start,
            on_suspend: self.on_suspend,
            on_resume: self.on_resume,
            on_stop: self.on_stop,
        }
    }
}
