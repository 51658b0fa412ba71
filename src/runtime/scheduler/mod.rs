//! Task scheduler
//!
//! The [`Scheduler`] owns every registered task and runs them in cycles.
//! Each [`tick`](Scheduler::tick):
//!
//! 1. starts tasks accepted since the previous cycle (`on_start`),
//! 2. resolves one batch of ready cooperative tasks, dependencies first,
//! 3. calls `tick` on each task of the batch on the calling thread,
//! 4. tears down tasks marked for removal (`on_stop`).
//!
//! Tasks submitted with [`TaskFlags::THREAD`] are ticked by their own worker
//! thread instead (see [`ThreadAdapter`]); the scheduler only starts, stops,
//! suspends and resumes them.
//!
//! All methods take `&self`. Share the scheduler through an `Arc`; task
//! callbacks may call back into it (the registry lock is never held while a
//! callback runs).

pub mod config;
pub mod error;
pub mod event;
pub mod privilege;
pub mod registry;
pub mod stats;
pub mod thread_adapter;

mod lifecycle;

pub use config::SchedulerConfig;
pub use error::{Forbidden, SchedulerError, Stage};
pub use event::{EventSink, LogSink, NullSink, SharedSink, TaskEvent, TaskEventKind};
pub use privilege::PrivilegeGuard;
pub use registry::TaskInfo;
pub use stats::{SchedulerStats, StatsSnapshot};
pub use thread_adapter::{AdapterState, ThreadAdapter};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::runtime::dag::Excluded;
use crate::runtime::task::{Order, Task, TaskFlags, TaskId, TaskIdGenerator, TaskKind, TaskState};
use error::CallFailure;
use lifecycle::{guarded, guarded_unit};
use privilege::Privilege;
use registry::{Body, Entry, Registry, Transition};

/// What happened during one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks started at the beginning of the cycle.
    pub started: Vec<TaskId>,
    /// Cooperative tasks whose `tick` was called, in call order.
    pub ran: Vec<TaskId>,
    /// Ready tasks left out because of a cycle or missing dependency.
    pub excluded: Vec<Excluded>,
    /// Tasks torn down at the end of the cycle.
    pub removed: Vec<TaskId>,
}

/// Dependency-ordered cooperative scheduler with dedicated-thread tasks.
pub struct Scheduler {
    /// Configuration.
    config: SchedulerConfig,
    /// Tracked tasks.
    registry: Mutex<Registry>,
    /// Receiver of transition events.
    sink: SharedSink,
    /// Privileged access switch.
    privilege: Privilege,
    /// Task id generator.
    ids: TaskIdGenerator,
    /// Statistics.
    stats: SchedulerStats,
    /// Set by [`shutdown`](Self::shutdown).
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("tasks", &self.len())
            .field("privileged", &self.is_privileged())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default(), Arc::new(LogSink))
    }
}

impl Scheduler {
    /// Create a scheduler reporting transitions to `sink`.
    pub fn new(
        config: SchedulerConfig,
        sink: SharedSink,
    ) -> Self {
        Self {
            config,
            registry: Mutex::new(Registry::default()),
            sink,
            privilege: Privilege::default(),
            ids: TaskIdGenerator::new(),
            stats: SchedulerStats::default(),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Create a scheduler with the default configuration.
    pub fn with_sink<S>(sink: S) -> Self
    where
        S: EventSink + 'static,
    {
        Self::new(SchedulerConfig::default(), Arc::new(sink))
    }

    /// Get the configuration.
    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Get statistics.
    #[inline]
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Grant privileged access until the guard is dropped.
    ///
    /// Meant for the embedding runtime's bootstrap: privileged access allows
    /// adding, removing, suspending and resuming SYSTEM tasks and using the
    /// reserved order range.
    pub fn privileged(&self) -> PrivilegeGuard<'_> {
        self.privilege.grant()
    }

    /// Check if privileged access is currently granted.
    #[inline]
    pub fn is_privileged(&self) -> bool {
        self.privilege.is_granted()
    }

    /// Number of tracked tasks, including those pending removal.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// Check if no task is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of a task by id.
    pub fn get(
        &self,
        id: TaskId,
    ) -> Option<TaskInfo> {
        let reg = self.registry.lock();
        reg.entries.get(&id).map(|entry| reg.info(entry))
    }

    /// Snapshot of a task by name.
    pub fn find(
        &self,
        name: &str,
    ) -> Option<TaskInfo> {
        let reg = self.registry.lock();
        reg.names
            .get(name)
            .and_then(|id| reg.entries.get(id))
            .map(|entry| reg.info(entry))
    }

    /// Snapshots of every task, sorted by order then id.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        let reg = self.registry.lock();
        reg.ordered
            .iter()
            .filter_map(|(_, id)| reg.entries.get(id))
            .map(|entry| reg.info(entry))
            .collect()
    }

    fn check_access(
        &self,
        name: &str,
        kind: TaskKind,
        order: Order,
    ) -> Result<(), SchedulerError> {
        if self.is_privileged() {
            return Ok(());
        }
        if kind.is_system() {
            return Err(SchedulerError::Forbidden {
                name: name.to_string(),
                reason: Forbidden::SystemTask,
            });
        }
        if order.is_reserved() {
            return Err(SchedulerError::Forbidden {
                name: name.to_string(),
                reason: Forbidden::ReservedOrder(order.value()),
            });
        }
        Ok(())
    }

    /// Register a task.
    ///
    /// The task is started on the next [`tick`](Self::tick). Rejected if its
    /// name is taken, if it is a SYSTEM task or `order` is reserved and
    /// privileged access is not granted, or if `on_add` vetoes it.
    pub fn submit<T: Task>(
        &self,
        task: T,
        order: Order,
        flags: TaskFlags,
    ) -> Result<TaskId, SchedulerError> {
        self.submit_boxed(Box::new(task), order, flags)
    }

    /// Register a boxed task. See [`submit`](Self::submit).
    pub fn submit_boxed(
        &self,
        mut task: Box<dyn Task>,
        order: Order,
        flags: TaskFlags,
    ) -> Result<TaskId, SchedulerError> {
        let name = task.name().to_string();
        let kind = task.kind();

        if self.is_shutting_down() {
            return Err(SchedulerError::ShuttingDown { name });
        }
        if let Err(e) = self.check_access(&name, kind, order) {
            warn!(task = %name, order = %order, kind = %kind, "submit refused: {}", e);
            return Err(e);
        }
        if let Some(&existing) = self.registry.lock().names.get(&name) {
            return Err(SchedulerError::Duplicate { name, existing });
        }

        let id = self.ids.generate();
        if let Err(failure) = guarded(|| task.on_add(id)) {
            let e = failure.into_error(&name, Stage::Add);
            info!(task = %name, "registration vetoed: {}", e);
            return Err(e);
        }

        let mut reg = self.registry.lock();
        // Another thread may have claimed the name, or started a shutdown,
        // while on_add ran.
        let refused = match reg.names.get(&name) {
            Some(&existing) => Some(SchedulerError::Duplicate {
                name: name.clone(),
                existing,
            }),
            None if self.is_shutting_down() => {
                Some(SchedulerError::ShuttingDown { name: name.clone() })
            }
            None => None,
        };
        if let Some(e) = refused {
            drop(reg);
            let _ = guarded_unit(|| task.on_stop());
            return Err(e);
        }

        let body = if flags.is_thread() {
            Body::Threaded(ThreadAdapter::new(id, task, flags.is_run_once()))
        } else {
            Body::Cooperative(task)
        };
        reg.insert(Entry {
            id,
            name: name.clone(),
            order,
            kind,
            flags,
            state: TaskState::Stopped,
            pending_removal: false,
            deferred: None,
            body: Some(body),
        });
        self.stats.update_peak(reg.len());
        drop(reg);

        info!(task = %name, id = %id, order = %order, kind = %kind, "task submitted");
        Ok(id)
    }

    /// Request removal of a task.
    ///
    /// The task is ticked no more; `on_stop` runs at the end of the next
    /// cycle, never in the middle of one.
    pub fn remove(
        &self,
        id: TaskId,
    ) -> Result<(), SchedulerError> {
        let mut reg = self.registry.lock();
        let entry = reg
            .entries
            .get_mut(&id)
            .ok_or(SchedulerError::NotFound { id })?;
        self.check_access(&entry.name, entry.kind, Order::FIRST)?;

        if !entry.pending_removal {
            entry.pending_removal = true;
            if let Some(Body::Threaded(adapter)) = &entry.body {
                adapter.request_stop();
            }
            debug!(task = %entry.name, id = %id, "removal requested");
        }
        Ok(())
    }

    /// Suspend a running task. Suspending a paused task is a no-op.
    ///
    /// A failing `on_suspend` leaves the task running. For thread tasks the
    /// request is posted and takes effect at the worker's next iteration.
    pub fn suspend(
        &self,
        id: TaskId,
    ) -> Result<(), SchedulerError> {
        self.transition(id, Transition::Suspend, true)
    }

    /// Resume a paused task without calling `on_start` again. Resuming a
    /// running task is a no-op.
    pub fn resume(
        &self,
        id: TaskId,
    ) -> Result<(), SchedulerError> {
        self.transition(id, Transition::Resume, true)
    }

    fn transition(
        &self,
        id: TaskId,
        transition: Transition,
        enforce: bool,
    ) -> Result<(), SchedulerError> {
        let (name, mut task) = {
            let mut reg = self.registry.lock();
            let entry = reg
                .entries
                .get_mut(&id)
                .ok_or(SchedulerError::NotFound { id })?;
            if enforce {
                self.check_access(&entry.name, entry.kind, Order::FIRST)?;
            }
            if entry.body.is_none() {
                // Lent out: the task is inside one of its own callbacks,
                // possibly on_start.
                entry.deferred = Some(transition);
                debug!(task = %entry.name, id = %id, ?transition, "transition deferred");
                return Ok(());
            }
            if entry.state == TaskState::Stopped {
                return Err(SchedulerError::InvalidState {
                    id,
                    state: TaskState::Stopped,
                });
            }

            match entry.body.take() {
                Some(Body::Threaded(adapter)) => {
                    let posted = match transition {
                        Transition::Suspend => adapter.suspend(),
                        Transition::Resume => adapter.resume(),
                    };
                    let state = adapter.state().task_state();
                    entry.body = Some(Body::Threaded(adapter));
                    if !posted {
                        return Err(SchedulerError::InvalidState { id, state });
                    }
                    debug!(task = %entry.name, id = %id, ?transition, "request posted to worker");
                    return Ok(());
                }
                None => return Ok(()),
                Some(Body::Cooperative(task)) => {
                    let noop = match transition {
                        Transition::Suspend => entry.state == TaskState::Paused,
                        Transition::Resume => entry.state == TaskState::Running,
                    };
                    if noop {
                        entry.body = Some(Body::Cooperative(task));
                        return Ok(());
                    }
                    (entry.name.clone(), task)
                }
            }
        };

        let (stage, target, kind) = match transition {
            Transition::Suspend => (Stage::Suspend, TaskState::Paused, TaskEventKind::Suspended),
            Transition::Resume => (Stage::Resume, TaskState::Running, TaskEventKind::Resumed),
        };
        let result = guarded(|| match transition {
            Transition::Suspend => task.on_suspend(),
            Transition::Resume => task.on_resume(),
        });

        self.give_back(id, task, |entry| {
            if result.is_ok() {
                entry.state = target;
            }
        });

        match result {
            Ok(()) => {
                info!(task = %name, id = %id, "task {}", kind);
                self.emit(kind, &name, id);
                Ok(())
            }
            Err(failure) => {
                self.stats.record_lifecycle_failure();
                let e = failure.into_error(&name, stage);
                warn!(task = %name, id = %id, "{}", e);
                Err(e)
            }
        }
    }

    /// Return a lent-out cooperative task to its entry, then apply any
    /// transition requested in the meantime.
    fn give_back<F>(
        &self,
        id: TaskId,
        mut task: Box<dyn Task>,
        update: F,
    ) where
        F: FnOnce(&mut Entry),
    {
        let deferred = {
            let mut reg = self.registry.lock();
            match reg.entries.get_mut(&id) {
                Some(entry) => {
                    entry.body = Some(Body::Cooperative(task));
                    update(entry);
                    entry.deferred.take()
                }
                None => {
                    drop(reg);
                    error!(id = %id, "task vanished while lent out; stopping it");
                    let _ = guarded_unit(|| task.on_stop());
                    return;
                }
            }
        };

        if let Some(transition) = deferred {
            // Access was checked when the request was made.
            if let Err(e) = self.transition(id, transition, false) {
                debug!(id = %id, "deferred transition not applied: {}", e);
            }
        }
    }

    /// Move a task to a new order, re-validating the reserved range.
    pub fn change_order(
        &self,
        id: TaskId,
        order: Order,
    ) -> Result<(), SchedulerError> {
        let mut reg = self.registry.lock();
        let entry = reg
            .entries
            .get(&id)
            .ok_or(SchedulerError::NotFound { id })?;
        self.check_access(&entry.name, entry.kind, order)?;
        debug!(task = %entry.name, id = %id, from = %entry.order, to = %order, "order changed");
        reg.set_order(id, order);
        Ok(())
    }

    fn cooperative_pair(
        reg: &Registry,
        task: TaskId,
        dependency: TaskId,
    ) -> Result<(), SchedulerError> {
        for id in [task, dependency] {
            let entry = reg
                .entries
                .get(&id)
                .ok_or(SchedulerError::NotFound { id })?;
            if entry.flags.is_thread() {
                return Err(SchedulerError::ThreadExempt { id });
            }
        }
        Ok(())
    }

    /// Declare that `task` must run after `dependency` in every cycle.
    ///
    /// Cycles, including a task depending on itself, are accepted here and
    /// reported when the batch is resolved.
    pub fn add_dependency(
        &self,
        task: TaskId,
        dependency: TaskId,
    ) -> Result<(), SchedulerError> {
        let mut reg = self.registry.lock();
        Self::cooperative_pair(&reg, task, dependency)?;
        if reg
            .graph
            .add_edge(task, dependency)
            .map_err(|_| SchedulerError::NotFound { id: task })?
        {
            debug!(task = %task, dependency = %dependency, "dependency added");
        }
        Ok(())
    }

    /// Drop a declared dependency, including one on a task that was removed.
    pub fn remove_dependency(
        &self,
        task: TaskId,
        dependency: TaskId,
    ) -> Result<(), SchedulerError> {
        let mut reg = self.registry.lock();
        let entry = reg
            .entries
            .get(&task)
            .ok_or(SchedulerError::NotFound { id: task })?;
        if entry.flags.is_thread() {
            return Err(SchedulerError::ThreadExempt { id: task });
        }
        match reg.graph.remove_edge(task, dependency) {
            Ok(true) => {
                debug!(task = %task, dependency = %dependency, "dependency removed");
                Ok(())
            }
            _ => Err(SchedulerError::NotFound { id: dependency }),
        }
    }

    /// Check whether a task's dependencies can be satisfied.
    ///
    /// Returns [`SchedulerError::TaskMissing`] if a declared dependency was
    /// removed, or [`SchedulerError::CircularDependency`] if the task lies
    /// on a cycle. Thread tasks always pass.
    pub fn check_dependencies(
        &self,
        id: TaskId,
    ) -> Result<(), SchedulerError> {
        let reg = self.registry.lock();
        if !reg.entries.contains_key(&id) {
            return Err(SchedulerError::NotFound { id });
        }
        let Some(node) = reg.graph.node(id) else {
            return Ok(());
        };
        if !node.missing().is_empty() {
            return Err(SchedulerError::TaskMissing {
                id,
                missing: node.missing().to_vec(),
            });
        }
        if let Some(path) = reg.graph.cycle_through(id) {
            return Err(SchedulerError::CircularDependency { path });
        }
        Ok(())
    }

    /// Run one cycle.
    pub fn tick(&self) -> TickReport {
        self.stats.record_tick();
        let mut report = TickReport::default();

        self.start_pending(&mut report);
        self.reap_finished_threads();

        let resolution = {
            let mut reg = self.registry.lock();
            let resolution = {
                let view = &*reg;
                view.graph.resolve(|id| {
                    view.entries
                        .get(&id)
                        .is_some_and(|entry| entry.is_ready())
                })
            };
            reg.report_exclusions(&resolution.excluded);
            resolution
        };
        self.stats.record_exclusions(resolution.excluded.len());

        for id in resolution.batch {
            if self.tick_task(id) {
                report.ran.push(id);
            }
        }
        report.excluded = resolution.excluded;

        self.teardown(&mut report);
        report
    }

    /// Tick one cooperative task. Returns `false` if it was skipped.
    fn tick_task(
        &self,
        id: TaskId,
    ) -> bool {
        let (name, run_once, mut task) = {
            let mut reg = self.registry.lock();
            let Some(entry) = reg.entries.get_mut(&id) else {
                return false;
            };
            // Suspended or removed earlier in this cycle.
            if !entry.is_ready() {
                return false;
            }
            let Some(Body::Cooperative(task)) = entry.body.take() else {
                return false;
            };
            (entry.name.clone(), entry.flags.is_run_once(), task)
        };

        let result = guarded(|| task.tick());
        let ok = result.is_ok();
        if let Err(failure) = result {
            let e = failure.into_error(&name, Stage::Tick);
            warn!(task = %name, id = %id, label = e.as_label(), "{}", e);
        }
        self.stats.record_task_tick(ok);

        self.give_back(id, task, |entry| {
            if ok && run_once {
                entry.pending_removal = true;
            }
        });
        true
    }

    /// Start every task still STOPPED, in order.
    fn start_pending(
        &self,
        report: &mut TickReport,
    ) {
        let candidates: Vec<TaskId> = {
            let reg = self.registry.lock();
            reg.ordered
                .iter()
                .filter_map(|(_, id)| reg.entries.get(id))
                .filter(|e| e.state == TaskState::Stopped && !e.pending_removal && e.body.is_some())
                .map(|e| e.id)
                .collect()
        };

        for id in candidates {
            if self.start_task(id) {
                report.started.push(id);
            }
        }
    }

    fn start_task(
        &self,
        id: TaskId,
    ) -> bool {
        let (name, body) = {
            let mut reg = self.registry.lock();
            let Some(entry) = reg.entries.get_mut(&id) else {
                return false;
            };
            // Removed by a task started earlier in this pass.
            if entry.pending_removal {
                return false;
            }
            let Some(body) = entry.body.take() else {
                return false;
            };
            (entry.name.clone(), body)
        };

        let (body, result) = match body {
            Body::Cooperative(mut task) => {
                let result = guarded(|| task.on_start()).map_err(|f| f.into_error(&name, Stage::Start));
                (Body::Cooperative(task), result)
            }
            Body::Threaded(mut adapter) => {
                let result = adapter.start(self.sink.clone(), &self.config);
                (Body::Threaded(adapter), result)
            }
        };

        let deferred = {
            let mut reg = self.registry.lock();
            match reg.entries.get_mut(&id) {
                Some(entry) => {
                    entry.body = Some(body);
                    if result.is_ok() {
                        entry.state = TaskState::Running;
                    }
                    entry.deferred.take()
                }
                None => None,
            }
        };

        match result {
            Ok(()) => {
                info!(task = %name, id = %id, "task started");
                self.emit(TaskEventKind::Started, &name, id);
                if let Some(transition) = deferred {
                    if let Err(e) = self.transition(id, transition, false) {
                        debug!(id = %id, "deferred transition not applied: {}", e);
                    }
                }
                true
            }
            Err(e) => {
                self.stats.record_lifecycle_failure();
                warn!(task = %name, id = %id, "start failed, retrying next tick: {}", e);
                false
            }
        }
    }

    /// Queue finished RUN_ONCE thread tasks for removal.
    fn reap_finished_threads(&self) {
        let mut reg = self.registry.lock();
        for entry in reg.entries.values_mut() {
            if let Some(Body::Threaded(adapter)) = &entry.body {
                if adapter.is_finished() && !entry.pending_removal {
                    debug!(task = %entry.name, id = %entry.id, "run-once worker finished");
                    entry.pending_removal = true;
                }
            }
        }
    }

    /// Tear down every task pending removal that is not lent out.
    fn teardown(
        &self,
        report: &mut TickReport,
    ) {
        let doomed: Vec<Entry> = {
            let mut reg = self.registry.lock();
            let ids: Vec<TaskId> = reg
                .entries
                .values()
                .filter(|e| e.pending_removal && e.body.is_some())
                .map(|e| e.id)
                .collect();
            ids.into_iter().filter_map(|id| reg.remove(id)).collect()
        };

        for entry in doomed {
            self.stop_entry(entry, report);
        }

        if self.is_shutting_down() {
            let reg = self.registry.lock();
            if reg.len() == 0 {
                self.shutting_down.store(false, Ordering::SeqCst);
                info!("shutdown complete");
            }
        }
    }

    fn stop_entry(
        &self,
        entry: Entry,
        report: &mut TickReport,
    ) {
        let Entry {
            id,
            name,
            state,
            body,
            ..
        } = entry;

        let task = match body {
            Some(Body::Cooperative(task)) => Some(task),
            Some(Body::Threaded(mut adapter)) => {
                adapter.stop();
                adapter.take_task()
            }
            None => None,
        };
        if let Some(mut task) = task {
            if let Err(message) = guarded_unit(|| task.on_stop()) {
                let e = CallFailure::Panicked(message).into_error(&name, Stage::Stop);
                error!(task = %name, id = %id, "{}", e);
            }
        }

        self.stats.record_removed();
        info!(task = %name, id = %id, "task removed");
        if state != TaskState::Stopped {
            self.emit(TaskEventKind::Stopped, &name, id);
        }
        report.removed.push(id);
    }

    /// Run cycles until no task remains.
    pub fn run(&self) {
        info!(tasks = self.len(), "scheduler loop started");
        let interval = self.config.tick_interval();
        while !self.is_empty() {
            self.tick();
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }
        info!(ticks = self.stats.snapshot().ticks, "scheduler loop finished");
    }

    /// Mark every task, SYSTEM tasks included, for removal so that
    /// [`run`](Self::run) drains and returns.
    ///
    /// New submissions are refused until the registry has drained. Calling
    /// it again marks whatever is tracked at that point.
    pub fn shutdown(&self) {
        let mut reg = self.registry.lock();
        self.shutting_down.store(true, Ordering::SeqCst);
        for entry in reg.entries.values_mut() {
            entry.pending_removal = true;
            if let Some(Body::Threaded(adapter)) = &entry.body {
                adapter.request_stop();
            }
        }
        info!(tasks = reg.len(), "shutdown requested");
    }

    /// Check if a shutdown is in progress.
    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn emit(
        &self,
        kind: TaskEventKind,
        name: &str,
        id: TaskId,
    ) {
        self.sink.notify(&TaskEvent::new(kind, name, id));
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let entries: Vec<Entry> = {
            let reg = self.registry.get_mut();
            let ids: Vec<TaskId> = reg.entries.keys().copied().collect();
            ids.into_iter().filter_map(|id| reg.remove(id)).collect()
        };
        if entries.is_empty() {
            return;
        }
        debug!(tasks = entries.len(), "scheduler dropped; stopping remaining tasks");
        let mut report = TickReport::default();
        for entry in entries {
            self.stop_entry(entry, &mut report);
        }
    }
}

#[cfg(test)]
mod tests;
