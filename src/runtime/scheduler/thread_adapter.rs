//! Dedicated-thread execution for tasks flagged [`TaskFlags::THREAD`].
//!
//! A [`ThreadAdapter`] owns one task and the handle of the OS thread that
//! ticks it. The scheduler never ticks such a task itself; it only posts
//! start/stop/suspend/resume requests, which the worker picks up between
//! two `tick` calls.
//!
//! # State machine
//!
//! ```text
//!            suspend()                 on_suspend ok
//!  Running ─────────────► NextSuspend ───────────────► Sleeping
//!     ▲                        │ on_suspend failed         │
//!     └────────────────────────┘                           │ resume()
//!     ▲              on_resume ok                          ▼
//!     └──────────────────────────────────────────── NextResume
//!
//!  any ── stop() ──► Stop   (worker exits after the current call)
//! ```
//!
//! The worker is spawned first and waits in `Starting` while `on_start`
//! runs on the scheduler thread. A failed spawn therefore never calls
//! `on_start`, and a failed `on_start` lets the waiting worker exit without
//! touching the task.
//!
//! The worker remembers whether its last successful callback was
//! `on_suspend` or `on_resume`, so the two callbacks always alternate even
//! when requests race with the worker.
//!
//! [`TaskFlags::THREAD`]: crate::runtime::task::TaskFlags::THREAD

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::config::SchedulerConfig;
use super::error::{SchedulerError, Stage};
use super::event::{SharedSink, TaskEvent, TaskEventKind};
use super::lifecycle::guarded;
use crate::runtime::task::{Task, TaskId, TaskState};

/// Worker state, stored atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Not running; the worker exits (or never started).
    Stop,
    /// Ticking.
    Running,
    /// Suspended; the worker parks.
    Sleeping,
    /// Resume requested, not yet applied.
    NextResume,
    /// Suspend requested, not yet applied.
    NextSuspend,
    /// Worker spawned, waiting for `on_start` on the scheduler thread.
    Starting,
}

impl AdapterState {
    /// Convert from u8 (for atomic storage).
    #[inline]
    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => AdapterState::Running,
            2 => AdapterState::Sleeping,
            3 => AdapterState::NextResume,
            4 => AdapterState::NextSuspend,
            5 => AdapterState::Starting,
            _ => AdapterState::Stop,
        }
    }

    /// Convert to u8 (for atomic storage).
    #[inline]
    pub fn as_u8(&self) -> u8 {
        match self {
            AdapterState::Stop => 0,
            AdapterState::Running => 1,
            AdapterState::Sleeping => 2,
            AdapterState::NextResume => 3,
            AdapterState::NextSuspend => 4,
            AdapterState::Starting => 5,
        }
    }

    /// Lifecycle state as seen by the scheduler. Pending requests have not
    /// taken effect yet.
    #[inline]
    pub fn task_state(&self) -> TaskState {
        match self {
            AdapterState::Stop | AdapterState::Starting => TaskState::Stopped,
            AdapterState::Running | AdapterState::NextSuspend => TaskState::Running,
            AdapterState::Sleeping | AdapterState::NextResume => TaskState::Paused,
        }
    }
}

/// State shared between the adapter and its worker thread.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    /// Set once a RUN_ONCE task completed its tick.
    finished: AtomicBool,
    ticks: AtomicU64,
    failures: AtomicU64,
    /// Holds the task whenever the worker is not running.
    slot: Mutex<Option<Box<dyn Task>>>,
}

impl Shared {
    #[inline]
    fn load(&self) -> AdapterState {
        AdapterState::from_u8(self.state.load(Ordering::SeqCst))
    }

    #[inline]
    fn store(
        &self,
        state: AdapterState,
    ) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    #[inline]
    fn transition(
        &self,
        from: AdapterState,
        to: AdapterState,
    ) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Move to `to` from any of `from`. Returns the state that was replaced.
    fn transition_any(
        &self,
        from: &[AdapterState],
        to: AdapterState,
    ) -> Option<AdapterState> {
        let mut current = self.load();
        loop {
            if !from.contains(&current) {
                return None;
            }
            match self.state.compare_exchange(
                current.as_u8(),
                to.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(current),
                Err(actual) => current = AdapterState::from_u8(actual),
            }
        }
    }
}

/// Runs one task's `tick` loop on a dedicated OS thread.
pub struct ThreadAdapter {
    id: TaskId,
    name: String,
    run_once: bool,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ThreadAdapter {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ThreadAdapter")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("ticks", &self.ticks())
            .finish()
    }
}

impl ThreadAdapter {
    /// Wrap a task. The worker thread is spawned by [`start`](Self::start).
    pub fn new(
        id: TaskId,
        task: Box<dyn Task>,
        run_once: bool,
    ) -> Self {
        let name = task.name().to_string();
        Self {
            id,
            name,
            run_once,
            shared: Arc::new(Shared {
                state: AtomicU8::new(AdapterState::Stop.as_u8()),
                finished: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                slot: Mutex::new(Some(task)),
            }),
            handle: None,
        }
    }

    /// Get the task id.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the task name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current worker state.
    #[inline]
    pub fn state(&self) -> AdapterState {
        self.shared.load()
    }

    /// Number of successful `tick` calls so far.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    /// Number of failed `tick` calls so far.
    #[inline]
    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::SeqCst)
    }

    /// Check if a RUN_ONCE task has completed its tick.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    /// Check if the worker thread exists and has not been joined.
    #[inline]
    pub fn is_spawned(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the worker, then call `on_start` on the calling thread.
    ///
    /// The worker only starts ticking once `on_start` succeeded. On any
    /// failure the adapter is left stopped with its task intact.
    pub fn start(
        &mut self,
        sink: SharedSink,
        config: &SchedulerConfig,
    ) -> Result<(), SchedulerError> {
        if self.handle.is_some() || self.shared.load() != AdapterState::Stop {
            return Err(SchedulerError::InvalidState {
                id: self.id,
                state: self.shared.load().task_state(),
            });
        }
        if self.shared.slot.lock().is_none() {
            return Err(SchedulerError::InvalidState {
                id: self.id,
                state: TaskState::Stopped,
            });
        }

        self.shared.finished.store(false, Ordering::SeqCst);
        self.shared.store(AdapterState::Starting);

        let worker = Worker {
            id: self.id,
            name: self.name.clone(),
            run_once: self.run_once,
            shared: self.shared.clone(),
            sink,
            park: config.thread_park_timeout(),
        };

        let thread_name = format!("{}-{}", config.thread_name_prefix, self.name);
        let mut builder = thread::Builder::new().name(thread_name);
        if let Some(size) = config.thread_stack_size {
            builder = builder.stack_size(size);
        }

        let handle = match builder.spawn(move || worker.run()) {
            Ok(handle) => handle,
            Err(source) => {
                self.shared.store(AdapterState::Stop);
                return Err(SchedulerError::Spawn {
                    name: self.name.clone(),
                    source,
                });
            }
        };

        let started = {
            let mut slot = self.shared.slot.lock();
            match slot.as_mut() {
                // The worker does not touch the slot before `Running`.
                Some(task) => {
                    guarded(|| task.on_start()).map_err(|f| f.into_error(&self.name, Stage::Start))
                }
                None => Err(SchedulerError::InvalidState {
                    id: self.id,
                    state: TaskState::Stopped,
                }),
            }
        };

        match started {
            Ok(()) => {
                self.shared.store(AdapterState::Running);
                handle.thread().unpark();
                self.handle = Some(handle);
                debug!(task = %self.name, id = %self.id, "worker thread started");
                Ok(())
            }
            Err(e) => {
                self.shared.store(AdapterState::Stop);
                handle.thread().unpark();
                if handle.join().is_err() {
                    error!(task = %self.name, id = %self.id, "worker thread panicked");
                }
                Err(e)
            }
        }
    }

    /// Request a suspend. Takes effect at the worker's next iteration.
    ///
    /// Returns `false` if the worker is not running.
    pub fn suspend(&self) -> bool {
        let posted = self
            .shared
            .transition_any(
                &[
                    AdapterState::Running,
                    AdapterState::NextResume,
                    AdapterState::NextSuspend,
                    AdapterState::Sleeping,
                ],
                AdapterState::NextSuspend,
            )
            .is_some();
        self.unpark();
        posted
    }

    /// Request a resume. Takes effect at the worker's next iteration.
    ///
    /// Returns `false` if the worker is not running.
    pub fn resume(&self) -> bool {
        let posted = self
            .shared
            .transition_any(
                &[
                    AdapterState::Sleeping,
                    AdapterState::NextSuspend,
                    AdapterState::NextResume,
                    AdapterState::Running,
                ],
                AdapterState::NextResume,
            )
            .is_some();
        self.unpark();
        posted
    }

    /// Ask the worker to exit after its current call without waiting.
    pub fn request_stop(&self) {
        self.shared.store(AdapterState::Stop);
        self.unpark();
    }

    /// Ask the worker to exit and wait for it.
    ///
    /// Any `tick` in progress runs to completion first. The task is handed
    /// back to the adapter and can be taken with [`take_task`](Self::take_task).
    pub fn stop(&mut self) {
        self.shared.store(AdapterState::Stop);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                error!(task = %self.name, id = %self.id, "worker thread panicked");
            }
        }
    }

    /// Take the task out of a stopped adapter.
    pub fn take_task(&mut self) -> Option<Box<dyn Task>> {
        if self.handle.is_some() {
            return None;
        }
        self.shared.slot.lock().take()
    }

    fn unpark(&self) {
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }
}

impl Drop for ThreadAdapter {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

/// Everything the worker thread needs.
struct Worker {
    id: TaskId,
    name: String,
    run_once: bool,
    shared: Arc<Shared>,
    sink: SharedSink,
    park: Duration,
}

impl Worker {
    fn run(self) {
        loop {
            match self.shared.load() {
                AdapterState::Starting => thread::park_timeout(self.park),
                AdapterState::Stop => {
                    debug!(task = %self.name, id = %self.id, "start aborted; worker exits");
                    return;
                }
                _ => break,
            }
        }

        let Some(mut task) = self.shared.slot.lock().take() else {
            error!(task = %self.name, id = %self.id, "worker started without a task");
            self.shared.store(AdapterState::Stop);
            return;
        };
        debug!(task = %self.name, id = %self.id, "worker loop entered");

        let mut suspended = false;
        loop {
            match self.shared.load() {
                AdapterState::Stop => break,
                AdapterState::Starting => thread::park_timeout(self.park),
                AdapterState::NextSuspend | AdapterState::Sleeping if !suspended => {
                    match guarded(|| task.on_suspend()) {
                        Ok(()) => {
                            suspended = true;
                            self.shared
                                .transition(AdapterState::NextSuspend, AdapterState::Sleeping);
                            self.emit(TaskEventKind::Suspended);
                        }
                        Err(failure) => {
                            warn!(task = %self.name, id = %self.id, "on_suspend failed: {}", failure);
                            self.shared
                                .transition(AdapterState::NextSuspend, AdapterState::Running);
                        }
                    }
                }
                AdapterState::NextSuspend | AdapterState::Sleeping => {
                    self.shared
                        .transition(AdapterState::NextSuspend, AdapterState::Sleeping);
                    thread::park_timeout(self.park);
                }
                AdapterState::NextResume | AdapterState::Running if suspended => {
                    match guarded(|| task.on_resume()) {
                        Ok(()) => {
                            suspended = false;
                            self.shared
                                .transition(AdapterState::NextResume, AdapterState::Running);
                            self.emit(TaskEventKind::Resumed);
                        }
                        Err(failure) => {
                            warn!(task = %self.name, id = %self.id, "on_resume failed: {}", failure);
                            self.shared
                                .transition(AdapterState::NextResume, AdapterState::Sleeping);
                        }
                    }
                }
                AdapterState::NextResume | AdapterState::Running => {
                    self.shared
                        .transition(AdapterState::NextResume, AdapterState::Running);
                    self.tick_once(task.as_mut());
                    thread::yield_now();
                }
            }
        }

        debug!(task = %self.name, id = %self.id, "worker loop exited");
        *self.shared.slot.lock() = Some(task);
    }

    fn tick_once(
        &self,
        task: &mut dyn Task,
    ) {
        match guarded(|| task.tick()) {
            Ok(()) => {
                self.shared.ticks.fetch_add(1, Ordering::SeqCst);
                if self.run_once {
                    self.shared.finished.store(true, Ordering::SeqCst);
                    self.shared.store(AdapterState::Stop);
                }
            }
            Err(failure) => {
                self.shared.failures.fetch_add(1, Ordering::SeqCst);
                warn!(task = %self.name, id = %self.id, "tick failed: {}", failure);
            }
        }
    }

    fn emit(
        &self,
        kind: TaskEventKind,
    ) {
        self.sink
            .notify(&TaskEvent::new(kind, self.name.clone(), self.id));
    }
}
