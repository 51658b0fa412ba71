//! Built-in system tasks
//!
//! Installed by [`bootstrap`] under privileged access, in the reserved
//! order range ahead of every user task:
//!
//! - [`ClockTask`] at [`Order::SYSTEM_CLOCK`]: frame counter, frame delta
//!   and uptime, readable through a shared [`Clock`].
//! - [`EventPumpTask`] at [`Order::SYSTEM_EVENTS`]: forwards transition
//!   events collected by an [`EventQueue`] (possibly from worker threads)
//!   to a downstream sink on the scheduler thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::runtime::scheduler::{EventSink, Scheduler, SchedulerError, SharedSink, TaskEvent};
use crate::runtime::task::{Order, Task, TaskFlags, TaskId, TaskKind, TaskResult};

/// Frame clock advanced once per cycle by [`ClockTask`].
#[derive(Debug)]
pub struct Clock {
    frames: AtomicU64,
    delta_micros: AtomicU64,
    started: Instant,
    last: Mutex<Instant>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            frames: AtomicU64::new(0),
            delta_micros: AtomicU64::new(0),
            started: now,
            last: Mutex::new(now),
        }
    }

    /// Number of completed frames.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Time between the last two frames.
    #[inline]
    pub fn delta(&self) -> Duration {
        Duration::from_micros(self.delta_micros.load(Ordering::Acquire))
    }

    /// Time since the clock was created.
    #[inline]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    fn advance(&self) {
        let now = Instant::now();
        let delta = {
            let mut last = self.last.lock();
            let delta = now.saturating_duration_since(*last);
            *last = now;
            delta
        };
        let micros = u64::try_from(delta.as_micros()).unwrap_or(u64::MAX);
        self.delta_micros.store(micros, Ordering::Release);
        self.frames.fetch_add(1, Ordering::AcqRel);
    }
}

/// SYSTEM task advancing a [`Clock`] every cycle.
#[derive(Debug, Clone)]
pub struct ClockTask {
    clock: Arc<Clock>,
}

impl ClockTask {
    pub const NAME: &'static str = "system.clock";

    pub fn new(clock: Arc<Clock>) -> Self {
        Self { clock }
    }

    /// Get the clock this task advances.
    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }
}

impl Task for ClockTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> TaskKind {
        TaskKind::System
    }

    fn on_start(&mut self) -> TaskResult {
        *self.clock.last.lock() = Instant::now();
        Ok(())
    }

    fn tick(&mut self) -> TaskResult {
        self.clock.advance();
        Ok(())
    }
}

/// Sink that queues events for an [`EventPumpTask`].
///
/// Cheap to clone and safe to call from any thread.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: Sender<TaskEvent>,
}

impl EventSink for EventQueue {
    fn notify(
        &self,
        event: &TaskEvent,
    ) {
        // The pump is gone once the scheduler shut down; late events are dropped.
        let _ = self.tx.send(event.clone());
    }
}

/// SYSTEM task forwarding queued events to a downstream sink.
pub struct EventPumpTask {
    rx: Receiver<TaskEvent>,
    downstream: SharedSink,
    max_per_tick: usize,
    forwarded: u64,
}

impl std::fmt::Debug for EventPumpTask {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EventPumpTask")
            .field("queued", &self.rx.len())
            .field("max_per_tick", &self.max_per_tick)
            .field("forwarded", &self.forwarded)
            .finish()
    }
}

impl EventPumpTask {
    pub const NAME: &'static str = "system.events";

    /// Create a queue and the pump that drains it into `downstream`.
    ///
    /// Hand the queue to the [`Scheduler`] as its sink and the pump to
    /// [`bootstrap`]. At most `max_per_tick` events are forwarded per
    /// cycle (at least one).
    pub fn channel(
        downstream: SharedSink,
        max_per_tick: usize,
    ) -> (EventQueue, EventPumpTask) {
        let (tx, rx) = channel::unbounded();
        let pump = EventPumpTask {
            rx,
            downstream,
            max_per_tick: max_per_tick.max(1),
            forwarded: 0,
        };
        (EventQueue { tx }, pump)
    }

    /// Number of events waiting in the queue.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Total number of events forwarded.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    fn pump(
        &mut self,
        limit: usize,
    ) -> usize {
        let mut count = 0;
        for event in self.rx.try_iter().take(limit) {
            self.downstream.notify(&event);
            count += 1;
        }
        self.forwarded += count as u64;
        count
    }
}

impl Task for EventPumpTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> TaskKind {
        TaskKind::System
    }

    fn tick(&mut self) -> TaskResult {
        let count = self.pump(self.max_per_tick);
        if count == self.max_per_tick && !self.rx.is_empty() {
            debug!(backlog = self.rx.len(), "event pump saturated");
        }
        Ok(())
    }

    fn on_stop(&mut self) {
        let flushed = self.pump(usize::MAX);
        debug!(flushed, total = self.forwarded, "event pump stopped");
    }
}

/// Handles to the installed system tasks.
#[derive(Debug, Clone)]
pub struct Builtins {
    pub clock: Arc<Clock>,
    pub clock_task: TaskId,
    pub event_pump: Option<TaskId>,
}

/// Install the built-in system tasks.
///
/// Grants privileged access for the duration of the call only.
pub fn bootstrap(
    scheduler: &Scheduler,
    pump: Option<EventPumpTask>,
) -> Result<Builtins, SchedulerError> {
    let _guard = scheduler.privileged();

    let clock = Arc::new(Clock::new());
    let clock_task = scheduler.submit(
        ClockTask::new(clock.clone()),
        Order::SYSTEM_CLOCK,
        TaskFlags::empty(),
    )?;

    let event_pump = match pump {
        Some(pump) => Some(scheduler.submit(pump, Order::SYSTEM_EVENTS, TaskFlags::empty())?),
        None => None,
    };

    info!(clock = %clock_task, events = ?event_pump, "system tasks installed");
    Ok(Builtins {
        clock,
        clock_task,
        event_pump,
    })
}
