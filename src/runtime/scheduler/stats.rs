//! Scheduler statistics.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Counters updated by the scheduler.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Total cycles run.
    pub ticks: AtomicUsize,
    /// Total cooperative `tick` calls.
    pub tasks_ticked: AtomicUsize,
    /// `tick` calls that returned an error or panicked.
    pub tick_failures: AtomicUsize,
    /// Failed start/suspend/resume transitions.
    pub lifecycle_failures: AtomicUsize,
    /// Task exclusions (cycle, missing dependency, blocked), summed over ticks.
    pub exclusions: AtomicUsize,
    /// Tasks torn down.
    pub tasks_removed: AtomicUsize,
    /// Peak number of tracked tasks.
    pub peak_tasks: AtomicUsize,
}

impl SchedulerStats {
    #[inline]
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_task_tick(
        &self,
        ok: bool,
    ) {
        self.tasks_ticked.fetch_add(1, Ordering::SeqCst);
        if !ok {
            self.tick_failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[inline]
    pub fn record_lifecycle_failure(&self) {
        self.lifecycle_failures.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_exclusions(
        &self,
        count: usize,
    ) {
        self.exclusions.fetch_add(count, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_removed(&self) {
        self.tasks_removed.fetch_add(1, Ordering::SeqCst);
    }

    /// Update the peak task count.
    #[inline]
    pub fn update_peak(
        &self,
        current: usize,
    ) {
        self.peak_tasks.fetch_max(current, Ordering::SeqCst);
    }

    /// Copy the counters into a plain struct.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::SeqCst),
            tasks_ticked: self.tasks_ticked.load(Ordering::SeqCst),
            tick_failures: self.tick_failures.load(Ordering::SeqCst),
            lifecycle_failures: self.lifecycle_failures.load(Ordering::SeqCst),
            exclusions: self.exclusions.load(Ordering::SeqCst),
            tasks_removed: self.tasks_removed.load(Ordering::SeqCst),
            peak_tasks: self.peak_tasks.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub ticks: usize,
    pub tasks_ticked: usize,
    pub tick_failures: usize,
    pub lifecycle_failures: usize,
    pub exclusions: usize,
    pub tasks_removed: usize,
    pub peak_tasks: usize,
}
