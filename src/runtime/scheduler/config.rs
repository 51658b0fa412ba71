//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduler configuration.
///
/// Loaded from the `[scheduler]` table of the runtime config file; every
/// field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between cycles in [`Scheduler::run`], in milliseconds.
    ///
    /// [`Scheduler::run`]: super::Scheduler::run
    pub tick_interval_ms: u64,
    /// Prefix of worker thread names; the task name is appended.
    pub thread_name_prefix: String,
    /// Longest a suspended worker thread parks before re-checking its state.
    pub thread_park_timeout_ms: u64,
    /// Stack size for worker threads, `None` for the platform default.
    pub thread_stack_size: Option<usize>,
    /// Most events the built-in event pump forwards per cycle.
    pub max_events_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 0,
            thread_name_prefix: "tickwork".to_string(),
            thread_park_timeout_ms: 50,
            thread_stack_size: None,
            max_events_per_tick: 256,
        }
    }
}

impl SchedulerConfig {
    /// Pause between cycles.
    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Longest park of a suspended worker.
    #[inline]
    pub fn thread_park_timeout(&self) -> Duration {
        Duration::from_millis(self.thread_park_timeout_ms.max(1))
    }
}
