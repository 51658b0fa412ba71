//! tickwork: a dependency-ordered task scheduler
//!
//! The task-scheduling core of an embeddable runtime. A [`Scheduler`] runs a
//! dynamic set of cooperative tasks once per cycle, honouring explicit order
//! and declared dependencies, and can hand individual tasks a dedicated OS
//! thread. SYSTEM tasks and the reserved order range are only reachable
//! through privileged access.
//!
//! # Example
//!
//! ```
//! use tickwork::{NullSink, Order, Scheduler, TaskBuilder, TaskFlags};
//!
//! let scheduler = Scheduler::with_sink(NullSink);
//! let load = scheduler
//!     .submit(TaskBuilder::new("load").build(|| Ok(())), Order::NORMAL, TaskFlags::empty())
//!     .unwrap();
//! let render = scheduler
//!     .submit(TaskBuilder::new("render").build(|| Ok(())), Order::HIGH, TaskFlags::empty())
//!     .unwrap();
//! scheduler.add_dependency(render, load).unwrap();
//!
//! let report = scheduler.tick();
//! assert_eq!(report.ran, vec![load, render]);
//! ```

#![doc(html_root_url = "https://docs.rs/tickwork")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};

pub use runtime::builtin::{bootstrap, Builtins, Clock, ClockTask, EventPumpTask, EventQueue};
pub use runtime::dag::{Excluded, Exclusion};
pub use runtime::scheduler::{
    EventSink, LogSink, NullSink, PrivilegeGuard, Scheduler, SchedulerConfig, SchedulerError,
    SharedSink, TaskEvent, TaskEventKind, TaskInfo, TickReport,
};
pub use runtime::task::{
    FnTask, NoopTask, Order, Task, TaskBuilder, TaskFlags, TaskId, TaskKind, TaskResult,
    TaskState,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "tickwork";
