//! Transition notifications.
//!
//! The scheduler reports start/stop/suspend/resume transitions to an
//! [`EventSink`] injected at construction. It has no dependency on whatever
//! sits behind the sink (a pub/sub bus, a log, a test recorder).
//!
//! Sinks may be called from worker threads: thread tasks report their
//! suspend/resume transitions from their own thread.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::runtime::task::TaskId;

/// Kind of lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskEventKind {
    Started,
    Stopped,
    Suspended,
    Resumed,
}

impl std::fmt::Display for TaskEventKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let s = match self {
            TaskEventKind::Started => "started",
            TaskEventKind::Stopped => "stopped",
            TaskEventKind::Suspended => "suspended",
            TaskEventKind::Resumed => "resumed",
        };
        f.write_str(s)
    }
}

/// A lifecycle transition of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub name: String,
    pub id: TaskId,
}

impl TaskEvent {
    /// Create an event.
    pub fn new(
        kind: TaskEventKind,
        name: impl Into<String>,
        id: TaskId,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            id,
        }
    }
}

/// Receiver of transition notifications.
pub trait EventSink: Send + Sync {
    fn notify(
        &self,
        event: &TaskEvent,
    );
}

impl<F> EventSink for F
where
    F: Fn(&TaskEvent) + Send + Sync,
{
    fn notify(
        &self,
        event: &TaskEvent,
    ) {
        self(event)
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn notify(
        &self,
        _event: &TaskEvent,
    ) {
    }
}

/// Sink that logs every event at INFO level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn notify(
        &self,
        event: &TaskEvent,
    ) {
        info!(task = %event.name, id = %event.id, "task {}", event.kind);
    }
}

/// Shared handle to a sink.
pub type SharedSink = Arc<dyn EventSink>;
