//! Scheduler 单元测试
//!
//! 测试注册、权限、依赖顺序、挂起/恢复、移除和降级策略

use crate::runtime::dag::Exclusion;
use crate::runtime::scheduler::{
    Forbidden, NullSink, Scheduler, SchedulerConfig, SchedulerError, TaskEvent, TaskEventKind,
};
use crate::runtime::task::{
    FnTask, NoopTask, Order, TaskBuilder, TaskFlags, TaskId, TaskKind, TaskState,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;


/// Shared call log.
#[derive(Clone, Default)]
pub(super) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub(super) fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub(super) fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub(super) fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }

    pub(super) fn ticks(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter_map(|e| e.strip_suffix(":tick").map(str::to_string))
            .collect()
    }
}

/// A task that logs every callback as `name:callback`.
pub(super) fn recorder(name: &str, log: &CallLog) -> FnTask {
    let hook = |suffix: &'static str| {
        let log = log.clone();
        let entry = format!("{}:{}", name, suffix);
        move || {
            log.push(entry.clone());
            Ok::<(), anyhow::Error>(())
        }
    };
    let stop = {
        let log = log.clone();
        let entry = format!("{}:stop", name);
        move || log.push(entry.clone())
    };
    TaskBuilder::new(name)
        .on_start(hook("start"))
        .on_suspend(hook("suspend"))
        .on_resume(hook("resume"))
        .on_stop(stop)
        .build(hook("tick"))
}

/// Scheduler whose events are collected into a vector.
pub(super) fn recording_scheduler() -> (Scheduler, Arc<Mutex<Vec<TaskEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let scheduler = Scheduler::with_sink(move |event: &TaskEvent| sink.lock().push(event.clone()));
    (scheduler, events)
}

#[cfg(test)]
mod submit_tests {
    use super::*;

    #[test]
    fn test_ids_are_positive_and_unique() {
        let scheduler = Scheduler::with_sink(NullSink);
        let a = scheduler
            .submit(NoopTask::new("a"), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        let b = scheduler
            .submit(NoopTask::new("b"), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        assert!(a.inner() > 0);
        assert_ne!(a, b);
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.find("b").unwrap().id, b);
        assert_eq!(scheduler.get(a).unwrap().name, "a");
    }

    #[test]
    fn test_ids_are_not_reused_after_removal() {
        let scheduler = Scheduler::with_sink(NullSink);
        let a = scheduler
            .submit(NoopTask::new("a"), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        scheduler.remove(a).unwrap();
        scheduler.tick();
        let again = scheduler
            .submit(NoopTask::new("a"), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        assert_ne!(a, again);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let scheduler = Scheduler::with_sink(NullSink);
        let first = scheduler
            .submit(NoopTask::new("dup"), Order::NORMAL, TaskFlags::empty())
            .unwrap();

        let err = scheduler
            .submit(NoopTask::new("dup"), Order::LOW, TaskFlags::empty())
            .unwrap_err();
        match &err {
            SchedulerError::Duplicate { existing, .. } => assert_eq!(*existing, first),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(err.as_label(), "rejected_duplicate");
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.find("dup").unwrap().order, Order::NORMAL);
    }

    #[test]
    fn test_reserved_order_needs_privilege() {
        let scheduler = Scheduler::with_sink(NullSink);
        let err = scheduler
            .submit(NoopTask::new("early"), Order::SYSTEM_LAST, TaskFlags::empty())
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Forbidden {
                reason: Forbidden::ReservedOrder(_),
                ..
            }
        ));
        assert!(scheduler.is_empty());

        {
            let _guard = scheduler.privileged();
            assert!(scheduler.is_privileged());
            scheduler
                .submit(NoopTask::new("early"), Order::SYSTEM_LAST, TaskFlags::empty())
                .unwrap();
        }
        assert!(!scheduler.is_privileged());
        assert_eq!(scheduler.find("early").unwrap().kind, TaskKind::User);
    }

    #[test]
    fn test_nested_privilege_guards() {
        let scheduler = Scheduler::with_sink(NullSink);
        let outer = scheduler.privileged();
        {
            let _inner = scheduler.privileged();
        }
        assert!(scheduler.is_privileged());
        drop(outer);
        assert!(!scheduler.is_privileged());
    }

    #[test]
    fn test_system_task_needs_privilege() {
        let scheduler = Scheduler::with_sink(NullSink);
        let err = scheduler
            .submit(NoopTask::system("clock"), Order::FIRST, TaskFlags::empty())
            .unwrap_err();
        assert_eq!(err.as_label(), "forbidden");

        let id = {
            let _guard = scheduler.privileged();
            scheduler
                .submit(NoopTask::system("clock"), Order::SYSTEM_CLOCK, TaskFlags::empty())
                .unwrap()
        };
        scheduler.tick();

        assert!(matches!(
            scheduler.suspend(id),
            Err(SchedulerError::Forbidden {
                reason: Forbidden::SystemTask,
                ..
            })
        ));
        assert!(scheduler.remove(id).is_err());
        assert!(scheduler.change_order(id, Order::SYSTEM_LAST).is_err());

        let _guard = scheduler.privileged();
        scheduler.suspend(id).unwrap();
        scheduler.resume(id).unwrap();
        scheduler.change_order(id, Order::SYSTEM_LAST).unwrap();
        scheduler.remove(id).unwrap();
    }

    #[test]
    fn test_on_add_veto() {
        let scheduler = Scheduler::with_sink(NullSink);
        let task = TaskBuilder::new("picky")
            .on_add(|_| anyhow::bail!("not today"))
            .build(|| Ok(()));

        let err = scheduler
            .submit(task, Order::NORMAL, TaskFlags::empty())
            .unwrap_err();
        assert_eq!(err.as_label(), "rejected");
        assert!(scheduler.is_empty());
        assert!(scheduler.find("picky").is_none());
    }

    #[test]
    fn test_on_add_receives_assigned_id() {
        let scheduler = Scheduler::with_sink(NullSink);
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        let task = TaskBuilder::new("ided")
            .on_add(move |id| {
                *s.lock() = Some(id);
                Ok(())
            })
            .build(|| Ok(()));
        let id = scheduler
            .submit(task, Order::NORMAL, TaskFlags::empty())
            .unwrap();
        assert_eq!(*seen.lock(), Some(id));
    }
}

#[cfg(test)]
mod tick_tests {
    use super::*;

    #[test]
    fn test_start_on_next_tick() {
        let (scheduler, events) = recording_scheduler();
        let log = CallLog::default();
        let id = scheduler
            .submit(recorder("a", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();

        assert_eq!(scheduler.get(id).unwrap().state, TaskState::Stopped);
        assert!(log.entries().is_empty());

        let report = scheduler.tick();
        assert_eq!(report.started, vec![id]);
        assert_eq!(report.ran, vec![id]);
        assert_eq!(log.entries(), vec!["a:start", "a:tick"]);
        assert_eq!(scheduler.get(id).unwrap().state, TaskState::Running);

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TaskEventKind::Started);
        assert_eq!(events[0].id, id);
    }

    #[test]
    fn test_order_sorts_independent_tasks() {
        let scheduler = Scheduler::with_sink(NullSink);
        let log = CallLog::default();
        scheduler
            .submit(recorder("low", &log), Order::LOW, TaskFlags::empty())
            .unwrap();
        scheduler
            .submit(recorder("high", &log), Order::HIGH, TaskFlags::empty())
            .unwrap();
        scheduler
            .submit(recorder("normal", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();

        scheduler.tick();
        assert_eq!(log.ticks(), vec!["high", "normal", "low"]);
    }

    #[test]
    fn test_dependency_runs_first() {
        let scheduler = Scheduler::with_sink(NullSink);
        let log = CallLog::default();
        let a = scheduler
            .submit(recorder("a", &log), Order::HIGH, TaskFlags::empty())
            .unwrap();
        let b = scheduler
            .submit(recorder("b", &log), Order::LOW, TaskFlags::empty())
            .unwrap();
        scheduler.add_dependency(a, b).unwrap();

        scheduler.tick();
        scheduler.tick();
        assert_eq!(log.ticks(), vec!["b", "a", "b", "a"]);
        assert_eq!(scheduler.get(a).unwrap().dependencies, vec![b]);
    }

    #[test]
    fn test_change_order_resorts() {
        let scheduler = Scheduler::with_sink(NullSink);
        let log = CallLog::default();
        let a = scheduler
            .submit(recorder("a", &log), Order::HIGH, TaskFlags::empty())
            .unwrap();
        scheduler
            .submit(recorder("b", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();

        scheduler.tick();
        scheduler.change_order(a, Order::LAST).unwrap();
        scheduler.tick();
        assert_eq!(log.ticks(), vec!["a", "b", "b", "a"]);
        assert_eq!(scheduler.get(a).unwrap().order, Order::LAST);
        assert_eq!(scheduler.tasks().last().unwrap().id, a);

        assert!(matches!(
            scheduler.change_order(a, Order::ROOT),
            Err(SchedulerError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_failed_tick_keeps_task() {
        let scheduler = Scheduler::with_sink(NullSink);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let id = scheduler
            .submit(
                FnTask::new("flaky", move || {
                    c.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("boom")
                }),
                Order::NORMAL,
                TaskFlags::empty(),
            )
            .unwrap();

        scheduler.tick();
        scheduler.tick();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(scheduler.get(id).is_some());
        assert_eq!(scheduler.stats().snapshot().tick_failures, 2);
    }

    #[test]
    fn test_panicking_tick_is_contained() {
        let scheduler = Scheduler::with_sink(NullSink);
        let log = CallLog::default();
        scheduler
            .submit(
                FnTask::new("panicky", || panic!("kaboom")),
                Order::HIGH,
                TaskFlags::empty(),
            )
            .unwrap();
        scheduler
            .submit(recorder("calm", &log), Order::LOW, TaskFlags::empty())
            .unwrap();

        let report = scheduler.tick();
        assert_eq!(report.ran.len(), 2);
        assert_eq!(log.ticks(), vec!["calm"]);
        assert_eq!(scheduler.len(), 2);
    }

    #[test]
    fn test_failed_start_is_retried() {
        let scheduler = Scheduler::with_sink(NullSink);
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = attempts.clone();
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = ticks.clone();
        let id = scheduler
            .submit(
                TaskBuilder::new("late")
                    .on_start(move || {
                        if a.fetch_add(1, Ordering::SeqCst) == 0 {
                            anyhow::bail!("not ready");
                        }
                        Ok(())
                    })
                    .build(move || {
                        t.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                Order::NORMAL,
                TaskFlags::empty(),
            )
            .unwrap();

        let report = scheduler.tick();
        assert!(report.started.is_empty());
        assert_eq!(scheduler.get(id).unwrap().state, TaskState::Stopped);
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        let report = scheduler.tick();
        assert_eq!(report.started, vec![id]);
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.stats().snapshot().lifecycle_failures, 1);
    }

    #[test]
    fn test_run_once() {
        let (scheduler, events) = recording_scheduler();
        let log = CallLog::default();
        let id = scheduler
            .submit(recorder("once", &log), Order::NORMAL, TaskFlags::RUN_ONCE)
            .unwrap();

        let report = scheduler.tick();
        assert_eq!(report.removed, vec![id]);
        scheduler.tick();

        assert_eq!(log.count("once:tick"), 1);
        assert_eq!(log.count("once:stop"), 1);
        assert!(scheduler.get(id).is_none());
        assert!(scheduler.find("once").is_none());
        let kinds: Vec<_> = events.lock().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![TaskEventKind::Started, TaskEventKind::Stopped]);
    }

    #[test]
    fn test_run_once_failure_is_retried() {
        let scheduler = Scheduler::with_sink(NullSink);
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = attempts.clone();
        let id = scheduler
            .submit(
                FnTask::new("retry", move || {
                    if a.fetch_add(1, Ordering::SeqCst) == 0 {
                        anyhow::bail!("first try fails");
                    }
                    Ok(())
                }),
                Order::NORMAL,
                TaskFlags::RUN_ONCE,
            )
            .unwrap();

        scheduler.tick();
        assert!(scheduler.get(id).is_some());
        scheduler.tick();
        assert!(scheduler.get(id).is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}

#[cfg(test)]
mod suspend_tests {
    use super::*;

    #[test]
    fn test_suspend_and_resume() {
        let (scheduler, events) = recording_scheduler();
        let log = CallLog::default();
        let id = scheduler
            .submit(recorder("s", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();

        scheduler.tick();
        scheduler.suspend(id).unwrap();
        assert_eq!(scheduler.get(id).unwrap().state, TaskState::Paused);

        let report = scheduler.tick();
        assert!(report.ran.is_empty());
        assert_eq!(log.count("s:tick"), 1);

        // Suspending twice is a no-op.
        scheduler.suspend(id).unwrap();
        assert_eq!(log.count("s:suspend"), 1);

        scheduler.resume(id).unwrap();
        scheduler.tick();
        assert_eq!(log.count("s:tick"), 2);
        assert_eq!(log.count("s:start"), 1);
        assert_eq!(log.count("s:resume"), 1);

        let kinds: Vec<_> = events.lock().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TaskEventKind::Started,
                TaskEventKind::Suspended,
                TaskEventKind::Resumed
            ]
        );
    }

    #[test]
    fn test_failed_suspend_keeps_running() {
        let scheduler = Scheduler::with_sink(NullSink);
        let log = CallLog::default();
        let l = log.clone();
        let id = scheduler
            .submit(
                TaskBuilder::new("stubborn")
                    .on_suspend(|| anyhow::bail!("cannot pause now"))
                    .build(move || {
                        l.push("stubborn:tick".into());
                        Ok(())
                    }),
                Order::NORMAL,
                TaskFlags::empty(),
            )
            .unwrap();

        scheduler.tick();
        let err = scheduler.suspend(id).unwrap_err();
        assert!(matches!(err, SchedulerError::Lifecycle { .. }));
        assert_eq!(scheduler.get(id).unwrap().state, TaskState::Running);

        scheduler.tick();
        assert_eq!(log.count("stubborn:tick"), 2);
    }

    #[test]
    fn test_suspend_before_start_is_invalid() {
        let scheduler = Scheduler::with_sink(NullSink);
        let id = scheduler
            .submit(NoopTask::new("fresh"), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        assert!(matches!(
            scheduler.suspend(id),
            Err(SchedulerError::InvalidState {
                state: TaskState::Stopped,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_ids() {
        let scheduler = Scheduler::with_sink(NullSink);
        let ghost = TaskId(99);
        assert_eq!(scheduler.remove(ghost).unwrap_err().as_label(), "not_found");
        assert!(scheduler.suspend(ghost).is_err());
        assert!(scheduler.resume(ghost).is_err());
        assert!(scheduler.change_order(ghost, Order::NORMAL).is_err());
        assert!(scheduler.check_dependencies(ghost).is_err());
    }

    #[test]
    fn test_task_suspends_itself_during_tick() {
        let scheduler = Arc::new(Scheduler::with_sink(NullSink));
        let me = Arc::new(Mutex::new(None::<TaskId>));
        let weak = Arc::downgrade(&scheduler);
        let m = me.clone();
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = ticks.clone();

        let id = scheduler
            .submit(
                FnTask::new("sleepy", move || {
                    t.fetch_add(1, Ordering::SeqCst);
                    if let (Some(s), Some(id)) = (weak.upgrade(), *m.lock()) {
                        s.suspend(id)?;
                    }
                    Ok(())
                }),
                Order::NORMAL,
                TaskFlags::empty(),
            )
            .unwrap();
        *me.lock() = Some(id);

        scheduler.tick();
        assert_eq!(scheduler.get(id).unwrap().state, TaskState::Paused);
        scheduler.tick();
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_task_suspends_itself_during_start() {
        let scheduler = Arc::new(Scheduler::with_sink(NullSink));
        let log = CallLog::default();
        let me = Arc::new(Mutex::new(None::<TaskId>));
        let weak = Arc::downgrade(&scheduler);
        let m = me.clone();
        let l = log.clone();

        let id = scheduler
            .submit(
                TaskBuilder::new("shy")
                    .on_start(move || {
                        l.push("shy:start".into());
                        if let (Some(s), Some(id)) = (weak.upgrade(), *m.lock()) {
                            s.suspend(id)?;
                        }
                        Ok(())
                    })
                    .on_suspend({
                        let l = log.clone();
                        move || {
                            l.push("shy:suspend".into());
                            Ok(())
                        }
                    })
                    .build({
                        let l = log.clone();
                        move || {
                            l.push("shy:tick".into());
                            Ok(())
                        }
                    }),
                Order::NORMAL,
                TaskFlags::empty(),
            )
            .unwrap();
        *me.lock() = Some(id);

        let report = scheduler.tick();
        assert_eq!(report.started, vec![id]);
        assert!(report.ran.is_empty());
        assert_eq!(scheduler.get(id).unwrap().state, TaskState::Paused);
        assert_eq!(log.entries(), vec!["shy:start", "shy:suspend"]);

        scheduler.tick();
        assert_eq!(log.count("shy:tick"), 0);
    }
}

#[cfg(test)]
mod removal_tests {
    use super::*;

    #[test]
    fn test_remove_mid_tick() {
        let scheduler = Arc::new(Scheduler::with_sink(NullSink));
        let log = CallLog::default();
        let victim = Arc::new(Mutex::new(None::<TaskId>));

        let weak = Arc::downgrade(&scheduler);
        let v = victim.clone();
        let l = log.clone();
        scheduler
            .submit(
                FnTask::new("killer", move || {
                    l.push("killer:tick".into());
                    if let (Some(s), Some(id)) = (weak.upgrade(), v.lock().take()) {
                        s.remove(id)?;
                        // Teardown must not have happened yet.
                        assert_eq!(l.count("victim:stop"), 0);
                    }
                    Ok(())
                }),
                Order::HIGH,
                TaskFlags::empty(),
            )
            .unwrap();
        let id = scheduler
            .submit(recorder("victim", &log), Order::LOW, TaskFlags::empty())
            .unwrap();
        scheduler
            .submit(recorder("bystander", &log), Order::LAST, TaskFlags::empty())
            .unwrap();

        scheduler.tick();
        *victim.lock() = Some(id);
        let report = scheduler.tick();

        assert_eq!(report.removed, vec![id]);
        assert_eq!(log.count("victim:tick"), 1);
        assert_eq!(log.count("victim:stop"), 1);
        assert_eq!(log.count("bystander:tick"), 2);
        let entries = log.entries();
        assert_eq!(entries.last().unwrap(), "victim:stop");
        assert!(scheduler.get(id).is_none());
    }

    #[test]
    fn test_remove_between_ticks_tears_down_on_next_tick() {
        let (scheduler, events) = recording_scheduler();
        let log = CallLog::default();
        let id = scheduler
            .submit(recorder("r", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        scheduler.tick();

        scheduler.remove(id).unwrap();
        scheduler.remove(id).unwrap();
        assert!(scheduler.get(id).unwrap().pending_removal);
        assert_eq!(log.count("r:stop"), 0);

        scheduler.tick();
        assert_eq!(log.count("r:tick"), 1);
        assert_eq!(log.count("r:stop"), 1);
        assert!(scheduler.is_empty());
        assert_eq!(events.lock().last().unwrap().kind, TaskEventKind::Stopped);
    }

    #[test]
    fn test_run_drains_after_shutdown() {
        let scheduler = Arc::new(Scheduler::with_sink(NullSink));
        let weak = Arc::downgrade(&scheduler);
        let countdown = Arc::new(AtomicUsize::new(3));
        let c = countdown.clone();
        {
            let _guard = scheduler.privileged();
            scheduler
                .submit(NoopTask::system("sys"), Order::SYSTEM_FIRST, TaskFlags::empty())
                .unwrap();
        }
        scheduler
            .submit(
                FnTask::new("stopper", move || {
                    if c.fetch_sub(1, Ordering::SeqCst) == 1 {
                        if let Some(s) = weak.upgrade() {
                            s.shutdown();
                        }
                    }
                    Ok(())
                }),
                Order::NORMAL,
                TaskFlags::empty(),
            )
            .unwrap();

        scheduler.run();
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.stats().snapshot().ticks, 3);
        assert_eq!(scheduler.stats().snapshot().tasks_removed, 2);
    }

    #[test]
    fn test_remove_during_start_pass_skips_start() {
        let (scheduler, events) = recording_scheduler();
        let scheduler = Arc::new(scheduler);
        let log = CallLog::default();
        let victim = Arc::new(Mutex::new(None::<TaskId>));

        let weak = Arc::downgrade(&scheduler);
        let v = victim.clone();
        let killer = scheduler
            .submit(
                TaskBuilder::new("killer")
                    .on_start(move || {
                        if let (Some(s), Some(id)) = (weak.upgrade(), v.lock().take()) {
                            s.remove(id)?;
                        }
                        Ok(())
                    })
                    .build(|| Ok(())),
                Order::FIRST,
                TaskFlags::empty(),
            )
            .unwrap();
        let id = scheduler
            .submit(recorder("victim", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        *victim.lock() = Some(id);

        let report = scheduler.tick();
        assert_eq!(report.started, vec![killer]);
        assert_eq!(report.removed, vec![id]);
        assert!(!report.ran.contains(&id));
        assert_eq!(log.entries(), vec!["victim:stop"]);
        assert!(scheduler.get(id).is_none());

        // Never started, so neither Started nor Stopped is reported for it.
        assert!(events.lock().iter().all(|e| e.id != id));
    }

    #[test]
    fn test_shutdown_refuses_submissions_until_drained() {
        let scheduler = Scheduler::with_sink(NullSink);
        scheduler
            .submit(NoopTask::new("a"), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        scheduler.tick();

        scheduler.shutdown();
        let err = scheduler
            .submit(NoopTask::new("late"), Order::NORMAL, TaskFlags::empty())
            .unwrap_err();
        assert!(matches!(&err, SchedulerError::ShuttingDown { name } if name == "late"));
        assert_eq!(err.as_label(), "shutting_down");
        assert!(scheduler.find("late").is_none());

        scheduler.tick();
        assert!(scheduler.is_empty());
        assert!(!scheduler.is_shutting_down());
    }

    #[test]
    fn test_second_shutdown_drains_new_tasks() {
        let log = CallLog::default();
        let scheduler = Scheduler::with_sink(NullSink);
        scheduler.shutdown();
        scheduler.tick();

        scheduler
            .submit(recorder("b", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        scheduler.tick();
        scheduler.shutdown();
        scheduler.tick();

        assert!(scheduler.is_empty());
        assert_eq!(log.entries(), vec!["b:start", "b:tick", "b:stop"]);
    }

    #[test]
    fn test_drop_stops_remaining_tasks() {
        let log = CallLog::default();
        {
            let scheduler = Scheduler::with_sink(NullSink);
            scheduler
                .submit(recorder("left", &log), Order::NORMAL, TaskFlags::empty())
                .unwrap();
            scheduler.tick();
        }
        assert_eq!(log.count("left:stop"), 1);
    }
}

#[cfg(test)]
mod degrade_tests {
    use super::*;

    #[test]
    fn test_cycle_skips_members_only() {
        let scheduler = Scheduler::with_sink(NullSink);
        let log = CallLog::default();
        let x = scheduler
            .submit(recorder("x", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        let y = scheduler
            .submit(recorder("y", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        scheduler
            .submit(recorder("z", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        scheduler.add_dependency(x, y).unwrap();
        scheduler.add_dependency(y, x).unwrap();

        let report = scheduler.tick();
        assert_eq!(log.ticks(), vec!["z"]);
        assert_eq!(report.excluded.len(), 2);
        assert!(report.excluded.iter().all(|e| e.reason == Exclusion::Cycle));

        match scheduler.check_dependencies(x) {
            Err(SchedulerError::CircularDependency { path }) => {
                assert_eq!(path, vec![x, y, x]);
            }
            other => panic!("expected a cycle, got {:?}", other),
        }

        scheduler.remove_dependency(y, x).unwrap();
        scheduler.tick();
        assert_eq!(log.ticks(), vec!["z", "y", "x", "z"]);
        assert!(scheduler.check_dependencies(x).is_ok());
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let scheduler = Scheduler::with_sink(NullSink);
        let log = CallLog::default();
        let a = scheduler
            .submit(recorder("a", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        scheduler.add_dependency(a, a).unwrap();

        let report = scheduler.tick();
        assert!(report.ran.is_empty());
        assert_eq!(report.excluded[0].reason, Exclusion::Cycle);
        assert_eq!(scheduler.stats().snapshot().exclusions, 1);
    }

    #[test]
    fn test_missing_dependency() {
        let scheduler = Scheduler::with_sink(NullSink);
        let log = CallLog::default();
        let a = scheduler
            .submit(recorder("a", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        let b = scheduler
            .submit(recorder("b", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        let c = scheduler
            .submit(recorder("c", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        scheduler.add_dependency(b, a).unwrap();
        scheduler.tick();

        scheduler.remove(a).unwrap();
        scheduler.tick();
        let report = scheduler.tick();

        assert_eq!(report.ran, vec![c]);
        assert!(matches!(
            report.excluded[0].reason,
            Exclusion::MissingDependency(_)
        ));
        assert!(matches!(
            scheduler.check_dependencies(b),
            Err(SchedulerError::TaskMissing { .. })
        ));
        assert_eq!(scheduler.get(b).unwrap().dependencies, vec![a]);

        scheduler.remove_dependency(b, a).unwrap();
        let report = scheduler.tick();
        assert_eq!(report.ran, vec![b, c]);
    }

    #[test]
    fn test_paused_dependency_does_not_block() {
        let scheduler = Scheduler::with_sink(NullSink);
        let log = CallLog::default();
        let a = scheduler
            .submit(recorder("a", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        let b = scheduler
            .submit(recorder("b", &log), Order::NORMAL, TaskFlags::empty())
            .unwrap();
        scheduler.add_dependency(b, a).unwrap();
        scheduler.tick();

        scheduler.suspend(a).unwrap();
        let report = scheduler.tick();
        assert_eq!(report.ran, vec![b]);
        assert!(report.excluded.is_empty());
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_interval_ms, 0);
        assert_eq!(config.thread_name_prefix, "tickwork");
        assert!(config.thread_park_timeout().as_millis() >= 1);
    }

    #[test]
    fn test_callback_failures_name_their_stage() {
        use crate::runtime::scheduler::error::CallFailure;
        use crate::runtime::scheduler::Stage;

        let e = CallFailure::Failed(anyhow::anyhow!("boom")).into_error("t", Stage::Tick);
        assert!(matches!(&e, SchedulerError::Lifecycle { stage: Stage::Tick, .. }));
        assert_eq!(e.to_string(), "`t` tick failed: boom");

        let e = CallFailure::Panicked("oops".into()).into_error("t", Stage::Stop);
        assert_eq!(e.as_label(), "internal_error");
        assert_eq!(e.to_string(), "`t` on_stop panicked: oops");
    }

    #[test]
    fn test_scheduler_debug() {
        let scheduler = Scheduler::default();
        let debug = format!("{:?}", scheduler);
        assert!(debug.contains("Scheduler"));
    }
}
