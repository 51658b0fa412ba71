//! Dedicated-thread tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tickwork::{
    FnTask, NullSink, Order, Scheduler, SchedulerConfig, TaskEvent, TaskEventKind, TaskFlags,
    TaskState,
};

fn eventually<F: FnMut() -> bool>(mut cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn test_tick_never_on_scheduler_thread() {
    let scheduler = Scheduler::with_sink(NullSink);
    let scheduler_thread = thread::current().id();
    let callers: Arc<Mutex<Vec<(ThreadId, Option<String>)>>> = Arc::default();
    let c = callers.clone();
    scheduler
        .submit(
            FnTask::new("isolated", move || {
                let current = thread::current();
                c.lock()
                    .push((current.id(), current.name().map(str::to_string)));
                thread::sleep(Duration::from_millis(1));
                Ok(())
            }),
            Order::NORMAL,
            TaskFlags::THREAD,
        )
        .unwrap();

    for _ in 0..5 {
        scheduler.tick();
    }
    assert!(eventually(|| callers.lock().len() >= 2));
    for (id, name) in callers.lock().iter() {
        assert_ne!(*id, scheduler_thread);
        assert_eq!(name.as_deref(), Some("tickwork-isolated"));
    }
}

#[test]
fn test_worker_thread_name_prefix() {
    let config = SchedulerConfig {
        thread_name_prefix: "demo".to_string(),
        ..SchedulerConfig::default()
    };
    let scheduler = Scheduler::new(config, Arc::new(NullSink));
    let name = Arc::new(Mutex::new(None));
    let n = name.clone();
    scheduler
        .submit(
            FnTask::new("named", move || {
                *n.lock() = thread::current().name().map(str::to_string);
                Ok(())
            }),
            Order::NORMAL,
            TaskFlags::THREAD | TaskFlags::RUN_ONCE,
        )
        .unwrap();
    scheduler.tick();
    assert!(eventually(|| name.lock().is_some()));
    assert_eq!(name.lock().as_deref(), Some("demo-named"));
}

#[test]
fn test_mixed_cooperative_and_threaded() {
    let events: Arc<Mutex<Vec<TaskEvent>>> = Arc::default();
    let e = events.clone();
    let scheduler = Scheduler::with_sink(move |event: &TaskEvent| e.lock().push(event.clone()));

    let threaded_ticks = Arc::new(AtomicUsize::new(0));
    let t = threaded_ticks.clone();
    let threaded = scheduler
        .submit(
            FnTask::new("threaded", move || {
                t.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
                Ok(())
            }),
            Order::NORMAL,
            TaskFlags::THREAD,
        )
        .unwrap();
    let cooperative = scheduler
        .submit(FnTask::new("cooperative", || Ok(())), Order::NORMAL, TaskFlags::empty())
        .unwrap();

    let report = scheduler.tick();
    assert_eq!(report.ran, vec![cooperative]);
    assert_eq!(report.started.len(), 2);

    scheduler.suspend(threaded).unwrap();
    assert!(eventually(
        || scheduler.get(threaded).map(|i| i.state) == Some(TaskState::Paused)
    ));
    scheduler.resume(threaded).unwrap();
    assert!(eventually(
        || scheduler.get(threaded).map(|i| i.state) == Some(TaskState::Running)
    ));

    scheduler.shutdown();
    scheduler.run();
    assert!(threaded_ticks.load(Ordering::SeqCst) > 0);

    let events = events.lock();
    let of = |kind| events.iter().filter(|e| e.kind == kind && e.id == threaded).count();
    assert_eq!(of(TaskEventKind::Started), 1);
    assert_eq!(of(TaskEventKind::Suspended), 1);
    assert_eq!(of(TaskEventKind::Resumed), 1);
    assert_eq!(of(TaskEventKind::Stopped), 1);
}
