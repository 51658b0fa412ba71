//! tickwork - CLI

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tickwork::util::{config, logger};
use tickwork::{
    bootstrap, EventPumpTask, FnTask, LogSink, Order, Scheduler, TaskBuilder, TaskFlags, NAME,
    VERSION,
};
use tracing::info;

/// Dependency-ordered task scheduler demo
#[derive(Parser, Debug)]
#[command(name = "tickwork")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the demo pipeline
    Run {
        /// Number of cycles before shutting down
        #[arg(short, long, default_value_t = 10)]
        ticks: u64,

        /// Add a task running on its own thread
        #[arg(long)]
        threaded: bool,

        /// Configuration file (defaults to the user config)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print version information
    Version,
}

#[derive(Debug, Serialize)]
struct Summary {
    cycles: u64,
    frames: u64,
    produced: u64,
    consumed: u64,
    stats: tickwork::runtime::scheduler::StatsSnapshot,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Run {
            ticks,
            threaded,
            config: config_path,
            json,
        } => {
            let runtime = config::resolve(config_path.as_deref()).with_context(|| match &config_path {
                Some(path) => format!("Failed to load config: {}", path.display()),
                None => "Failed to load user config".to_string(),
            })?;
            let level = if args.verbose {
                logger::LogLevel::Debug
            } else {
                runtime.log.level
            };
            logger::init_with(level, runtime.log.ansi);

            let summary = run_demo(runtime.scheduler, ticks, threaded)?;
            if json {
                let out = serde_json::to_string_pretty(&summary).context("Failed to encode stats")?;
                println!("{}", out);
            } else {
                println!(
                    "{} cycles, {} frames, {} produced, {} consumed, peak {} tasks",
                    summary.cycles,
                    summary.frames,
                    summary.produced,
                    summary.consumed,
                    summary.stats.peak_tasks
                );
            }
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}

fn run_demo(
    config: tickwork::SchedulerConfig,
    ticks: u64,
    threaded: bool,
) -> Result<Summary> {
    let (queue, pump) = EventPumpTask::channel(Arc::new(LogSink), config.max_events_per_tick);
    let scheduler = Scheduler::new(config, Arc::new(queue));
    let builtins = bootstrap(&scheduler, Some(pump)).context("Failed to install system tasks")?;

    let produced = Arc::new(AtomicU64::new(0));
    let consumed = Arc::new(AtomicU64::new(0));

    let p = produced.clone();
    let produce = scheduler.submit(
        FnTask::new("produce", move || {
            p.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
        Order::NORMAL,
        TaskFlags::empty(),
    )?;

    let (p, c) = (produced.clone(), consumed.clone());
    let consume = scheduler.submit(
        FnTask::new("consume", move || {
            let available = p.load(Ordering::SeqCst);
            c.fetch_max(available, Ordering::SeqCst);
            Ok(())
        }),
        Order::HIGH,
        TaskFlags::empty(),
    )?;
    scheduler.add_dependency(consume, produce)?;

    scheduler.submit(
        TaskBuilder::new("announce")
            .on_start(|| {
                info!("pipeline online");
                Ok(())
            })
            .build(|| Ok(())),
        Order::FIRST,
        TaskFlags::RUN_ONCE,
    )?;

    if threaded {
        let clock = builtins.clock.clone();
        scheduler.submit(
            FnTask::new("heartbeat", move || {
                tracing::trace!(frame = clock.frame(), "heartbeat");
                thread::sleep(std::time::Duration::from_millis(5));
                Ok(())
            }),
            Order::LOW,
            TaskFlags::THREAD,
        )?;
    }

    let interval = scheduler.config().tick_interval();
    for _ in 0..ticks {
        scheduler.tick();
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    scheduler.shutdown();
    scheduler.run();

    Ok(Summary {
        cycles: ticks,
        frames: builtins.clock.frame(),
        produced: produced.load(Ordering::SeqCst),
        consumed: consumed.load(Ordering::SeqCst),
        stats: scheduler.stats().snapshot(),
    })
}
