//! Three threads count to 100 in lockstep, once all of them have started.
//!
//! Run with `UTHREAD_LOG=trace` to watch every switch.

use std::process;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use uthread::{thread_create, thread_init, thread_schedule, thread_yield};

const ROUNDS: usize = 100;

/// Writes log records to stderr
struct Writer;

impl log::Log for Writer {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if let Some(mp) = record.module_path() {
            eprintln!("{} [{}]: {}", record.level(), mp, record.args());
        } else {
            eprintln!("{}: {}", record.level(), record.args());
        }
    }

    fn flush(&self) {
        // no op
    }
}

static LOGGER: Writer = Writer;

fn init_logging() {
    let level = std::env::var("UTHREAD_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(log::LevelFilter::Info);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Shared progress of one worker. Atomics because a `static` has to be
/// `Sync`; `Relaxed` is enough since only one thread ever runs at a time.
struct Worker {
    name: &'static str,
    started: AtomicBool,
    count: AtomicUsize,
}

impl Worker {
    const fn new(name: &'static str) -> Self {
        Worker {
            name,
            started: AtomicBool::new(false),
            count: AtomicUsize::new(0),
        }
    }
}

static WORKERS: [Worker; 3] = [
    Worker::new("thread_a"),
    Worker::new("thread_b"),
    Worker::new("thread_c"),
];

fn run_worker(me: usize) {
    let worker = &WORKERS[me];
    println!("{} started", worker.name);
    worker.started.store(true, Ordering::Relaxed);

    while !WORKERS.iter().all(|w| w.started.load(Ordering::Relaxed)) {
        thread_yield();
    }

    for i in 0..ROUNDS {
        println!("{} {}", worker.name, i);
        worker.count.fetch_add(1, Ordering::Relaxed);
        thread_yield();
    }
    println!(
        "{}: exit after {}",
        worker.name,
        worker.count.load(Ordering::Relaxed)
    );
}

fn thread_a() {
    run_worker(0);
}

fn thread_b() {
    run_worker(1);
}

fn thread_c() {
    run_worker(2);
}

fn main() {
    init_logging();

    thread_init();
    for entry in [thread_a as fn(), thread_b, thread_c] {
        if let Err(err) = thread_create(entry) {
            eprintln!("uthread: {}", err);
            process::exit(1);
        }
    }

    // Returns once every worker has finished.
    thread_schedule();

    let counts: Vec<usize> = WORKERS
        .iter()
        .map(|w| w.count.load(Ordering::Relaxed))
        .collect();
    if counts.iter().any(|&n| n != ROUNDS) {
        log::error!("unexpected counts {:?}", counts);
        process::exit(1);
    }
    log::info!("all threads finished: {:?}", counts);
}
