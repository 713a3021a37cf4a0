//! Background task orchestration — all heavy computation runs here.
//!
//! A scheduler thread owns the pending-job table and a private
//! rayon::ThreadPool (not the global pool) sized to hardware concurrency
//! minus one. Communication is via `mpsc` channels; cancellation is a
//! cooperative `Arc<AtomicBool>` per job.
//!
//! Scheduling rules:
//! - one active job per `(tab, graph)` identity; a newer submission
//!   supersedes pending or running work for that identity
//! - per-identity trailing debounce: rapid submissions collapse and only
//!   the latest parameters run
//! - cancelled or superseded jobs never invoke their callback
//! - teardown unbinds observers before stopping workers, then waits with
//!   a bounded timeout

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::SessionConfig;
use crate::error::AnalysisError;
use crate::events::{AnalysisEvent, EventBus};
use crate::filter::engine::evaluate_segments;
use crate::filter::segments::Segment;
use crate::filter::FilterCondition;
use crate::ids::JobIdentity;
use crate::signal::SignalSnapshot;

const COOPERATIVE_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const FORCED_STOP_GRACE: Duration = Duration::from_secs(2);
const IDLE_POLL: Duration = Duration::from_millis(200);

pub type SegmentCallback = Box<dyn FnOnce(Vec<Segment>) + Send + 'static>;

/// A filter evaluation intent: snapshots plus conditions.
pub struct FilterJob {
    pub identity: JobIdentity,
    pub signals: Vec<SignalSnapshot>,
    pub conditions: Vec<FilterCondition>,
}

enum Command {
    Submit {
        job: FilterJob,
        callback: SegmentCallback,
    },
    Cancel(JobIdentity),
    CancelAll,
    Run(Box<dyn FnOnce() + Send + 'static>),
    Shutdown,
}

struct RunningJob {
    generation: u64,
    cancel: Arc<AtomicBool>,
}

struct PendingJob {
    job: FilterJob,
    callback: SegmentCallback,
    generation: u64,
    deadline: Instant,
}

pub struct TaskOrchestrator {
    tx: Sender<Command>,
    scheduler: Option<JoinHandle<()>>,
    bus: Arc<EventBus>,
    in_flight: Arc<AtomicUsize>,
}

impl TaskOrchestrator {
    pub fn new(bus: Arc<EventBus>, config: &SessionConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let scheduler = spawn_scheduler(
            rx,
            Arc::clone(&bus),
            Arc::clone(&in_flight),
            config.debounce(),
            config.effective_worker_threads(),
        );
        Self {
            tx,
            scheduler: Some(scheduler),
            bus,
            in_flight,
        }
    }

    /// Register a filter intent for `(tab, graph)`. Within the debounce
    /// window, later submissions replace earlier ones; only the latest
    /// parameters run and only its callback can fire.
    pub fn submit_filter_job(
        &self,
        job: FilterJob,
        callback: impl FnOnce(Vec<Segment>) + Send + 'static,
    ) {
        let _ = self.tx.send(Command::Submit {
            job,
            callback: Box::new(callback),
        });
    }

    /// Cancel pending and running work for one identity. Idempotent.
    pub fn cancel(&self, identity: JobIdentity) {
        let _ = self.tx.send(Command::Cancel(identity));
    }

    pub fn cancel_all(&self) {
        let _ = self.tx.send(Command::CancelAll);
    }

    /// Run an arbitrary task on the worker pool (archive I/O and other
    /// one-shot work). Not debounced, not cancellable.
    pub fn run_background(&self, f: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Command::Run(Box::new(f)));
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Tear down: unbind observers, signal stop, wait cooperatively,
    /// then give a short forced-stop grace period.
    pub fn shutdown(&mut self) {
        // Observer unbinding strictly precedes worker destruction.
        self.bus.clear_subscribers();
        let _ = self.tx.send(Command::Shutdown);

        let deadline = Instant::now() + COOPERATIVE_STOP_TIMEOUT;
        while self.in_flight.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            warn!("workers still running after cooperative stop; waiting grace period");
            let deadline = Instant::now() + FORCED_STOP_GRACE;
            while self.in_flight.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
        }
        if let Some(handle) = self.scheduler.take() {
            if handle.join().is_err() {
                warn!("scheduler thread panicked during shutdown");
            }
        }
    }
}

impl Drop for TaskOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_scheduler(
    rx: Receiver<Command>,
    bus: Arc<EventBus>,
    in_flight: Arc<AtomicUsize>,
    debounce: Duration,
    workers: usize,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("siglab-scheduler".into())
        .spawn(move || scheduler_loop(rx, bus, in_flight, debounce, workers))
        .expect("failed to spawn scheduler thread")
}

fn scheduler_loop(
    rx: Receiver<Command>,
    bus: Arc<EventBus>,
    in_flight: Arc<AtomicUsize>,
    debounce: Duration,
    workers: usize,
) {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("siglab-worker-{i}"))
        .build()
        .expect("failed to build worker pool");

    let mut pending: HashMap<JobIdentity, PendingJob> = HashMap::new();
    let mut generations: HashMap<JobIdentity, u64> = HashMap::new();
    let running: Arc<Mutex<HashMap<JobIdentity, RunningJob>>> =
        Arc::new(Mutex::new(HashMap::new()));

    loop {
        let timeout = pending
            .values()
            .map(|p| p.deadline)
            .min()
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL);

        match rx.recv_timeout(timeout) {
            Ok(Command::Submit { job, callback }) => {
                let identity = job.identity;
                let generation = {
                    let entry = generations.entry(identity).or_insert(0);
                    *entry += 1;
                    *entry
                };
                // A newer submission supersedes running work immediately.
                if let Some(old) = lock_running(&running).get(&identity) {
                    old.cancel.store(true, Ordering::Relaxed);
                }
                if pending
                    .insert(
                        identity,
                        PendingJob {
                            job,
                            callback,
                            generation,
                            deadline: Instant::now() + debounce,
                        },
                    )
                    .is_some()
                {
                    debug!("debounced filter submission for {identity}");
                }
            }
            Ok(Command::Cancel(identity)) => {
                *generations.entry(identity).or_insert(0) += 1;
                pending.remove(&identity);
                if let Some(old) = lock_running(&running).get(&identity) {
                    old.cancel.store(true, Ordering::Relaxed);
                }
            }
            Ok(Command::CancelAll) => {
                let identities: Vec<JobIdentity> = pending
                    .keys()
                    .copied()
                    .chain(lock_running(&running).keys().copied())
                    .collect();
                for identity in identities {
                    *generations.entry(identity).or_insert(0) += 1;
                }
                pending.clear();
                for job in lock_running(&running).values() {
                    job.cancel.store(true, Ordering::Relaxed);
                }
            }
            Ok(Command::Run(f)) => {
                in_flight.fetch_add(1, Ordering::SeqCst);
                let in_flight = Arc::clone(&in_flight);
                pool.spawn(move || {
                    f();
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                });
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                pending.clear();
                for job in lock_running(&running).values() {
                    job.cancel.store(true, Ordering::Relaxed);
                }
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        dispatch_due(
            &mut pending,
            &generations,
            &running,
            &pool,
            &bus,
            &in_flight,
        );
    }
    // Dropping the pool waits for workers; they were just told to stop.
}

fn dispatch_due(
    pending: &mut HashMap<JobIdentity, PendingJob>,
    generations: &HashMap<JobIdentity, u64>,
    running: &Arc<Mutex<HashMap<JobIdentity, RunningJob>>>,
    pool: &rayon::ThreadPool,
    bus: &Arc<EventBus>,
    in_flight: &Arc<AtomicUsize>,
) {
    let now = Instant::now();
    let due: Vec<JobIdentity> = pending
        .iter()
        .filter(|(_, p)| p.deadline <= now)
        .map(|(identity, _)| *identity)
        .collect();

    for identity in due {
        let Some(entry) = pending.remove(&identity) else {
            continue;
        };
        if generations.get(&identity) != Some(&entry.generation) {
            continue;
        }
        let cancel = Arc::new(AtomicBool::new(false));
        lock_running(running).insert(
            identity,
            RunningJob {
                generation: entry.generation,
                cancel: Arc::clone(&cancel),
            },
        );
        in_flight.fetch_add(1, Ordering::SeqCst);

        let bus = Arc::clone(bus);
        let running = Arc::clone(running);
        let in_flight = Arc::clone(in_flight);
        pool.spawn(move || {
            run_job(entry.job, entry.callback, entry.generation, cancel, bus, running);
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

fn run_job(
    job: FilterJob,
    callback: SegmentCallback,
    generation: u64,
    cancel: Arc<AtomicBool>,
    bus: Arc<EventBus>,
    running: Arc<Mutex<HashMap<JobIdentity, RunningJob>>>,
) {
    let identity = job.identity;
    bus.publish(AnalysisEvent::FilterStarted { identity });

    let result = evaluate_segments(&job.signals, &job.conditions, &cancel, |percent| {
        bus.publish(AnalysisEvent::FilterProgress { identity, percent });
    });

    let still_current = lock_running(&running)
        .get(&identity)
        .map(|r| r.generation == generation)
        .unwrap_or(false);

    match result {
        Ok(segments) if still_current && !cancel.load(Ordering::Relaxed) => {
            bus.publish(AnalysisEvent::FilterApplied {
                identity,
                segments: segments.clone(),
            });
            callback(segments);
        }
        Ok(_) => debug!("filter result for {identity} superseded; dropped"),
        Err(AnalysisError::TaskCancelled) => debug!("filter job {identity} cancelled"),
        Err(e) => {
            if !cancel.load(Ordering::Relaxed) {
                warn!("filter job {identity} failed: {e}");
                bus.publish(AnalysisEvent::FilterFailed {
                    identity,
                    reason: e.to_string(),
                });
            }
        }
    }

    let mut map = lock_running(&running);
    if map
        .get(&identity)
        .map(|r| r.generation == generation)
        .unwrap_or(false)
    {
        map.remove(&identity);
    }
}

fn lock_running<'a>(
    running: &'a Arc<Mutex<HashMap<JobIdentity, RunningJob>>>,
) -> std::sync::MutexGuard<'a, HashMap<JobIdentity, RunningJob>> {
    running.lock().expect("running-job table lock poisoned")
}
