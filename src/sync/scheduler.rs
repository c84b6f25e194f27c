//! Executors for background work and for the UI-owning thread.
//!
//! Nothing here is global: the application builds a [`Schedulers`] pair at
//! start-up and hands it to the components that need it. Tests use
//! [`Immediate`] or [`Deferred`] instead.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, error};

/// A unit of work handed to a scheduler
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs, now or later, on some thread.
pub trait Scheduler: Send + Sync {
    fn execute(&self, job: Job);
}

/// The background/UI pair passed to pipeline components.
#[derive(Clone)]
pub struct Schedulers {
    pub background: Arc<dyn Scheduler>,
    pub ui: Arc<dyn Scheduler>,
}

impl Schedulers {
    pub fn new(background: Arc<dyn Scheduler>, ui: Arc<dyn Scheduler>) -> Self {
        Schedulers { background, ui }
    }

    /// Both schedulers run jobs inline on the calling thread.
    pub fn immediate() -> Self {
        Schedulers {
            background: Arc::new(Immediate),
            ui: Arc::new(Immediate),
        }
    }
}

// ---------------------------------------------------------------------------
// Immediate
// ---------------------------------------------------------------------------

/// Runs every job synchronously on the caller's thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl Scheduler for Immediate {
    fn execute(&self, job: Job) {
        job();
    }
}

// ---------------------------------------------------------------------------
// Background threads
// ---------------------------------------------------------------------------

/// Unbounded background executor: every job gets its own named thread.
pub struct ThreadScheduler {
    name: String,
    spawned: AtomicU64,
}

impl ThreadScheduler {
    pub fn new(name: impl Into<String>) -> Self {
        ThreadScheduler {
            name: name.into(),
            spawned: AtomicU64::new(0),
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn execute(&self, job: Job) {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        // spawn() hands the closure back only through the JoinHandle, so keep
        // it in a slot we can still reach if spawning fails.
        let slot = Arc::new(Mutex::new(Some(job)));
        let thread_slot = slot.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("{}-{}", self.name, n))
            .spawn(move || {
                let job = thread_slot.lock().unwrap_or_else(|e| e.into_inner()).take();
                if let Some(job) = job {
                    job();
                }
            });
        if let Err(e) = spawned {
            error!("could not spawn {} thread, running inline: {}", self.name, e);
            let job = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(job) = job {
                job();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// UI thread queue
// ---------------------------------------------------------------------------

/// Job queue owned by the UI thread.
///
/// Other threads post through a [`MainHandle`]; the owning thread runs the
/// posted jobs with [`run_pending`](Self::run_pending) each tick, or blocks
/// with [`run_until`](Self::run_until).
pub struct MainQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

/// Cloneable sender half of a [`MainQueue`]
#[derive(Clone)]
pub struct MainHandle {
    tx: Sender<Job>,
}

impl MainQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        MainQueue { tx, rx }
    }

    pub fn handle(&self) -> MainHandle {
        MainHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run every job that is already queued. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one job and run it.
    pub fn run_one(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Run jobs as they arrive until `done` returns true or `timeout`
    /// elapses. Returns the final value of `done`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.run_one(deadline - now);
        }
    }
}

impl Default for MainQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for MainHandle {
    fn execute(&self, job: Job) {
        if self.tx.send(job).is_err() {
            debug!("UI queue closed, dropping job");
        }
    }
}

// ---------------------------------------------------------------------------
// Deferred
// ---------------------------------------------------------------------------

/// Queues jobs until told to run them, in any order. Lets tests decide when
/// and in which order "background" work completes.
#[derive(Default)]
pub struct Deferred {
    jobs: Mutex<VecDeque<Job>>,
}

impl Deferred {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run the oldest queued job
    pub fn run_first(&self) -> bool {
        let job = self.lock().pop_front();
        job.map(|job| job()).is_some()
    }

    /// Run the newest queued job
    pub fn run_last(&self) -> bool {
        let job = self.lock().pop_back();
        job.map(|job| job()).is_some()
    }

    /// Run queued jobs, including ones queued while running, until empty
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_first() {
            ran += 1;
        }
        ran
    }
}

impl Scheduler for Deferred {
    fn execute(&self, job: Job) {
        self.lock().push_back(job);
    }
}
