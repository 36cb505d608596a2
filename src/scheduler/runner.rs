//! Scheduler tick loops.
//!
//! Each started task gets its own tokio loop driven by an interval timer.
//! Runs are spawned onto a shared [`TaskTracker`] so that [`shutdown`]
//! can wait for in-progress work, and an atomic running flag per task keeps
//! at most one run alive at a time.
//!
//! [`shutdown`]: PeriodicScheduler::shutdown

use crate::error::{Result, TaskExecutionError, VigilError};
use crate::scheduler::tasks::{FirstTick, TaskBody, TaskState, TaskStatus};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Runs named recurring tasks.
///
/// Starting a task that is already scheduled is a no-op, which makes
/// repeated initialisation safe. Stopping a task cancels future ticks but
/// lets an in-progress run finish.
pub struct PeriodicScheduler {
    /// Registered tasks by name.
    tasks: Mutex<HashMap<String, TaskEntry>>,
    /// Default first-tick policy for [`start`](Self::start).
    first_tick: FirstTick,
    /// Every spawned run, so shutdown can wait for them.
    runs: TaskTracker,
}

struct TaskEntry {
    interval: Duration,
    shared: Arc<TaskShared>,
    cancel: CancellationToken,
    stopped: bool,
    /// The tick loop. Finishes early if its runtime is dropped.
    ticks: JoinHandle<()>,
}

impl TaskEntry {
    /// `true` while the tick loop is still scheduling runs.
    fn is_live(&self) -> bool {
        !self.stopped && !self.ticks.is_finished()
    }
}

/// State shared between a task's tick loop, its runs and status readers.
///
/// Survives stop/start so a restarted task cannot overlap a run that is
/// still finishing.
struct TaskShared {
    name: String,
    running: AtomicBool,
    run_count: AtomicU64,
    skipped_ticks: AtomicU64,
    failure_count: AtomicU64,
    last_run_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl TaskShared {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            running: AtomicBool::new(false),
            run_count: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            last_run_at: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// Claim the running flag. `false` when a run is already in progress.
    fn try_begin_run(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Clears the running flag when a run ends, including by panic or abort.
struct RunGuard<'a>(&'a TaskShared);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Default for PeriodicScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PeriodicScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicScheduler")
            .field("tasks", &lock(&self.tasks).len())
            .field("first_tick", &self.first_tick)
            .finish()
    }
}

impl PeriodicScheduler {
    /// Create an empty scheduler whose tasks run on their first tick.
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            first_tick: FirstTick::default(),
            runs: TaskTracker::new(),
        }
    }

    /// Override the default first-tick policy used by [`start`](Self::start).
    pub fn with_first_tick(mut self, first_tick: FirstTick) -> Self {
        self.first_tick = first_tick;
        self
    }

    /// Default first-tick policy.
    pub fn first_tick(&self) -> FirstTick {
        self.first_tick
    }

    /// Schedule `body` under `name` using the default first-tick policy.
    ///
    /// Returns `Ok(false)` without touching the existing schedule when
    /// `name` is already scheduled or running.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Scheduler`] for a zero interval or when called
    /// outside a tokio runtime.
    pub fn start<B: TaskBody>(&self, name: &str, interval: Duration, body: B) -> Result<bool> {
        self.start_with(name, interval, self.first_tick, body)
    }

    /// Schedule `body` under `name` with an explicit first-tick policy.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn start_with<B: TaskBody>(
        &self,
        name: &str,
        interval: Duration,
        first_tick: FirstTick,
        body: B,
    ) -> Result<bool> {
        if interval.is_zero() {
            return Err(VigilError::Scheduler(format!(
                "task {name}: interval must be greater than zero"
            )));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| VigilError::Scheduler(format!("task {name}: {e}")))?;

        let mut tasks = lock(&self.tasks);
        let shared = match tasks.get(name) {
            Some(entry) if entry.is_live() => {
                debug!(task = name, "task already scheduled, start ignored");
                return Ok(false);
            }
            Some(entry) => {
                if !entry.stopped {
                    warn!(task = name, "tick loop lost with its runtime, rescheduling");
                }
                Arc::clone(&entry.shared)
            }
            None => Arc::new(TaskShared::new(name)),
        };

        let cancel = CancellationToken::new();
        let ticks = runtime.spawn(tick_loop(
            Arc::clone(&shared),
            Arc::new(body),
            interval,
            first_tick,
            cancel.clone(),
            self.runs.clone(),
        ));
        tasks.insert(
            name.to_owned(),
            TaskEntry {
                interval,
                shared,
                cancel,
                stopped: false,
                ticks,
            },
        );

        info!(
            task = name,
            interval_ms = duration_ms(interval),
            ?first_tick,
            "task scheduled"
        );
        Ok(true)
    }

    /// Cancel future ticks of `name`. An in-progress run is left to finish.
    ///
    /// Returns `false` when the task is unknown or no longer scheduled.
    pub fn stop(&self, name: &str) -> bool {
        let mut tasks = lock(&self.tasks);
        let Some(entry) = tasks.get_mut(name) else {
            return false;
        };
        let live = entry.is_live();
        entry.cancel.cancel();
        entry.stopped = true;
        if live {
            info!(task = name, "task stopped");
        }
        live
    }

    /// Stop every task. Returns how many were running a schedule.
    pub fn stop_all(&self) -> usize {
        let mut tasks = lock(&self.tasks);
        let mut stopped = 0;
        for (name, entry) in tasks.iter_mut().filter(|(_, e)| !e.stopped) {
            if entry.is_live() {
                debug!(task = %name, "task stopped");
                stopped += 1;
            }
            entry.cancel.cancel();
            entry.stopped = true;
        }
        stopped
    }

    /// Stop every task and wait for in-progress runs to complete.
    pub async fn shutdown(&self) {
        let stopped = self.stop_all();
        info!(stopped, "scheduler shutting down");
        self.runs.close();
        self.runs.wait().await;
        self.runs.reopen();
        info!("scheduler shut down");
    }

    /// Lifecycle state of `name`; [`TaskState::Idle`] if never started.
    pub fn state(&self, name: &str) -> TaskState {
        let tasks = lock(&self.tasks);
        tasks.get(name).map_or(TaskState::Idle, entry_state)
    }

    /// `true` while a run of `name` is in progress.
    pub fn is_running(&self, name: &str) -> bool {
        lock(&self.tasks)
            .get(name)
            .is_some_and(|entry| entry.shared.is_running())
    }

    /// Snapshot of `name`, or `None` if it was never started.
    pub fn status(&self, name: &str) -> Option<TaskStatus> {
        lock(&self.tasks).get(name).map(snapshot)
    }

    /// Snapshots of every task, sorted by name.
    pub fn statuses(&self) -> Vec<TaskStatus> {
        let mut all: Vec<TaskStatus> = lock(&self.tasks).values().map(snapshot).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for entry in tasks.values() {
            entry.cancel.cancel();
        }
    }
}

fn entry_state(entry: &TaskEntry) -> TaskState {
    if !entry.is_live() {
        TaskState::Stopped
    } else if entry.shared.is_running() {
        TaskState::Running
    } else {
        TaskState::Scheduled
    }
}

fn snapshot(entry: &TaskEntry) -> TaskStatus {
    let shared = &entry.shared;
    TaskStatus {
        name: shared.name.clone(),
        state: entry_state(entry),
        interval_ms: duration_ms(entry.interval),
        last_run_at: *lock(&shared.last_run_at),
        run_count: shared.run_count.load(Ordering::Relaxed),
        skipped_ticks: shared.skipped_ticks.load(Ordering::Relaxed),
        failure_count: shared.failure_count.load(Ordering::Relaxed),
        last_error: lock(&shared.last_error).clone(),
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

async fn tick_loop(
    shared: Arc<TaskShared>,
    body: Arc<dyn TaskBody>,
    interval: Duration,
    first_tick: FirstTick,
    cancel: CancellationToken,
    runs: TaskTracker,
) {
    let start = match first_tick {
        FirstTick::Immediate => Instant::now(),
        FirstTick::AfterInterval => Instant::now() + interval,
    };
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !shared.try_begin_run() {
            shared.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            debug!(task = %shared.name, "previous run still in progress, tick skipped");
            continue;
        }

        let shared = Arc::clone(&shared);
        let body = Arc::clone(&body);
        runs.spawn(async move { execute(&shared, body.as_ref()).await });
    }

    debug!(task = %shared.name, "tick loop exited");
}

/// Run `body` once with the running flag already claimed.
async fn execute(shared: &TaskShared, body: &dyn TaskBody) {
    let _guard = RunGuard(shared);
    *lock(&shared.last_run_at) = Some(Utc::now());
    let started = Instant::now();

    let cause = match AssertUnwindSafe(body.run()).catch_unwind().await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{e:#}")),
        Err(panic) => Some(format!("panicked: {}", panic_message(panic.as_ref()))),
    };
    shared.run_count.fetch_add(1, Ordering::Relaxed);
    let elapsed_ms = duration_ms(started.elapsed());

    match cause {
        None => {
            *lock(&shared.last_error) = None;
            debug!(task = %shared.name, elapsed_ms, "task run completed");
        }
        Some(cause) => {
            shared.failure_count.fetch_add(1, Ordering::Relaxed);
            let err = TaskExecutionError {
                task: shared.name.clone(),
                cause,
            };
            warn!(task = %err.task, elapsed_ms, error = %err, "scheduled task failed");
            *lock(&shared.last_error) = Some(err.cause);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
