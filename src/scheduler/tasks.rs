//! Task bodies, tick policy and status snapshots.
//!
//! Defines the [`TaskBody`] trait run on every tick, the [`task_fn`]
//! closure adapter, the [`FirstTick`] policy and the [`TaskStatus`]
//! snapshot reported by the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Well-known task that scans alert definitions.
pub const TASK_SCAN_ALERTS: &str = "scan_alerts";

/// Well-known task that sweeps expired lookup cache entries.
pub const TASK_PURGE_LOOKUP_CACHE: &str = "purge_lookup_cache";

/// Work executed on each scheduler tick.
///
/// The scheduler never runs two invocations of the same task concurrently,
/// so implementations need no internal overlap protection. Returned errors
/// and panics are logged and recorded; later ticks still run.
#[async_trait]
pub trait TaskBody: Send + Sync + 'static {
    /// Execute one run.
    async fn run(&self) -> anyhow::Result<()>;
}

/// Closure-backed [`TaskBody`]. Build with [`task_fn`].
pub struct TaskFn<F> {
    f: F,
}

impl<F> std::fmt::Debug for TaskFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFn").finish_non_exhaustive()
    }
}

/// Wrap a closure producing a fresh future per run.
///
/// ```
/// use vigil::scheduler::task_fn;
///
/// let body = task_fn(|| async {
///     // do work...
///     Ok(())
/// });
/// # let _ = body;
/// ```
pub fn task_fn<F, Fut>(f: F) -> TaskFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    TaskFn { f }
}

#[async_trait]
impl<F, Fut> TaskBody for TaskFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self) -> anyhow::Result<()> {
        (self.f)().await
    }
}

/// When the first run of a newly started task happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstTick {
    /// Run at start, then every interval.
    #[default]
    Immediate,
    /// Wait one full interval before the first run.
    AfterInterval,
}

/// Lifecycle state of a named task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Never started on this scheduler.
    Idle,
    /// Waiting for its next tick.
    Scheduled,
    /// A run is in progress.
    Running,
    /// Stopped; no further ticks fire until started again.
    Stopped,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Task name.
    pub name: String,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Tick interval in milliseconds.
    pub interval_ms: u64,
    /// Wall-clock start of the most recent run.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Completed runs, successful or not.
    pub run_count: u64,
    /// Ticks dropped because the previous run was still in progress.
    pub skipped_ticks: u64,
    /// Runs that returned an error or panicked.
    pub failure_count: u64,
    /// Cause of the most recent failed run, cleared by a later success.
    pub last_error: Option<String>,
}

impl TaskStatus {
    /// Tick interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
