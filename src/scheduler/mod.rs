//! Background task scheduler.
//!
//! Runs named recurring tasks (alert scans, cache maintenance) with at most
//! one in-progress run per task. Ticks that arrive while a run is still in
//! progress are skipped, not queued.

pub mod runner;
pub mod tasks;

pub use runner::PeriodicScheduler;
pub use tasks::{
    FirstTick, TASK_PURGE_LOOKUP_CACHE, TASK_SCAN_ALERTS, TaskBody, TaskFn, TaskState,
    TaskStatus, task_fn,
};
