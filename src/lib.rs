//! Vigil: background refresh and lookup core.
//!
//! This crate wires a cache-aside company lookup to a process-wide
//! background scheduler:
//!
//! - **Registry**: [`ProcessRegistry`] holds at most one instance of each
//!   process-wide resource, so re-running initialisation is harmless
//! - **Scheduler**: [`PeriodicScheduler`] runs named recurring tasks and
//!   never overlaps two runs of the same task
//! - **Alerts**: [`AlertEvaluationTask`] scans alert definitions on each tick
//! - **Lookup**: [`vigil_lookup::LookupService`] answers company searches
//!   through a single-flight cache
//! - **Server**: [`SearchServer`] exposes the search over HTTP
//!
//! [`bootstrap`] ties these together and may be called any number of times.

pub mod alerts;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod scheduler;
pub mod server;

pub use alerts::{AlertEvaluationTask, AlertScanReport};
pub use bootstrap::{Core, CoreParts, bootstrap, bootstrap_in};
pub use config::VigilConfig;
pub use error::{Result, TaskExecutionError, VigilError};
pub use registry::{ProcessRegistry, RegistryError};
pub use scheduler::{PeriodicScheduler, TaskBody, TaskStatus};
pub use server::SearchServer;
