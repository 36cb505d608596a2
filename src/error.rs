//! Error types for the vigil core.

/// Top-level error type for the refresh/lookup core.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server error (bind, serve).
    #[error("server error: {0}")]
    Server(String),

    /// Scheduler error (invalid task definition, lifecycle misuse).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Company lookup error.
    #[error(transparent)]
    Lookup(#[from] vigil_lookup::LookupError),

    /// Process registry misuse.
    #[error(transparent)]
    Registry(#[from] crate::registry::RegistryError),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VigilError>;

/// A scheduled task body failed or panicked.
///
/// Built at the scheduler boundary and logged; never propagated, so one
/// failing run does not stop later runs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("task {task} failed: {cause}")]
pub struct TaskExecutionError {
    /// Name of the task whose run failed.
    pub task: String,
    /// Rendered failure cause.
    pub cause: String,
}
