//! Alert evaluation harness run by the scheduler.
//!
//! A scan loads alert definitions from an [`AlertSource`], asks an
//! [`AlertEvaluator`] whether each enabled alert fires, and hands every
//! resulting [`Notification`] to a [`Notifier`]. The three collaborators
//! are traits so storage and delivery stay outside this crate.

pub mod company;
pub mod memory;
pub mod task;
pub mod types;

use async_trait::async_trait;

pub use company::CompanyWatchEvaluator;
pub use memory::{InMemoryAlertSource, TracingNotifier};
pub use task::AlertEvaluationTask;
pub use types::{AlertCondition, AlertDefinition, AlertScanReport, Notification};

/// Supplies the alert definitions for a scan.
#[async_trait]
pub trait AlertSource: Send + Sync + 'static {
    /// Load every alert definition. Failure aborts the scan.
    async fn load_alerts(&self) -> anyhow::Result<Vec<AlertDefinition>>;
}

/// Decides whether an alert fires.
#[async_trait]
pub trait AlertEvaluator: Send + Sync + 'static {
    /// Returns the notification to send, or `None` when the alert is quiet.
    async fn evaluate(&self, alert: &AlertDefinition) -> anyhow::Result<Option<Notification>>;
}

/// Delivers notifications.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Dispatch one notification.
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
