//! The `scan_alerts` task body.

use super::{AlertEvaluator, AlertScanReport, AlertSource, Notifier};
use crate::scheduler::TaskBody;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Scans every alert definition once per run.
///
/// A failure to load definitions fails the run. A failure evaluating or
/// dispatching one alert is logged and counted, and the scan moves on.
#[derive(Clone)]
pub struct AlertEvaluationTask {
    source: Arc<dyn AlertSource>,
    evaluator: Arc<dyn AlertEvaluator>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for AlertEvaluationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEvaluationTask").finish_non_exhaustive()
    }
}

impl AlertEvaluationTask {
    /// Wire a scan from its three collaborators.
    pub fn new(
        source: Arc<dyn AlertSource>,
        evaluator: Arc<dyn AlertEvaluator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            evaluator,
            notifier,
        }
    }

    /// Run one scan.
    ///
    /// # Errors
    ///
    /// Returns an error only when the alert definitions cannot be loaded.
    pub async fn scan(&self) -> anyhow::Result<AlertScanReport> {
        let alerts = self
            .source
            .load_alerts()
            .await
            .context("loading alert definitions")?;

        let mut report = AlertScanReport::default();
        for alert in alerts.iter().filter(|a| a.enabled) {
            report.scanned += 1;

            let notification = match self.evaluator.evaluate(alert).await {
                Ok(Some(n)) => n,
                Ok(None) => continue,
                Err(e) => {
                    report.failed += 1;
                    warn!(alert_id = %alert.id, error = %format!("{e:#}"), "alert evaluation failed");
                    continue;
                }
            };

            match self.notifier.notify(&notification).await {
                Ok(()) => {
                    report.triggered += 1;
                    debug!(alert_id = %alert.id, "alert notification dispatched");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(alert_id = %alert.id, error = %format!("{e:#}"), "alert notification failed");
                }
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl TaskBody for AlertEvaluationTask {
    async fn run(&self) -> anyhow::Result<()> {
        let report = self.scan().await?;
        info!(
            scanned = report.scanned,
            triggered = report.triggered,
            failed = report.failed,
            "alert scan complete"
        );
        Ok(())
    }
}
