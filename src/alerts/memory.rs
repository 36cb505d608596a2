//! In-process alert source and a notifier that writes to the log.

use super::{AlertDefinition, AlertSource, Notification, Notifier};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

/// Alert definitions held in memory, typically seeded from config.
#[derive(Debug, Default)]
pub struct InMemoryAlertSource {
    alerts: RwLock<Vec<AlertDefinition>>,
}

impl InMemoryAlertSource {
    /// Create a source holding `alerts`.
    pub fn new(alerts: Vec<AlertDefinition>) -> Self {
        Self {
            alerts: RwLock::new(alerts),
        }
    }

    /// Add an alert, replacing any existing alert with the same id.
    pub fn upsert(&self, alert: AlertDefinition) {
        let mut alerts = self.write();
        if let Some(existing) = alerts.iter_mut().find(|a| a.id == alert.id) {
            *existing = alert;
        } else {
            alerts.push(alert);
        }
    }

    /// Remove the alert with `id`. Returns `true` when found.
    pub fn remove(&self, id: &str) -> bool {
        let mut alerts = self.write();
        let before = alerts.len();
        alerts.retain(|a| a.id != id);
        alerts.len() != before
    }

    /// Enable or disable an alert. Returns `true` when found.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        match self.write().iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Number of definitions, enabled or not.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// `true` when there are no definitions.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<AlertDefinition>> {
        self.alerts.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<AlertDefinition>> {
        self.alerts.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AlertSource for InMemoryAlertSource {
    async fn load_alerts(&self) -> anyhow::Result<Vec<AlertDefinition>> {
        Ok(self.read().clone())
    }
}

/// Notifier that logs each notification at info level.
#[derive(Debug, Default)]
pub struct TracingNotifier {
    sent: AtomicU64,
}

impl TracingNotifier {
    /// Create a notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications dispatched so far.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            alert_id = %notification.alert_id,
            title = %notification.title,
            triggered_at = %notification.triggered_at,
            "{}",
            notification.message
        );
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
