//! Process startup hook for the refresh/lookup core.
//!
//! [`bootstrap`] may run any number of times in one process (development
//! reloads, repeated server setup). The core is built once through the
//! [`ProcessRegistry`], and its background tasks are started with the
//! scheduler's idempotent `start`, so later calls change nothing.

use crate::alerts::{
    AlertEvaluationTask, AlertSource, CompanyWatchEvaluator, InMemoryAlertSource, Notifier,
    TracingNotifier,
};
use crate::config::VigilConfig;
use crate::error::Result;
use crate::registry::ProcessRegistry;
use crate::scheduler::{
    FirstTick, PeriodicScheduler, TASK_PURGE_LOOKUP_CACHE, TASK_SCAN_ALERTS, TaskStatus, task_fn,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use vigil_lookup::{CompanyFetcher, HttpCompanyFetcher, LookupService};

/// Registry slot holding the core.
pub const CORE_REGISTRY_KEY: &str = "vigil.core";

/// Collaborators handed to the core the first time it is built.
pub struct CoreParts<F> {
    /// Upstream company registry.
    pub fetcher: F,
    /// Where alert definitions come from.
    pub alert_source: Arc<dyn AlertSource>,
    /// Where triggered alerts go.
    pub notifier: Arc<dyn Notifier>,
}

/// The process-wide lookup service and scheduler.
pub struct Core<F> {
    lookup: LookupService<F>,
    scheduler: PeriodicScheduler,
    alerts: AlertEvaluationTask,
}

impl<F> std::fmt::Debug for Core<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("lookup", &self.lookup)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl<F: CompanyFetcher> Core<F> {
    fn build(config: &VigilConfig, parts: CoreParts<F>) -> Result<Self> {
        let lookup = LookupService::new(parts.fetcher, &config.lookup)?;
        let evaluator = Arc::new(CompanyWatchEvaluator::new(lookup.clone()));
        let alerts = AlertEvaluationTask::new(parts.alert_source, evaluator, parts.notifier);
        Ok(Self {
            lookup,
            scheduler: PeriodicScheduler::new().with_first_tick(config.alerts.first_tick),
            alerts,
        })
    }

    /// The shared company lookup service.
    pub fn lookup(&self) -> &LookupService<F> {
        &self.lookup
    }

    /// The background scheduler.
    pub fn scheduler(&self) -> &PeriodicScheduler {
        &self.scheduler
    }

    /// The alert scan body, for running a scan outside the schedule.
    pub fn alerts(&self) -> &AlertEvaluationTask {
        &self.alerts
    }

    /// Snapshots of every background task.
    pub fn task_statuses(&self) -> Vec<TaskStatus> {
        self.scheduler.statuses()
    }

    /// Stop background tasks and wait for in-progress runs.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    fn start_tasks(&self, config: &VigilConfig) -> Result<()> {
        if config.alerts.enabled {
            let started = self.scheduler.start_with(
                TASK_SCAN_ALERTS,
                config.alerts.scan_interval(),
                config.alerts.first_tick,
                self.alerts.clone(),
            )?;
            debug!(task = TASK_SCAN_ALERTS, started, "bootstrap task");
        }

        let purge_secs = config.maintenance.cache_purge_interval_secs;
        if purge_secs > 0 {
            let lookup = self.lookup.clone();
            let started = self.scheduler.start_with(
                TASK_PURGE_LOOKUP_CACHE,
                Duration::from_secs(purge_secs),
                FirstTick::AfterInterval,
                task_fn(move || {
                    let lookup = lookup.clone();
                    async move {
                        let purged = lookup.purge_expired();
                        debug!(purged, remaining = lookup.cached_entries(), "lookup cache swept");
                        Ok(())
                    }
                }),
            )?;
            debug!(task = TASK_PURGE_LOOKUP_CACHE, started, "bootstrap task");
        }
        Ok(())
    }
}

/// Initialise the core in `registry`, or return the one already there.
///
/// `parts` runs only when the core does not exist yet. Background tasks are
/// (re)started idempotently on every call, so a task stopped by hand is
/// scheduled again.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if `config` is invalid, `parts` fails, or a task cannot
/// be scheduled.
pub fn bootstrap_in<F, P>(
    registry: &ProcessRegistry,
    config: &VigilConfig,
    parts: P,
) -> Result<Arc<Core<F>>>
where
    F: CompanyFetcher,
    P: FnOnce() -> Result<CoreParts<F>>,
{
    config.validate()?;

    let mut built = false;
    let core = registry.get_or_init(CORE_REGISTRY_KEY, || {
        built = true;
        Core::build(config, parts()?)
    })?;
    if built {
        info!("refresh/lookup core initialised");
    } else {
        debug!("refresh/lookup core already initialised, reusing");
    }

    core.start_tasks(config)?;
    Ok(core)
}

/// Initialise the process-wide core backed by the HTTP company registry.
///
/// Alert definitions come from `config.alerts.definitions`; notifications
/// go to the log.
///
/// # Errors
///
/// See [`bootstrap_in`].
pub fn bootstrap(config: &VigilConfig) -> Result<Arc<Core<HttpCompanyFetcher>>> {
    bootstrap_in(ProcessRegistry::global(), config, || {
        Ok(CoreParts {
            fetcher: HttpCompanyFetcher::new(&config.lookup)?,
            alert_source: Arc::new(InMemoryAlertSource::new(
                config.alerts.definitions.clone(),
            )),
            notifier: Arc::new(TracingNotifier::new()),
        })
    })
}
