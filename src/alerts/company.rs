//! Alerts on company registry listings, answered through the lookup cache.

use super::{AlertCondition, AlertDefinition, AlertEvaluator, Notification};
use async_trait::async_trait;
use tracing::trace;
use vigil_lookup::{CompanyFetcher, LookupService};

/// Evaluates [`AlertCondition`]s with a [`LookupService`].
///
/// Scans share the service's cache with the public search endpoint, so a
/// scan that runs while users search the same company costs no extra
/// upstream call.
pub struct CompanyWatchEvaluator<F> {
    service: LookupService<F>,
}

impl<F> Clone for CompanyWatchEvaluator<F> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

impl<F> std::fmt::Debug for CompanyWatchEvaluator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompanyWatchEvaluator")
            .field("service", &self.service)
            .finish()
    }
}

impl<F: CompanyFetcher> CompanyWatchEvaluator<F> {
    /// Evaluate alerts against `service`.
    pub fn new(service: LookupService<F>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<F: CompanyFetcher> AlertEvaluator for CompanyWatchEvaluator<F> {
    async fn evaluate(&self, alert: &AlertDefinition) -> anyhow::Result<Option<Notification>> {
        let (company, want_listed) = match &alert.condition {
            AlertCondition::CompanyListed { company } => (company, true),
            AlertCondition::CompanyMissing { company } => (company, false),
        };

        let outcome = self.service.search(company).await?;
        trace!(alert_id = %alert.id, from_cache = outcome.from_cache, "company lookup for alert");

        let message = match (&outcome.result, want_listed) {
            (Some(record), true) => format!("{} is listed as {}", company, record.name),
            (None, false) => format!("{company} is not listed"),
            _ => return Ok(None),
        };
        Ok(Some(Notification {
            alert_id: alert.id.clone(),
            title: alert.name.clone(),
            message,
            triggered_at: chrono::Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_lookup::{CompanyRecord, FetchError, LookupConfig, LookupError};

    /// Knows exactly one company, "acme corp".
    #[derive(Default)]
    struct OneCompany {
        calls: AtomicUsize,
        down: bool,
    }

    impl CompanyFetcher for OneCompany {
        async fn fetch(&self, normalized_name: &str) -> Result<Option<CompanyRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down {
                return Err(FetchError::Http("503 Service Unavailable".into()));
            }
            Ok((normalized_name == "acme corp").then(|| CompanyRecord {
                name: "Acme Corp".into(),
                registration_number: None,
                domain: None,
                country: None,
            }))
        }
    }

    fn evaluator(fetcher: Arc<OneCompany>) -> CompanyWatchEvaluator<Arc<OneCompany>> {
        CompanyWatchEvaluator::new(LookupService::new(fetcher, &LookupConfig::default()).unwrap())
    }

    fn listed(company: &str) -> AlertDefinition {
        AlertDefinition::new(
            "listed",
            "Listed",
            AlertCondition::CompanyListed {
                company: company.into(),
            },
        )
    }

    fn missing(company: &str) -> AlertDefinition {
        AlertDefinition::new(
            "missing",
            "Missing",
            AlertCondition::CompanyMissing {
                company: company.into(),
            },
        )
    }

    #[tokio::test]
    async fn listed_fires_only_for_known_company() {
        let evaluator = evaluator(Arc::new(OneCompany::default()));

        let fired = evaluator.evaluate(&listed("ACME Corp")).await.unwrap().unwrap();
        assert_eq!(fired.alert_id, "listed");
        assert_eq!(fired.message, "ACME Corp is listed as Acme Corp");

        assert!(evaluator.evaluate(&listed("Ghost Co")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_fires_only_for_unknown_company() {
        let evaluator = evaluator(Arc::new(OneCompany::default()));

        let fired = evaluator.evaluate(&missing("Ghost Co")).await.unwrap().unwrap();
        assert_eq!(fired.message, "Ghost Co is not listed");

        assert!(evaluator.evaluate(&missing("acme corp")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_scans_hit_the_cache() {
        let fetcher = Arc::new(OneCompany::default());
        let evaluator = evaluator(Arc::clone(&fetcher));

        evaluator.evaluate(&listed("Acme Corp")).await.unwrap();
        evaluator.evaluate(&missing("acme corp")).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn upstream_failure_is_an_evaluation_error() {
        let evaluator = evaluator(Arc::new(OneCompany {
            down: true,
            ..Default::default()
        }));
        let err = evaluator.evaluate(&listed("Acme Corp")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LookupError>(),
            Some(LookupError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn blank_company_is_an_evaluation_error() {
        let evaluator = evaluator(Arc::new(OneCompany::default()));
        let err = evaluator.evaluate(&listed("   ")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LookupError>(),
            Some(LookupError::InvalidInput(_))
        ));
    }
}
