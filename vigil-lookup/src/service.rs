//! Company lookup service: input validation, key normalisation and
//! cache-aside access to the upstream fetcher.
//!
//! # Pipeline
//!
//! 1. Reject blank or overlong names with [`LookupError::InvalidInput`]
//! 2. Normalise the name into the cache key (see [`normalize_name`])
//! 3. [`SingleFlightCache::get_or_load`] with the configured TTL
//! 4. On a miss, the fetcher runs once for every concurrent caller of the key
//! 5. Map cache failures to [`LookupError::Upstream`]

use crate::cache::{CacheStats, SingleFlightCache};
use crate::config::LookupConfig;
use crate::error::{FetchError, LookupError};
use crate::fetcher::CompanyFetcher;
use crate::types::{normalize_name, CompanyRecord, SearchOutcome};
use std::sync::Arc;
use std::time::Duration;

/// Cache type used by [`LookupService`]: `None` answers are cached too.
pub type CompanyCache = SingleFlightCache<String, Option<CompanyRecord>, FetchError>;

/// "Find company by name" on top of a single-flight cache.
///
/// Cloning is cheap; clones share the fetcher and the cache.
pub struct LookupService<F> {
    fetcher: Arc<F>,
    cache: CompanyCache,
    ttl: Duration,
    max_query_len: usize,
}

impl<F> Clone for LookupService<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            cache: self.cache.clone(),
            ttl: self.ttl,
            max_query_len: self.max_query_len,
        }
    }
}

impl<F> std::fmt::Debug for LookupService<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupService")
            .field("cache", &self.cache)
            .field("ttl", &self.ttl)
            .field("max_query_len", &self.max_query_len)
            .finish_non_exhaustive()
    }
}

impl<F: CompanyFetcher> LookupService<F> {
    /// Create a service from a fetcher and the lookup configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Config`] if the configuration is invalid.
    pub fn new(fetcher: F, config: &LookupConfig) -> Result<Self, LookupError> {
        config.validate()?;
        Ok(Self {
            fetcher: Arc::new(fetcher),
            cache: SingleFlightCache::new(config.shard_count),
            ttl: config.cache_ttl(),
            max_query_len: config.max_query_len,
        })
    }

    /// Look up a company by free-text name.
    ///
    /// Names differing only in surrounding/inner whitespace or case share
    /// one cache entry. A "no match" answer is cached like any other.
    ///
    /// # Errors
    ///
    /// - [`LookupError::InvalidInput`] when the trimmed name is empty or
    ///   longer than `max_query_len` characters; the cache is not touched.
    /// - [`LookupError::Upstream`] when the fetch failed. Failures are not
    ///   cached; the next call fetches again.
    pub async fn search(&self, raw_name: &str) -> Result<SearchOutcome, LookupError> {
        let key = self.validate_name(raw_name)?;

        let fetcher = Arc::clone(&self.fetcher);
        let fetch_key = key.clone();
        let lookup = self
            .cache
            .get_or_load(key, self.ttl, move || async move {
                fetcher.fetch(&fetch_key).await
            })
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "company lookup failed"))?;

        tracing::debug!(
            from_cache = lookup.from_cache,
            found = lookup.value.is_some(),
            "company lookup answered"
        );
        Ok(SearchOutcome {
            result: lookup.value,
            from_cache: lookup.from_cache,
        })
    }

    /// Drop the cached answer for `raw_name`. Returns `true` if one existed.
    pub fn invalidate(&self, raw_name: &str) -> bool {
        self.cache.invalidate(&normalize_name(raw_name))
    }

    /// Reclaim expired cache entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of live cached answers.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    fn validate_name(&self, raw_name: &str) -> Result<String, LookupError> {
        let key = normalize_name(raw_name);
        if key.is_empty() {
            return Err(LookupError::InvalidInput("name must not be empty".into()));
        }
        if key.chars().count() > self.max_query_len {
            return Err(LookupError::InvalidInput(format!(
                "name must be at most {} characters",
                self.max_query_len
            )));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory registry that counts upstream calls.
    #[derive(Default)]
    struct CountingFetcher {
        records: HashMap<String, CompanyRecord>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CompanyFetcher for CountingFetcher {
        async fn fetch(&self, normalized_name: &str) -> Result<Option<CompanyRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FetchError::Timeout("exceeded 8s".into()));
            }
            Ok(self.records.get(normalized_name).cloned())
        }
    }

    fn acme() -> CompanyRecord {
        CompanyRecord {
            name: "Acme Corp".into(),
            registration_number: Some("01234567".into()),
            domain: Some("acme.example".into()),
            country: Some("GB".into()),
        }
    }

    fn service_with(fetcher: Arc<CountingFetcher>) -> LookupService<Arc<CountingFetcher>> {
        LookupService::new(fetcher, &LookupConfig::default()).unwrap()
    }

    fn registry() -> Arc<CountingFetcher> {
        Arc::new(CountingFetcher {
            records: HashMap::from([("acme corp".to_owned(), acme())]),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn empty_name_is_invalid_input() {
        let fetcher = registry();
        let service = service_with(Arc::clone(&fetcher));

        for raw in ["", "   ", "\t\n"] {
            let err = service.search(raw).await.unwrap_err();
            assert!(matches!(err, LookupError::InvalidInput(_)), "{raw:?}");
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.cache_stats().misses, 0);
    }

    #[tokio::test]
    async fn overlong_name_is_invalid_input() {
        let fetcher = registry();
        let config = LookupConfig {
            max_query_len: 5,
            ..Default::default()
        };
        let service = LookupService::new(Arc::clone(&fetcher), &config).unwrap();

        let err = service.search("Acme Corporation").await.unwrap_err();
        assert!(err.to_string().contains("at most 5"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn whitespace_and_case_share_one_entry() {
        let fetcher = registry();
        let service = service_with(Arc::clone(&fetcher));

        let first = service.search("  Acme Corp  ").await.unwrap();
        let second = service.search("acme corp").await.unwrap();
        let third = service.search("ACME   CORP").await.unwrap();

        assert_eq!(first.result, Some(acme()));
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert!(third.from_cache);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_match_is_cached() {
        let fetcher = registry();
        let service = service_with(Arc::clone(&fetcher));

        let first = service.search("Ghost Co").await.unwrap();
        let second = service.search("Ghost Co").await.unwrap();

        assert_eq!(first, SearchOutcome { result: None, from_cache: false });
        assert_eq!(second, SearchOutcome { result: None, from_cache: true });
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn upstream_failure_is_upstream_error_and_not_cached() {
        let fetcher = Arc::new(CountingFetcher {
            fail: true,
            ..Default::default()
        });
        let service = service_with(Arc::clone(&fetcher));

        for _ in 0..2 {
            let err = service.search("Acme Corp").await.unwrap_err();
            assert!(matches!(err, LookupError::Upstream(_)));
            assert!(!err.is_client_error());
            assert!(err.to_string().contains("upstream timed out"));
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.cached_entries(), 0);
    }

    #[tokio::test]
    async fn invalidate_uses_normalised_key() {
        let fetcher = registry();
        let service = service_with(Arc::clone(&fetcher));

        service.search("Acme Corp").await.unwrap();
        assert!(service.invalidate("  ACME corp "));
        let again = service.search("Acme Corp").await.unwrap();
        assert!(!again.from_cache);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = LookupConfig {
            shard_count: 0,
            ..Default::default()
        };
        let err = LookupService::new(registry(), &config).unwrap_err();
        assert!(matches!(err, LookupError::Config(_)));
    }
}
