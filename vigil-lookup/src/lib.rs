//! # vigil-lookup
//!
//! Cache-aside company lookup for the vigil refresh core.
//!
//! Upstream registry calls are expensive and rate-limited, and many
//! requests ask for the same company at the same time. This crate puts a
//! single-flight cache in front of a pluggable upstream fetcher so that:
//!
//! - concurrent lookups of one name produce exactly one upstream call
//! - answers (including "no match") are reused for a bounded TTL
//! - failures are shared with every coalesced caller but never cached
//! - every answer says whether it came from a fresh fetch or the cache
//!
//! ## Layout
//!
//! - [`cache`]: generic [`SingleFlightCache`]
//! - [`fetcher`]: the [`CompanyFetcher`] trait
//! - [`http`]: [`HttpCompanyFetcher`], the reqwest-based fetcher
//! - [`service`]: [`LookupService`], validation and key normalisation

pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod service;
pub mod types;

pub use cache::{CacheStats, Lookup, SingleFlightCache};
pub use config::LookupConfig;
pub use error::{CacheError, FetchError, LookupError, Result};
pub use fetcher::CompanyFetcher;
pub use http::HttpCompanyFetcher;
pub use service::LookupService;
pub use types::{normalize_name, CompanyRecord, SearchOutcome};

/// Build a [`LookupService`] backed by the HTTP registry described in `config`.
///
/// # Errors
///
/// Returns [`LookupError::Config`] if the configuration is invalid or the
/// HTTP client cannot be built.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> vigil_lookup::Result<()> {
/// let service = vigil_lookup::http_service(&vigil_lookup::LookupConfig::default())?;
/// let outcome = service.search("Acme Corp").await?;
/// println!("found: {:?}, cached: {}", outcome.result, outcome.from_cache);
/// # Ok(())
/// # }
/// ```
pub fn http_service(config: &LookupConfig) -> Result<LookupService<HttpCompanyFetcher>> {
    let fetcher = HttpCompanyFetcher::new(config)?;
    LookupService::new(fetcher, config)
}
