//! Trait definition for pluggable upstream company registries.
//!
//! The lookup service never talks to a provider directly; it goes through a
//! [`CompanyFetcher`]. [`HttpCompanyFetcher`](crate::http::HttpCompanyFetcher)
//! is the production implementation; tests plug in in-memory fetchers.

use crate::error::FetchError;
use crate::types::CompanyRecord;
use std::future::Future;
use std::sync::Arc;

/// An upstream source of company records.
///
/// Implementations own their latency, retry and timeout behaviour. The
/// cache in front of them only guarantees that one key is fetched by at
/// most one caller at a time.
///
/// All implementations must be `Send + Sync` so a single fetcher can serve
/// concurrent requests.
pub trait CompanyFetcher: Send + Sync + 'static {
    /// Fetch the company matching `normalized_name`.
    ///
    /// `normalized_name` is already trimmed, whitespace-collapsed and
    /// lowercased. Returns `Ok(None)` when the provider has no match.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the provider is unreachable, times out,
    /// rate-limits the request or answers with an undecodable body.
    fn fetch(
        &self,
        normalized_name: &str,
    ) -> impl Future<Output = Result<Option<CompanyRecord>, FetchError>> + Send;
}

impl<T: CompanyFetcher> CompanyFetcher for Arc<T> {
    fn fetch(
        &self,
        normalized_name: &str,
    ) -> impl Future<Output = Result<Option<CompanyRecord>, FetchError>> + Send {
        (**self).fetch(normalized_name)
    }
}
