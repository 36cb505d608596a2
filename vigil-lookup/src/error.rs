//! Error types for the vigil-lookup crate.
//!
//! Messages are stable strings suitable for display to API clients. Lookup
//! names never appear in upstream error messages.

use std::fmt;
use std::sync::Arc;

/// Errors raised by an upstream [`CompanyFetcher`](crate::fetcher::CompanyFetcher).
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request failed or the provider answered with an error status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider did not answer within the configured timeout.
    #[error("upstream timed out: {0}")]
    Timeout(String),

    /// The provider is rate limiting this client.
    #[error("upstream rate limited: {0}")]
    RateLimited(String),

    /// The provider answered with a body that could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Errors produced by [`SingleFlightCache`](crate::cache::SingleFlightCache).
///
/// Every caller coalesced on one load receives a clone of the same error.
#[derive(Debug)]
pub enum CacheError<E> {
    /// The loader failed. The cause is shared between all waiters.
    LookupFailed(Arc<E>),
    /// The load task ended without producing a result (panic or runtime shutdown).
    LoadAborted,
}

impl<E> Clone for CacheError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::LookupFailed(cause) => Self::LookupFailed(Arc::clone(cause)),
            Self::LoadAborted => Self::LoadAborted,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CacheError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LookupFailed(cause) => write!(f, "lookup failed: {cause}"),
            Self::LoadAborted => f.write_str("lookup aborted before completion"),
        }
    }
}

impl<E> std::error::Error for CacheError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::LookupFailed(cause) => Some(cause.as_ref()),
            Self::LoadAborted => None,
        }
    }
}

/// Errors surfaced by [`LookupService`](crate::service::LookupService).
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The caller supplied an unusable name. Never reaches the cache.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The upstream fetch failed for this lookup and every coalesced caller.
    #[error("upstream error: {0}")]
    Upstream(#[from] CacheError<FetchError>),

    /// Invalid lookup configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl LookupError {
    /// Returns `true` when the error was caused by the caller, not the provider.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

/// Convenience type alias for vigil-lookup results.
pub type Result<T> = std::result::Result<T, LookupError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_fetch_errors() {
        assert_eq!(
            FetchError::Http("status 500".into()).to_string(),
            "HTTP error: status 500"
        );
        assert_eq!(
            FetchError::Timeout("exceeded 5s".into()).to_string(),
            "upstream timed out: exceeded 5s"
        );
        assert_eq!(
            FetchError::RateLimited("retry later".into()).to_string(),
            "upstream rate limited: retry later"
        );
        assert_eq!(
            FetchError::Parse("missing field".into()).to_string(),
            "parse error: missing field"
        );
    }

    #[test]
    fn lookup_failed_carries_cause() {
        let err: CacheError<FetchError> =
            CacheError::LookupFailed(Arc::new(FetchError::Http("status 503".into())));
        assert_eq!(err.to_string(), "lookup failed: HTTP error: status 503");
        let source = err.source().expect("cause should be exposed as source");
        assert_eq!(source.to_string(), "HTTP error: status 503");
    }

    #[test]
    fn load_aborted_has_no_source() {
        let err: CacheError<FetchError> = CacheError::LoadAborted;
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "lookup aborted before completion");
    }

    #[test]
    fn cloned_cache_error_shares_cause() {
        let cause = Arc::new(FetchError::Timeout("8s".into()));
        let err: CacheError<FetchError> = CacheError::LookupFailed(Arc::clone(&cause));
        let copy = err.clone();
        match copy {
            CacheError::LookupFailed(shared) => assert!(Arc::ptr_eq(&shared, &cause)),
            CacheError::LoadAborted => panic!("expected LookupFailed"),
        }
    }

    #[test]
    fn upstream_wraps_lookup_failed() {
        let err = LookupError::from(CacheError::LookupFailed(Arc::new(FetchError::RateLimited(
            "429".into(),
        ))));
        assert_eq!(
            err.to_string(),
            "upstream error: lookup failed: upstream rate limited: 429"
        );
        assert!(!err.is_client_error());
    }

    #[test]
    fn invalid_input_is_client_error() {
        let err = LookupError::InvalidInput("name must not be empty".into());
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "invalid input: name must not be empty");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LookupError>();
        assert_send_sync::<CacheError<FetchError>>();
    }
}
