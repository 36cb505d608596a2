//! HTTP fetcher for a JSON company registry.
//!
//! Provides a configured [`reqwest::Client`] and [`HttpCompanyFetcher`],
//! which queries `GET {base_url}/companies?name=<normalized name>` and
//! expects `{"companies": [ ... ]}` back. The first listed company is the
//! match; an empty list or a `404` means "no match".

use crate::config::LookupConfig;
use crate::error::{FetchError, LookupError};
use crate::fetcher::CompanyFetcher;
use crate::types::CompanyRecord;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

/// Default User-Agent sent to the upstream registry.
const DEFAULT_USER_AGENT: &str = concat!("vigil-lookup/", env!("CARGO_PKG_VERSION"));

/// Body returned by the registry search endpoint.
#[derive(Debug, Deserialize)]
struct CompaniesResponse {
    #[serde(default)]
    companies: Vec<CompanyRecord>,
}

/// Build a [`reqwest::Client`] configured for registry lookups.
///
/// The client has:
/// - Timeout from config
/// - Custom User-Agent if configured, otherwise `vigil-lookup/<version>`
/// - gzip decompression
///
/// # Errors
///
/// Returns [`LookupError::Config`] if the client cannot be constructed.
pub fn build_client(config: &LookupConfig) -> Result<reqwest::Client, LookupError> {
    let ua = config
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned());

    reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| LookupError::Config(format!("failed to build HTTP client: {e}")))
}

/// [`CompanyFetcher`] backed by a JSON-over-HTTP registry.
#[derive(Debug, Clone)]
pub struct HttpCompanyFetcher {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpCompanyFetcher {
    /// Create a fetcher from the lookup configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Config`] if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        config.validate()?;
        let client = build_client(config)?;
        Self::with_client(client, &config.base_url)
    }

    /// Create a fetcher around an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Config`] if `base_url` is not a valid URL.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, LookupError> {
        let endpoint = companies_endpoint(base_url)?;
        Ok(Self { client, endpoint })
    }

    /// The resolved `/companies` endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl CompanyFetcher for HttpCompanyFetcher {
    async fn fetch(&self, normalized_name: &str) -> Result<Option<CompanyRecord>, FetchError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("name", normalized_name);
        tracing::trace!(name = normalized_name, "querying company registry");

        let response = self.client.get(url).send().await.map_err(map_send_error)?;
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unspecified")
                    .to_owned();
                return Err(FetchError::RateLimited(format!(
                    "retry after {retry_after}"
                )));
            }
            s if !s.is_success() => {
                return Err(FetchError::Http(format!("registry returned status {s}")));
            }
            _ => {}
        }

        let body: CompaniesResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(format!("invalid registry response: {e}")))?;
        Ok(body.companies.into_iter().next())
    }
}

/// Resolve `{base_url}/companies`, tolerating a trailing slash on the base.
fn companies_endpoint(base_url: &str) -> Result<Url, LookupError> {
    let mut base = Url::parse(base_url)
        .map_err(|e| LookupError::Config(format!("base_url is not a valid URL: {e}")))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("companies")
        .map_err(|e| LookupError::Config(format!("cannot build companies endpoint: {e}")))
}

fn map_send_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(e.to_string())
    } else {
        FetchError::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_with_default_config() {
        assert!(build_client(&LookupConfig::default()).is_ok());
    }

    #[test]
    fn build_client_with_custom_ua() {
        let config = LookupConfig {
            user_agent: Some("CustomBot/1.0".into()),
            ..Default::default()
        };
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn default_user_agent_names_the_crate() {
        assert!(DEFAULT_USER_AGENT.starts_with("vigil-lookup/"));
    }

    #[test]
    fn endpoint_appends_companies_segment() {
        let url = companies_endpoint("https://registry.example.com/v1").unwrap();
        assert_eq!(url.as_str(), "https://registry.example.com/v1/companies");
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let url = companies_endpoint("https://registry.example.com/v1/").unwrap();
        assert_eq!(url.as_str(), "https://registry.example.com/v1/companies");
    }

    #[test]
    fn endpoint_on_bare_host() {
        let url = companies_endpoint("http://127.0.0.1:8700").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8700/companies");
    }

    #[test]
    fn invalid_base_url_rejected() {
        let err = HttpCompanyFetcher::with_client(reqwest::Client::new(), "::nope").unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn new_validates_config() {
        let config = LookupConfig {
            timeout_seconds: 0,
            ..Default::default()
        };
        assert!(HttpCompanyFetcher::new(&config).is_err());
    }

    #[test]
    fn companies_response_defaults_to_empty() {
        let body: CompaniesResponse = serde_json::from_str("{}").unwrap();
        assert!(body.companies.is_empty());
    }
}
