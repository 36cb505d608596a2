//! Lookup configuration with sensible defaults.
//!
//! [`LookupConfig`] controls where the upstream registry lives, how long
//! answers are cached and how the cache is sharded. It is embedded as the
//! `[lookup]` section of the server's TOML configuration.

use crate::error::LookupError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the company lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Base URL of the upstream company registry, e.g. `https://registry.example.com/v1`.
    pub base_url: String,
    /// How long a lookup answer (including "no match") stays cached, in seconds.
    /// Zero disables reuse but concurrent callers are still coalesced.
    pub cache_ttl_seconds: u64,
    /// Per-request upstream timeout in seconds.
    pub timeout_seconds: u64,
    /// Number of independently locked cache shards.
    pub shard_count: usize,
    /// Longest accepted lookup name, in characters, after trimming.
    pub max_query_len: usize,
    /// Custom User-Agent for upstream requests. `None` uses the crate default.
    pub user_agent: Option<String>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8700".to_owned(),
            cache_ttl_seconds: 600,
            timeout_seconds: 8,
            shard_count: 16,
            max_query_len: 200,
            user_agent: None,
        }
    }
}

impl LookupConfig {
    /// Cache lifetime as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Upstream timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `base_url` must parse as an absolute `http`/`https` URL
    /// - `timeout_seconds` must be greater than 0
    /// - `shard_count` must be greater than 0
    /// - `max_query_len` must be greater than 0
    pub fn validate(&self) -> Result<(), LookupError> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| LookupError::Config(format!("base_url is not a valid URL: {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(LookupError::Config(
                "base_url must use http or https".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(LookupError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.shard_count == 0 {
            return Err(LookupError::Config(
                "shard_count must be greater than 0".into(),
            ));
        }
        if self.max_query_len == 0 {
            return Err(LookupError::Config(
                "max_query_len must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
