//! Core types for company lookups.

use serde::{Deserialize, Serialize};

/// A company record as returned by the upstream registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// Registered company name.
    pub name: String,
    /// Registry identifier (company number, SIREN, EIN, ...), if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
    /// Primary web domain, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// ISO 3166 country code of registration, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Answer to a single [`LookupService::search`](crate::service::LookupService::search) call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    /// The matching company, or `None` when the upstream has no match.
    pub result: Option<CompanyRecord>,
    /// `false` when this call triggered the upstream fetch, `true` when it was
    /// answered from the cache or rode another caller's in-flight fetch.
    pub from_cache: bool,
}

/// Normalise a raw lookup name into its cache key.
///
/// Trims, collapses internal whitespace runs to a single space and
/// lowercases, so `"  Acme   Corp "` and `"acme corp"` share one entry.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
