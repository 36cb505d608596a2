//! Alert definitions, notifications and scan reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-defined alert checked on every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDefinition {
    /// Stable identifier (e.g. `"acme-listed"`).
    pub id: String,
    /// Human-readable name used in notifications.
    pub name: String,
    /// Disabled alerts are skipped by the scan.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// What makes this alert fire.
    pub condition: AlertCondition,
}

fn default_enabled() -> bool {
    true
}

impl AlertDefinition {
    /// Create an enabled alert.
    pub fn new(id: impl Into<String>, name: impl Into<String>, condition: AlertCondition) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            condition,
        }
    }
}

/// Trigger condition of an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertCondition {
    /// Fires while the upstream registry has a record for `company`.
    CompanyListed {
        /// Company name as typed by the user.
        company: String,
    },
    /// Fires while the upstream registry has no record for `company`.
    CompanyMissing {
        /// Company name as typed by the user.
        company: String,
    },
}

impl std::fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CompanyListed { company } => write!(f, "company listed: {company}"),
            Self::CompanyMissing { company } => write!(f, "company missing: {company}"),
        }
    }
}

/// Message dispatched when an alert fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Id of the alert that fired.
    pub alert_id: String,
    /// Short title.
    pub title: String,
    /// Longer message body.
    pub message: String,
    /// When the evaluation fired.
    pub triggered_at: DateTime<Utc>,
}

/// Counters for one alert scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertScanReport {
    /// Enabled alerts evaluated.
    pub scanned: usize,
    /// Alerts that fired and were dispatched.
    pub triggered: usize,
    /// Alerts whose evaluation or dispatch failed.
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn definition_toml_defaults_to_enabled() {
        let toml_str = r#"
            id = "acme-listed"
            name = "Acme is listed"
            condition = { kind = "company_listed", company = "Acme Corp" }
        "#;
        let alert: AlertDefinition = toml::from_str(toml_str).unwrap();
        assert!(alert.enabled);
        assert_eq!(
            alert.condition,
            AlertCondition::CompanyListed {
                company: "Acme Corp".into()
            }
        );
    }

    #[test]
    fn condition_json_is_tagged_by_kind() {
        let condition = AlertCondition::CompanyMissing {
            company: "Ghost Co".into(),
        };
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["kind"], "company_missing");
        assert_eq!(json["company"], "Ghost Co");
        assert_eq!(condition.to_string(), "company missing: Ghost Co");
    }
}
