// Custom Domain Registry Module
// Per-project domain sets and the store they live in

pub mod file;
pub mod memory;

use crate::error::{PolicyError, RegistryError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub use file::JsonFileRegistry;
pub use memory::MemoryRegistry;

/// Coverage status of a single custom domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    /// Included in the most recently distributed certificate
    Ok,

    /// Anything else, including an empty or unknown stored value
    #[default]
    #[serde(other)]
    Pending,
}

/// A vanity hostname attached to a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,

    #[serde(default)]
    pub status: DomainStatus,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: DomainStatus::Pending,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == DomainStatus::Ok
    }
}

/// All custom domains of one project plus the state of its certificate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDomainSet {
    /// Document key; not part of the stored document
    #[serde(skip)]
    pub project_id: String,

    #[serde(rename = "_lastUpdated", default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,

    #[serde(
        rename = "_certificateExpiration",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_expiration: Option<String>,

    #[serde(default)]
    pub domains: Vec<Domain>,
}

impl CustomDomainSet {
    pub fn new(project_id: impl Into<String>, domains: Vec<Domain>) -> Self {
        Self {
            project_id: project_id.into(),
            domains,
            ..Default::default()
        }
    }

    /// Names of every registered domain, in stored order
    pub fn domain_names(&self) -> Vec<String> {
        self.domains.iter().map(|d| d.name.clone()).collect()
    }

    /// Stored `_lastUpdated`, with an empty string treated as absent
    pub fn last_updated_raw(&self) -> Option<&str> {
        non_empty(&self.last_updated)
    }

    /// Stored `_certificateExpiration`, with an empty string treated as absent
    pub fn certificate_expiration_raw(&self) -> Option<&str> {
        non_empty(&self.certificate_expiration)
    }

    /// Parsed expiry of the active certificate
    pub fn certificate_expiration_at(&self) -> Result<Option<DateTime<Utc>>, PolicyError> {
        self.certificate_expiration_raw()
            .map(|raw| parse_timestamp("_certificateExpiration", raw))
            .transpose()
    }

    /// Apply the write-back of a successful distribution.
    ///
    /// Domains in `issued` become `ok`, every other domain falls back to
    /// `pending`. Both timestamps are derived from the same `now`.
    pub fn record_issued(&mut self, issued: &[String], now: DateTime<Utc>, validity: Duration) {
        let issued: HashSet<&str> = issued.iter().map(String::as_str).collect();
        for domain in &mut self.domains {
            domain.status = if issued.contains(domain.name.trim()) {
                DomainStatus::Ok
            } else {
                DomainStatus::Pending
            };
        }
        self.last_updated = Some(format_timestamp(now));
        self.certificate_expiration = Some(format_timestamp(now + validity));
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Format a timestamp the way documents store it (RFC 3339, UTC, millis)
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, PolicyError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|source| PolicyError::MalformedTimestamp {
            field,
            value: raw.to_string(),
            source,
        })
}

/// Project ids become document keys and file names
pub fn validate_project_id(project_id: &str) -> Result<(), RegistryError> {
    let valid = !project_id.is_empty()
        && !project_id.starts_with('.')
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidProjectId(project_id.to_string()))
    }
}

/// Tenant metadata store holding one domain set per project
#[async_trait]
pub trait DomainRegistry: Send + Sync {
    /// Every project's domain set, keyed by project id
    async fn get_all(&self) -> Result<BTreeMap<String, CustomDomainSet>, RegistryError>;

    /// Domain set of a single project
    async fn get(&self, project_id: &str) -> Result<CustomDomainSet, RegistryError>;

    /// Replace the domain set of a project
    async fn put(&self, project_id: &str, set: &CustomDomainSet) -> Result<(), RegistryError>;
}
