// Renewal Policy Engine
// Decides per project whether a certificate has to be issued

use crate::error::PolicyError;
use crate::registry::CustomDomainSet;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Why a certificate action is or is not required
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RenewalDecision {
    /// Nothing passed CNAME validation
    NoValidDomains,

    /// Certificate is far from expiry and covers every valid domain
    UpToDate { days_remaining: f64 },

    /// No certificate has ever been recorded
    FirstIssue,

    /// Expiry is closer than the threshold
    ExpiringSoon { days_remaining: f64 },

    /// Valid domains that the current certificate does not cover
    CoverageGap { domains: Vec<String> },
}

impl RenewalDecision {
    pub fn is_required(&self) -> bool {
        !matches!(
            self,
            RenewalDecision::NoValidDomains | RenewalDecision::UpToDate { .. }
        )
    }
}

impl std::fmt::Display for RenewalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenewalDecision::NoValidDomains => write!(f, "no valid domains"),
            RenewalDecision::UpToDate { days_remaining } => {
                write!(f, "up to date ({:.1} days left)", days_remaining)
            }
            RenewalDecision::FirstIssue => write!(f, "first issue"),
            RenewalDecision::ExpiringSoon { days_remaining } => {
                write!(f, "expiring in {:.1} days", days_remaining)
            }
            RenewalDecision::CoverageGap { domains } => {
                write!(f, "not yet covered: {}", domains.join(", "))
            }
        }
    }
}

/// Renewal policy with a fixed days-before-expiry threshold
#[derive(Debug, Clone, Copy)]
pub struct RenewalPolicy {
    threshold_days: i64,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self { threshold_days: 30 }
    }
}

impl RenewalPolicy {
    pub fn new(threshold_days: i64) -> Self {
        Self { threshold_days }
    }

    pub fn threshold_days(&self) -> i64 {
        self.threshold_days
    }

    /// Evaluate the rules in order. Days remaining are measured from `now`.
    pub fn evaluate(
        &self,
        set: &CustomDomainSet,
        valid_domains: &[String],
        now: DateTime<Utc>,
    ) -> Result<RenewalDecision, PolicyError> {
        if valid_domains.is_empty() {
            return Ok(RenewalDecision::NoValidDomains);
        }

        if set.last_updated_raw().is_none() {
            return Ok(RenewalDecision::FirstIssue);
        }
        let Some(expires_at) = set.certificate_expiration_at()? else {
            return Ok(RenewalDecision::FirstIssue);
        };

        let days_remaining = (expires_at - now).num_seconds() as f64 / 86_400.0;
        if days_remaining < self.threshold_days as f64 {
            return Ok(RenewalDecision::ExpiringSoon { days_remaining });
        }

        let valid: HashSet<&str> = valid_domains.iter().map(String::as_str).collect();
        let uncovered: Vec<String> = set
            .domains
            .iter()
            .filter(|d| valid.contains(d.name.trim()) && !d.is_ok())
            .map(|d| d.name.trim().to_string())
            .collect();
        if !uncovered.is_empty() {
            return Ok(RenewalDecision::CoverageGap { domains: uncovered });
        }

        Ok(RenewalDecision::UpToDate { days_remaining })
    }
}
