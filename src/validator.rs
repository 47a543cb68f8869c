// CNAME Validator
// Keeps only hostnames that are delegated to the platform's ingress name

use async_trait::async_trait;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound on CNAME hops followed for one hostname
const MAX_CNAME_HOPS: usize = 8;

/// Resolves the canonical name a hostname points at
#[async_trait]
pub trait CnameResolver: Send + Sync {
    async fn canonical_name(&self, host: &str) -> io::Result<String>;
}

/// CNAME resolver backed by the system resolver configuration
pub struct HickoryCnameResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryCnameResolver {
    pub fn from_system_conf() -> io::Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Self { resolver })
    }

    async fn next_hop(&self, name: &str) -> io::Result<Option<String>> {
        let lookup = self
            .resolver
            .lookup(name, RecordType::CNAME)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        Ok(lookup.iter().find_map(|rdata| match rdata {
            RData::CNAME(cname) => Some(cname.0.to_utf8()),
            _ => None,
        }))
    }
}

#[async_trait]
impl CnameResolver for HickoryCnameResolver {
    /// Follows the CNAME chain and returns its last name
    async fn canonical_name(&self, host: &str) -> io::Result<String> {
        let mut current = self
            .next_hop(host)
            .await?
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no CNAME record"))?;

        for _ in 1..MAX_CNAME_HOPS {
            match self.next_hop(&current).await {
                Ok(Some(next)) => current = next,
                _ => break,
            }
        }

        Ok(current)
    }
}

/// True when the name consists of digits only (empty counts as numeric)
pub fn is_numeric_only(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_digit())
}

fn trim_root(name: &str) -> &str {
    name.trim_end_matches('.')
}

/// Filters candidate hostnames down to those delegated to the ingress
pub struct CnameValidator {
    resolver: Arc<dyn CnameResolver>,
    target: String,
}

impl CnameValidator {
    pub fn new(resolver: Arc<dyn CnameResolver>, target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            resolver,
            target: trim_root(&target).to_string(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Return the candidates whose CNAME points at the ingress.
    ///
    /// Lookup failures drop the hostname without failing the pass.
    pub async fn filter(&self, candidates: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut valid = Vec::new();

        for candidate in candidates {
            let name = candidate.trim();
            if is_numeric_only(name) || !seen.insert(name.to_string()) {
                continue;
            }

            match self.resolver.canonical_name(name).await {
                Ok(cname) if trim_root(&cname).eq_ignore_ascii_case(&self.target) => {
                    valid.push(name.to_string());
                }
                Ok(cname) => {
                    debug!(domain = %name, cname = %cname, "CNAME does not point at ingress");
                }
                Err(e) => {
                    debug!(domain = %name, error = %e, "CNAME lookup failed");
                }
            }
        }

        info!(
            candidates = candidates.len(),
            valid = valid.len(),
            target = %self.target,
            "CNAME validation finished"
        );

        valid
    }
}
