// Certificate Acquisition Module
// Obtains a signed certificate for a validated domain set over ACME

pub mod instant;

use crate::challenge::ChallengeResponder;
use crate::error::AcmeError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub use instant::InstantAcmeClient;

/// PEM-encoded certificate chain and its private key
#[derive(Clone)]
pub struct IssuedCertificate {
    pub chain_pem: String,
    pub key_pem: String,
}

impl std::fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("chain_pem_len", &self.chain_pem.len())
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// ACME client capability: issue a certificate, proving control through `responder`
#[async_trait]
pub trait AcmeClient: Send + Sync {
    async fn obtain_certificate(
        &self,
        domains: &[String],
        responder: &dyn ChallengeResponder,
    ) -> Result<IssuedCertificate, AcmeError>;
}

/// Drives the ACME client with the ingress challenge distributor as callback
pub struct CertificateAcquirer {
    client: Arc<dyn AcmeClient>,
    responder: Arc<dyn ChallengeResponder>,
}

impl CertificateAcquirer {
    pub fn new(client: Arc<dyn AcmeClient>, responder: Arc<dyn ChallengeResponder>) -> Self {
        Self { client, responder }
    }

    pub async fn acquire(&self, domains: &[String]) -> Result<IssuedCertificate, AcmeError> {
        let started = Instant::now();
        info!(domains = ?domains, "Requesting certificate");

        match self
            .client
            .obtain_certificate(domains, self.responder.as_ref())
            .await
        {
            Ok(certificate) => {
                info!(
                    domains = domains.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Certificate issued"
                );
                Ok(certificate)
            }
            Err(e) => {
                warn!(stage = %e.stage, error = %e.message, "Certificate request failed");
                Err(e)
            }
        }
    }
}
