// Challenge Distributor
// Serves ACME HTTP-01 proofs by copying them to every ingress host

use crate::error::ChallengeError;
use crate::transport::{remote_path, RemoteTransport};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Proof-of-control callback driven by the ACME client
#[async_trait]
pub trait ChallengeResponder: Send + Sync {
    /// Make `key_authorization` servable at `/.well-known/acme-challenge/<token>`
    async fn present(&self, domain: &str, token: &str, key_authorization: &str) -> Result<(), ChallengeError>;

    /// Called once the challenge has been validated or abandoned
    async fn clean_up(&self, domain: &str, token: &str) -> Result<(), ChallengeError>;
}

/// Tokens are base64url strings and end up as file names
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Fans challenge files out to the ingress fleet, one host at a time
pub struct ChallengeDistributor {
    transport: Arc<dyn RemoteTransport>,
    hosts: Vec<String>,
    challenge_dir: String,
    staging_dir: PathBuf,
}

impl ChallengeDistributor {
    pub fn new<P: AsRef<Path>>(
        transport: Arc<dyn RemoteTransport>,
        hosts: Vec<String>,
        challenge_dir: impl Into<String>,
        staging_dir: P,
    ) -> Self {
        Self {
            transport,
            hosts,
            challenge_dir: challenge_dir.into(),
            staging_dir: staging_dir.as_ref().to_path_buf(),
        }
    }

    fn staged_path(&self, token: &str) -> PathBuf {
        self.staging_dir.join(token)
    }

    async fn remove_staged(&self, domain: &str, local: &Path) {
        match tokio::fs::remove_file(local).await {
            Ok(()) => debug!(domain = %domain, "Local challenge file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(domain = %domain, error = %e, "Failed to remove local challenge file"),
        }
    }
}

#[async_trait]
impl ChallengeResponder for ChallengeDistributor {
    async fn present(&self, domain: &str, token: &str, key_authorization: &str) -> Result<(), ChallengeError> {
        if !is_valid_token(token) {
            return Err(ChallengeError::InvalidToken(token.to_string()));
        }

        let local = self.staged_path(token);
        let stage_error = |source| ChallengeError::Stage {
            path: local.display().to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(stage_error)?;
        tokio::fs::write(&local, key_authorization)
            .await
            .map_err(stage_error)?;

        let remote = remote_path(&self.challenge_dir, token);
        for host in &self.hosts {
            info!(domain = %domain, host = %host, "Copying domain challenge");
            // First failing host ends the fan-out for this challenge
            if let Err(e) = self.transport.copy_file(&local, host, &remote).await {
                self.remove_staged(domain, &local).await;
                return Err(e.into());
            }
        }

        Ok(())
    }

    async fn clean_up(&self, domain: &str, token: &str) -> Result<(), ChallengeError> {
        if !is_valid_token(token) {
            return Ok(());
        }

        // Remote copies stay in place; they are inert once validated
        self.remove_staged(domain, &self.staged_path(token)).await;
        Ok(())
    }
}
