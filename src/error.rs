// Error taxonomy for the certificate lifecycle
// One variant per failure class so callers can tell where a run stopped

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the tenant metadata store
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no custom domains registered for project [{0}]")]
    NotFound(String),

    #[error("invalid project id [{0}]")]
    InvalidProjectId(String),

    #[error("failed to parse custom domains of project [{project_id}]: {source}")]
    Parse {
        project_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("registry I/O failed for [{path}]: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while evaluating the renewal policy
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("malformed {field} timestamp [{value}]: {source}")]
    MalformedTimestamp {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Stage of the ACME handshake that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcmeStage {
    Registration,
    Order,
    Challenge,
    Finalize,
}

impl std::fmt::Display for AcmeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcmeStage::Registration => write!(f, "registration"),
            AcmeStage::Order => write!(f, "order"),
            AcmeStage::Challenge => write!(f, "challenge"),
            AcmeStage::Finalize => write!(f, "finalize"),
        }
    }
}

/// ACME failure tagged with the stage it happened in
#[derive(Debug, Error)]
#[error("ACME {stage} failed: {message}")]
pub struct AcmeError {
    pub stage: AcmeStage,
    pub message: String,
}

impl AcmeError {
    pub fn new(stage: AcmeStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Errors raised by the remote copy / remote exec transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to copy [{local}] to {host}:{remote}: {reason}")]
    Copy {
        host: String,
        local: String,
        remote: String,
        reason: String,
    },

    #[error("command [{command}] failed on {host}: {reason}")]
    Exec {
        host: String,
        command: String,
        reason: String,
    },
}

impl TransportError {
    /// Host the failed operation was aimed at
    pub fn host(&self) -> &str {
        match self {
            TransportError::Copy { host, .. } | TransportError::Exec { host, .. } => host,
        }
    }
}

/// Errors raised while challenge files are fanned out
#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("refusing challenge token [{0}]: not a base64url string")]
    InvalidToken(String),

    #[error("failed to stage challenge file [{path}]: {source}")]
    Stage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors raised while pushing certificate material to ingress hosts
#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("failed to render vhost config: {0}")]
    Template(#[from] minijinja::Error),

    #[error("failed to stage [{path}]: {source}")]
    Stage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("distribution stopped at {failed_host} (already updated: {updated:?}): {source}")]
    HostFailed {
        failed_host: String,
        updated: Vec<String>,
        #[source]
        source: TransportError,
    },
}

/// Terminal error of a single project run
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Acme(#[from] AcmeError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("run for project [{project_id}] exceeded its {after:?} deadline")]
    Timeout { project_id: String, after: Duration },
}

pub type Result<T, E = LifecycleError> = std::result::Result<T, E>;
