// Configuration Management Module
// Handles certs.toml loading, defaults, and validation

pub mod acme;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use acme::{AcmeDirectory, AcmeSettings};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "certs.toml";

/// Main certificate manager configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub ingress: IngressConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub acme: AcmeSettings,

    #[serde(default)]
    pub renewal: RenewalConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngressConfig {
    /// Ingress hosts, `host` or `host:port`, updated in this order
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Hostname every custom domain must CNAME to
    #[serde(default)]
    pub cname_target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Ssh,
    /// Mirror remote paths under a local directory, one subdirectory per host
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,

    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_cert_dir")]
    pub cert_dir: String,

    #[serde(default = "default_key_dir")]
    pub key_dir: String,

    #[serde(default = "default_vhost_dir")]
    pub vhost_dir: String,

    #[serde(default = "default_challenge_dir")]
    pub challenge_dir: String,

    /// Overrides the built-in vhost template
    #[serde(default)]
    pub vhost_template: Option<PathBuf>,

    /// Local scratch space for staged certificates and challenge files
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default = "default_reload_command")]
    pub reload_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalConfig {
    #[serde(default = "default_threshold_days")]
    pub threshold_days: i64,

    #[serde(default = "default_validity_days")]
    pub validity_days: i64,

    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory holding one `<project>.json` document per project
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    #[serde(default)]
    pub server_token: Option<String>,
}

// Default value functions
fn default_connect_timeout() -> u64 { 10 }
fn default_local_root() -> PathBuf { PathBuf::from("mirror") }
fn default_cert_dir() -> String { "/opt/letsencrypt/certs/".to_string() }
fn default_key_dir() -> String { "/opt/letsencrypt/private/".to_string() }
fn default_vhost_dir() -> String { "/etc/nginx/custom-domains/".to_string() }
fn default_challenge_dir() -> String { "/var/www/html/.well-known/acme-challenge/".to_string() }
fn default_work_dir() -> PathBuf { std::env::temp_dir().join("dcm") }
fn default_reload_command() -> String { "sudo nginx -s reload".to_string() }
fn default_threshold_days() -> i64 { 30 }
fn default_validity_days() -> i64 { 90 }
fn default_run_timeout() -> u64 { 600 }
fn default_interval_minutes() -> u64 { 720 }
fn default_registry_path() -> PathBuf { PathBuf::from("registry") }
fn default_bind_addr() -> String { "0.0.0.0".to_string() }
fn default_api_port() -> u16 { 9090 }
fn default_true() -> bool { true }

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            private_key_path: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            local_root: default_local_root(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cert_dir: default_cert_dir(),
            key_dir: default_key_dir(),
            vhost_dir: default_vhost_dir(),
            challenge_dir: default_challenge_dir(),
            vhost_template: None,
            work_dir: default_work_dir(),
            reload_command: default_reload_command(),
        }
    }
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            threshold_days: default_threshold_days(),
            validity_days: default_validity_days(),
            run_timeout_secs: default_run_timeout(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_interval_minutes(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_addr: default_bind_addr(),
            port: default_api_port(),
            server_token: None,
        }
    }
}

impl ManagerConfig {
    /// Load configuration from file or use defaults, then validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            Self::from_file(path)?
        } else {
            warn!("Configuration file {} not found, using defaults", path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file without validating it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        toml::from_str(&contents).context("Failed to parse configuration file")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Ingress
        if self.ingress.hosts.is_empty() {
            anyhow::bail!("ingress.hosts must list at least one host");
        }

        if self.ingress.hosts.iter().any(|h| h.trim().is_empty()) {
            anyhow::bail!("ingress.hosts contains an empty entry");
        }

        if self.ingress.cname_target.trim().is_empty() {
            anyhow::bail!("ingress.cname_target is required");
        }

        // Transport
        if self.transport.kind == TransportKind::Ssh {
            if self.ssh.user.is_empty() {
                anyhow::bail!("ssh.user is required when transport.kind is ssh");
            }

            if self.ssh.private_key_path.is_none() {
                anyhow::bail!("ssh.private_key_path is required when transport.kind is ssh");
            }
        }

        // Remote paths
        for (name, value) in [
            ("paths.cert_dir", &self.paths.cert_dir),
            ("paths.key_dir", &self.paths.key_dir),
            ("paths.vhost_dir", &self.paths.vhost_dir),
            ("paths.challenge_dir", &self.paths.challenge_dir),
            ("paths.reload_command", &self.paths.reload_command),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
        }

        // Renewal
        if self.renewal.threshold_days < 0 {
            anyhow::bail!("renewal.threshold_days cannot be negative");
        }

        if self.renewal.threshold_days >= self.renewal.validity_days {
            anyhow::bail!("renewal.threshold_days must be smaller than renewal.validity_days");
        }

        if self.renewal.run_timeout_secs == 0 {
            anyhow::bail!("renewal.run_timeout_secs must be at least 1");
        }

        // Scheduler
        if self.scheduler.enabled && self.scheduler.interval_minutes == 0 {
            anyhow::bail!("scheduler.interval_minutes must be at least 1");
        }

        // API
        if self.api.enabled {
            if self.api.port == 0 {
                anyhow::bail!("api.port cannot be 0");
            }

            if self.api.server_token.as_deref().map_or(true, |t| t.is_empty()) {
                anyhow::bail!("api.server_token is required when the API is enabled");
            }
        }

        self.acme.directory_url()?;

        Ok(())
    }
}
