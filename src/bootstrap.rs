// Component wiring
// Turns a validated configuration into a ready-to-run update executor

use crate::acme::{AcmeClient, CertificateAcquirer, InstantAcmeClient};
use crate::challenge::ChallengeDistributor;
use crate::config::{ManagerConfig, TransportKind};
use crate::distribution::{CertificateDistributor, RemoteLayout, VhostTemplate};
use crate::policy::RenewalPolicy;
use crate::registry::{DomainRegistry, JsonFileRegistry};
use crate::scheduler::{ExecutorSettings, UpdateExecutor};
use crate::transport::{LocalMirrorTransport, RemoteTransport, SshTransport};
use crate::validator::{CnameResolver, CnameValidator, HickoryCnameResolver};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Transport selected by `transport.kind`
pub fn build_transport(config: &ManagerConfig) -> Result<Arc<dyn RemoteTransport>> {
    match config.transport.kind {
        TransportKind::Ssh => {
            let key = config
                .ssh
                .private_key_path
                .as_ref()
                .context("ssh.private_key_path is required when transport.kind is ssh")?;
            Ok(Arc::new(SshTransport::new(
                config.ssh.user.clone(),
                key,
                config.ssh.connect_timeout_secs,
            )))
        }
        TransportKind::Local => Ok(Arc::new(LocalMirrorTransport::new(&config.transport.local_root))),
    }
}

pub fn build_template(config: &ManagerConfig) -> Result<VhostTemplate> {
    match &config.paths.vhost_template {
        Some(path) => VhostTemplate::from_file(path),
        None => VhostTemplate::builtin(),
    }
}

/// ACME client for the configured directory
pub fn build_acme_client(config: &ManagerConfig) -> Result<Arc<dyn AcmeClient>> {
    Ok(Arc::new(InstantAcmeClient::new(
        config.acme.directory_url()?,
        config.acme.email.clone(),
    )))
}

/// Assemble the executor around caller-provided collaborators
pub fn build_executor_with(
    config: &ManagerConfig,
    registry: Arc<dyn DomainRegistry>,
    resolver: Arc<dyn CnameResolver>,
    transport: Arc<dyn RemoteTransport>,
    client: Arc<dyn AcmeClient>,
) -> Result<UpdateExecutor> {
    let hosts = config.ingress.hosts.clone();

    let responder = Arc::new(ChallengeDistributor::new(
        transport.clone(),
        hosts.clone(),
        config.paths.challenge_dir.clone(),
        config.paths.work_dir.join("challenges"),
    ));
    let layout = RemoteLayout {
        cert_dir: config.paths.cert_dir.clone(),
        key_dir: config.paths.key_dir.clone(),
        vhost_dir: config.paths.vhost_dir.clone(),
        reload_command: config.paths.reload_command.clone(),
    };
    let distributor = CertificateDistributor::new(
        transport,
        hosts,
        layout,
        build_template(config)?,
        config.paths.work_dir.join("staging"),
    );

    Ok(UpdateExecutor::new(
        registry,
        CnameValidator::new(resolver, config.ingress.cname_target.clone()),
        RenewalPolicy::new(config.renewal.threshold_days),
        CertificateAcquirer::new(client, responder),
        distributor,
        ExecutorSettings {
            validity: chrono::Duration::days(config.renewal.validity_days),
            run_timeout: Duration::from_secs(config.renewal.run_timeout_secs),
        },
    ))
}

/// Assemble the executor from configuration alone
pub fn build_executor(config: &ManagerConfig) -> Result<Arc<UpdateExecutor>> {
    let registry = Arc::new(JsonFileRegistry::new(&config.registry.path));
    let resolver = Arc::new(
        HickoryCnameResolver::from_system_conf().context("Failed to read system resolver configuration")?,
    );
    let transport = build_transport(config)?;
    let client = build_acme_client(config)?;

    let executor = build_executor_with(config, registry, resolver, transport, client)?;
    info!(
        hosts = config.ingress.hosts.len(),
        transport = ?config.transport.kind,
        registry = %config.registry.path.display(),
        "Certificate lifecycle components initialized"
    );

    Ok(Arc::new(executor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcmeDirectory;

    fn local_config(root: &std::path::Path) -> ManagerConfig {
        let mut config = ManagerConfig::default();
        config.ingress.hosts = vec!["edge-1".to_string()];
        config.ingress.cname_target = "ingress.example.net".to_string();
        config.transport.kind = TransportKind::Local;
        config.transport.local_root = root.join("mirror");
        config.paths.work_dir = root.join("work");
        config.api.enabled = false;
        config
    }

    #[test]
    fn test_custom_template_is_loaded() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("vhost.j2");
        std::fs::write(&path, "server_name {{ server_names }};").unwrap();

        let mut config = local_config(temp.path());
        config.paths.vhost_template = Some(path);
        assert!(build_template(&config).is_ok());

        config.paths.vhost_template = Some(temp.path().join("missing.j2"));
        assert!(build_template(&config).is_err());
    }

    #[test]
    fn test_bad_directory_fails_wiring() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = local_config(temp.path());
        assert!(build_acme_client(&config).is_ok());

        config.acme.directory = AcmeDirectory::Custom("nowhere".to_string());
        assert!(build_acme_client(&config).is_err());
    }

    #[tokio::test]
    async fn test_local_wiring_plans_without_network() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = local_config(temp.path());
        let registry = crate::registry::MemoryRegistry::with_sets([crate::registry::CustomDomainSet::new(
            "p1",
            vec![crate::registry::Domain::new("custom.example.com")],
        )]);

        let executor = build_executor_with(
            &config,
            Arc::new(registry),
            Arc::new(NoCname),
            build_transport(&config).unwrap(),
            build_acme_client(&config).unwrap(),
        )
        .unwrap();

        let plan = executor.plan("p1").await.unwrap();
        assert!(plan.valid_domains.is_empty());
        assert!(!plan.decision.is_required());
    }

    struct NoCname;

    #[async_trait::async_trait]
    impl CnameResolver for NoCname {
        async fn canonical_name(&self, _host: &str) -> std::io::Result<String> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no CNAME record"))
        }
    }
}
