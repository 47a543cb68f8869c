// Scheduler / Orchestrator Module
// Runs the validate -> evaluate -> acquire -> distribute -> write-back pipeline per project

pub mod ticker;

use crate::acme::CertificateAcquirer;
use crate::distribution::CertificateDistributor;
use crate::error::{LifecycleError, Result};
use crate::observability::project_span;
use crate::policy::{RenewalDecision, RenewalPolicy};
use crate::registry::{CustomDomainSet, DomainRegistry};
use crate::validator::CnameValidator;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

pub use ticker::SweepTicker;

/// Tunables of a lifecycle run
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Validity recorded for a freshly issued certificate
    pub validity: chrono::Duration,

    /// Deadline of a single project run
    pub run_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            validity: chrono::Duration::days(90),
            run_timeout: Duration::from_secs(600),
        }
    }
}

/// What a project run did
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProjectOutcome {
    Renewed {
        domains: Vec<String>,
        hosts: Vec<String>,
    },
    Skipped {
        decision: RenewalDecision,
    },
}

/// Dry-run view of a project: valid domains and the renewal decision
#[derive(Debug, Clone, Serialize)]
pub struct ProjectPlan {
    pub project_id: String,
    pub registered: Vec<String>,
    pub valid_domains: Vec<String>,
    pub decision: RenewalDecision,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub project_id: String,
    pub error: String,
}

/// Summary of one sweep over every registered project
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub renewed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<SweepFailure>,
    pub elapsed_ms: u64,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.renewed.len() + self.skipped.len() + self.failed.len()
    }
}

pub struct UpdateExecutor {
    registry: Arc<dyn DomainRegistry>,
    validator: CnameValidator,
    policy: RenewalPolicy,
    acquirer: CertificateAcquirer,
    distributor: CertificateDistributor,
    settings: ExecutorSettings,

    /// One mutex per project id, serializing runs of the same project
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UpdateExecutor {
    pub fn new(
        registry: Arc<dyn DomainRegistry>,
        validator: CnameValidator,
        policy: RenewalPolicy,
        acquirer: CertificateAcquirer,
        distributor: CertificateDistributor,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            registry,
            validator,
            policy,
            acquirer,
            distributor,
            settings,
            locks: DashMap::new(),
        }
    }

    /// Run the full pipeline for one project and wait for the result
    pub async fn run_for_project(&self, project_id: &str) -> Result<ProjectOutcome> {
        let span = project_span(project_id);
        self.run_locked(project_id).instrument(span).await
    }

    /// Detach a project run; the outcome is only logged
    pub fn run_for_project_async(self: &Arc<Self>, project_id: String) -> JoinHandle<()> {
        let executor = Arc::clone(self);
        info!(project_id = %project_id, "Scheduled certificate update");

        tokio::spawn(async move {
            match executor.run_for_project(&project_id).await {
                Ok(outcome) => info!(project_id = %project_id, outcome = ?outcome, "Background update finished"),
                Err(e) => error!(project_id = %project_id, error = %e, "Background update failed"),
            }
        })
    }

    /// Run every registered project; one project's failure never stops the others
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let projects = self.registry.get_all().await?;
        info!(projects = projects.len(), "Starting certificate sweep");

        let mut report = SweepReport::default();
        for project_id in projects.into_keys() {
            match self.run_for_project(&project_id).await {
                Ok(ProjectOutcome::Renewed { .. }) => report.renewed.push(project_id),
                Ok(ProjectOutcome::Skipped { .. }) => report.skipped.push(project_id),
                Err(e) => {
                    warn!(project_id = %project_id, error = %e, "Project failed during sweep");
                    report.failed.push(SweepFailure {
                        project_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            renewed = report.renewed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            elapsed_ms = report.elapsed_ms,
            "Certificate sweep complete"
        );

        Ok(report)
    }

    pub fn run_sweep_async(self: &Arc<Self>) -> JoinHandle<()> {
        let executor = Arc::clone(self);
        info!("Scheduled certificate sweep");

        tokio::spawn(async move {
            if let Err(e) = executor.run_sweep().await {
                error!(error = %e, "Background sweep failed");
            }
        })
    }

    /// Validate and evaluate one project without issuing or touching any host
    pub async fn plan(&self, project_id: &str) -> Result<ProjectPlan> {
        let set = self.registry.get(project_id).await?;
        self.plan_set(set).await
    }

    /// Plan every project; per-project errors are returned next to their id
    pub async fn plan_all(&self) -> Result<Vec<(String, Result<ProjectPlan>)>> {
        let projects = self.registry.get_all().await?;
        let mut plans = Vec::with_capacity(projects.len());
        for (project_id, set) in projects {
            let plan = self.plan_set(set).await;
            plans.push((project_id, plan));
        }
        Ok(plans)
    }

    async fn plan_set(&self, set: CustomDomainSet) -> Result<ProjectPlan> {
        let registered = set.domain_names();
        let valid_domains = self.validator.filter(&registered).await;
        let decision = self.policy.evaluate(&set, &valid_domains, Utc::now())?;

        Ok(ProjectPlan {
            project_id: set.project_id,
            registered,
            valid_domains,
            decision,
        })
    }

    fn lock_for(&self, project_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn run_locked(&self, project_id: &str) -> Result<ProjectOutcome> {
        let lock = self.lock_for(project_id);
        let result = {
            let _guard = lock.lock().await;
            self.run_with_deadline(project_id).await
        };

        // Forget the lock once no other run holds or waits on it
        drop(lock);
        self.locks
            .remove_if(project_id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn run_with_deadline(&self, project_id: &str) -> Result<ProjectOutcome> {
        let deadline = self.settings.run_timeout;
        match tokio::time::timeout(deadline, self.process(project_id)).await {
            Ok(result) => result,
            Err(_) => {
                error!(timeout_secs = deadline.as_secs(), "Project run exceeded its deadline");
                Err(LifecycleError::Timeout {
                    project_id: project_id.to_string(),
                    after: deadline,
                })
            }
        }
    }

    /// The pipeline itself. The set is read under the project lock so a
    /// queued run sees the write-back of the run before it.
    async fn process(&self, project_id: &str) -> Result<ProjectOutcome> {
        let set = self.registry.get(project_id).await?;
        let plan = self.plan_set(set.clone()).await?;

        if !plan.decision.is_required() {
            info!(decision = %plan.decision, "No certificate update needed");
            return Ok(ProjectOutcome::Skipped {
                decision: plan.decision,
            });
        }

        info!(
            decision = %plan.decision,
            domains = ?plan.valid_domains,
            "Certificate update required"
        );

        let certificate = self.acquirer.acquire(&plan.valid_domains).await?;
        let report = self
            .distributor
            .distribute(project_id, &certificate, &plan.valid_domains)
            .await?;

        let mut updated = set;
        updated.record_issued(&plan.valid_domains, Utc::now(), self.settings.validity);
        if let Err(e) = self.registry.put(project_id, &updated).await {
            // Hosts already serve the new certificate; the next sweep re-issues
            error!(error = %e, "Write-back failed after distribution");
            return Err(e.into());
        }

        info!(
            domains = plan.valid_domains.len(),
            hosts = report.hosts_updated.len(),
            "Certificate renewed"
        );

        Ok(ProjectOutcome::Renewed {
            domains: plan.valid_domains,
            hosts: report.hosts_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::{AcmeClient, IssuedCertificate};
    use crate::challenge::ChallengeResponder;
    use crate::distribution::{RemoteLayout, VhostTemplate};
    use crate::error::{AcmeError, ChallengeError, RegistryError, TransportError};
    use crate::registry::{format_timestamp, Domain, DomainStatus, MemoryRegistry};
    use crate::transport::RemoteTransport;
    use crate::validator::CnameResolver;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TARGET: &str = "ingress.example.net";

    struct MapResolver(HashMap<String, String>);

    #[async_trait]
    impl CnameResolver for MapResolver {
        async fn canonical_name(&self, host: &str) -> std::io::Result<String> {
            self.0
                .get(host)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "NXDOMAIN"))
        }
    }

    #[derive(Default)]
    struct CountingAcme {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl AcmeClient for CountingAcme {
        async fn obtain_certificate(
            &self,
            domains: &[String],
            responder: &dyn ChallengeResponder,
        ) -> std::result::Result<IssuedCertificate, AcmeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            for domain in domains {
                responder
                    .present(domain, "token", "token.thumb")
                    .await
                    .map_err(|e| AcmeError::new(crate::error::AcmeStage::Challenge, e.to_string()))?;
            }
            Ok(IssuedCertificate {
                chain_pem: format!("CHAIN {}", domains.join(",")),
                key_pem: "KEY".to_string(),
            })
        }
    }

    struct NoopResponder;

    #[async_trait]
    impl ChallengeResponder for NoopResponder {
        async fn present(&self, _: &str, _: &str, _: &str) -> std::result::Result<(), ChallengeError> {
            Ok(())
        }

        async fn clean_up(&self, _: &str, _: &str) -> std::result::Result<(), ChallengeError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
        copy_delay: Option<Duration>,
    }

    #[async_trait]
    impl RemoteTransport for CountingTransport {
        async fn copy_file(&self, _: &Path, _: &str, _: &str) -> std::result::Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.copy_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }

        async fn execute_command(&self, _: &str, _: &str) -> std::result::Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        executor: Arc<UpdateExecutor>,
        registry: MemoryRegistry,
        acme: Arc<CountingAcme>,
        transport: Arc<CountingTransport>,
        work: tempfile::TempDir,
    }

    fn harness(sets: Vec<CustomDomainSet>, acme: CountingAcme, settings: ExecutorSettings) -> Harness {
        harness_with_transport(sets, acme, CountingTransport::default(), settings)
    }

    fn harness_with_transport(
        sets: Vec<CustomDomainSet>,
        acme: CountingAcme,
        transport: CountingTransport,
        settings: ExecutorSettings,
    ) -> Harness {
        let work = tempfile::TempDir::new().unwrap();
        let registry = MemoryRegistry::with_sets(sets);
        let acme = Arc::new(acme);
        let transport = Arc::new(transport);

        let resolver = MapResolver(
            [
                ("custom.example.com", "ingress.example.net."),
                ("shop.example.org", "ingress.example.net."),
                ("elsewhere.example.com", "other.example.net."),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        );

        let distributor = CertificateDistributor::new(
            transport.clone(),
            vec!["edge-1".to_string(), "edge-2".to_string()],
            RemoteLayout {
                cert_dir: "/certs".to_string(),
                key_dir: "/private".to_string(),
                vhost_dir: "/vhosts".to_string(),
                reload_command: "reload".to_string(),
            },
            VhostTemplate::builtin().unwrap(),
            work.path(),
        );

        let executor = UpdateExecutor::new(
            Arc::new(registry.clone()),
            CnameValidator::new(Arc::new(resolver), TARGET),
            RenewalPolicy::default(),
            CertificateAcquirer::new(acme.clone(), Arc::new(NoopResponder)),
            distributor,
            settings,
        );

        Harness {
            executor: Arc::new(executor),
            registry,
            acme,
            transport,
            work,
        }
    }

    fn fresh_set(project_id: &str, names: &[&str]) -> CustomDomainSet {
        CustomDomainSet::new(project_id, names.iter().map(|n| Domain::new(*n)).collect())
    }

    fn covered_set(project_id: &str, name: &str, days_left: i64) -> CustomDomainSet {
        let now = Utc::now();
        CustomDomainSet {
            project_id: project_id.to_string(),
            last_updated: Some(format_timestamp(now - chrono::Duration::days(10))),
            certificate_expiration: Some(format_timestamp(now + chrono::Duration::days(days_left))),
            domains: vec![Domain {
                name: name.to_string(),
                status: DomainStatus::Ok,
            }],
        }
    }

    #[tokio::test]
    async fn test_first_issue_writes_back() {
        let h = harness(
            vec![fresh_set("p1", &["1234", "custom.example.com"])],
            CountingAcme::default(),
            ExecutorSettings::default(),
        );

        let outcome = h.executor.run_for_project("p1").await.unwrap();

        match outcome {
            ProjectOutcome::Renewed { domains, hosts } => {
                assert_eq!(domains, vec!["custom.example.com"]);
                assert_eq!(hosts, vec!["edge-1", "edge-2"]);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let stored = h.registry.get("p1").await.unwrap();
        assert!(stored.last_updated_raw().is_some());
        assert_eq!(stored.domains[0].status, DomainStatus::Pending);
        assert_eq!(stored.domains[1].status, DomainStatus::Ok);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let h = harness(
            vec![fresh_set("p1", &["custom.example.com"])],
            CountingAcme::default(),
            ExecutorSettings::default(),
        );

        h.executor.run_for_project("p1").await.unwrap();
        let acme_calls = h.acme.calls.load(Ordering::SeqCst);
        let transport_calls = h.transport.calls.load(Ordering::SeqCst);
        let writes = h.registry.write_count();

        let outcome = h.executor.run_for_project("p1").await.unwrap();

        assert!(matches!(outcome, ProjectOutcome::Skipped { .. }));
        assert_eq!(h.acme.calls.load(Ordering::SeqCst), acme_calls);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), transport_calls);
        assert_eq!(h.registry.write_count(), writes);
    }

    #[tokio::test]
    async fn test_expiring_certificate_is_renewed() {
        let h = harness(
            vec![covered_set("p2", "custom.example.com", 10)],
            CountingAcme::default(),
            ExecutorSettings::default(),
        );

        let outcome = h.executor.run_for_project("p2").await.unwrap();
        assert!(matches!(outcome, ProjectOutcome::Renewed { .. }));
        assert_eq!(h.acme.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_project_is_not_found() {
        let h = harness(vec![], CountingAcme::default(), ExecutorSettings::default());

        let err = h.executor.run_for_project("missing").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Registry(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_isolates_failures() {
        let mut broken = covered_set("b-broken", "custom.example.com", 10);
        broken.certificate_expiration = Some("not a date".to_string());

        let h = harness(
            vec![
                fresh_set("a-new", &["custom.example.com"]),
                broken,
                covered_set("c-current", "shop.example.org", 60),
                fresh_set("d-foreign", &["elsewhere.example.com"]),
            ],
            CountingAcme::default(),
            ExecutorSettings::default(),
        );

        let report = h.executor.run_sweep().await.unwrap();

        assert_eq!(report.renewed, vec!["a-new"]);
        assert_eq!(report.skipped, vec!["c-current", "d-foreign"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].project_id, "b-broken");
        assert!(report.failed[0].error.contains("not a date"));
        assert_eq!(report.total(), 4);
    }

    #[tokio::test]
    async fn test_run_deadline() {
        let h = harness(
            vec![fresh_set("slow", &["custom.example.com"])],
            CountingAcme {
                delay: Some(Duration::from_secs(5)),
                ..Default::default()
            },
            ExecutorSettings {
                run_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );

        let err = h.executor.run_for_project("slow").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Timeout { .. }));
        assert_eq!(h.registry.write_count(), 0);
    }

    #[tokio::test]
    async fn test_deadline_during_distribution_removes_staged_key() {
        let h = harness_with_transport(
            vec![fresh_set("slow", &["custom.example.com"])],
            CountingAcme::default(),
            CountingTransport {
                copy_delay: Some(Duration::from_secs(5)),
                ..Default::default()
            },
            ExecutorSettings {
                run_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        );

        let err = h.executor.run_for_project("slow").await.unwrap_err();

        assert!(matches!(err, LifecycleError::Timeout { .. }));
        assert_eq!(h.acme.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 1);
        assert!(!h.work.path().join("slow").exists());
        assert_eq!(h.registry.write_count(), 0);
    }

    #[tokio::test]
    async fn test_project_locks_are_released() {
        let h = harness(
            vec![fresh_set("p1", &["custom.example.com"])],
            CountingAcme {
                delay: Some(Duration::from_millis(20)),
                ..Default::default()
            },
            ExecutorSettings::default(),
        );

        for id in ["missing-1", "missing-2", "missing-3"] {
            assert!(h.executor.run_for_project(id).await.is_err());
        }
        assert!(h.executor.locks.is_empty());

        let (a, b) = tokio::join!(
            h.executor.run_for_project("p1"),
            h.executor.run_for_project("p1")
        );
        assert!(a.is_ok() && b.is_ok());
        assert!(h.executor.locks.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_runs_issue_once() {
        let h = harness(
            vec![fresh_set("p1", &["custom.example.com"])],
            CountingAcme {
                delay: Some(Duration::from_millis(50)),
                ..Default::default()
            },
            ExecutorSettings::default(),
        );

        let (a, b) = tokio::join!(
            h.executor.run_for_project("p1"),
            h.executor.run_for_project("p1")
        );

        let renewed = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|o| matches!(o, ProjectOutcome::Renewed { .. }))
            .count();
        assert_eq!(renewed, 1);
        assert_eq!(h.acme.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_trigger_returns_handle() {
        let h = harness(
            vec![fresh_set("p1", &["custom.example.com"])],
            CountingAcme::default(),
            ExecutorSettings::default(),
        );

        h.executor.run_for_project_async("p1".to_string()).await.unwrap();
        assert_eq!(h.registry.write_count(), 1);
    }

    #[tokio::test]
    async fn test_ticker_skips_first_tick_and_stops_on_shutdown() {
        let h = harness(
            vec![fresh_set("p1", &["custom.example.com"])],
            CountingAcme::default(),
            ExecutorSettings::default(),
        );
        let (tx, rx) = tokio::sync::broadcast::channel(1);
        let ticker = SweepTicker::new(h.executor.clone(), Duration::from_millis(100));

        let handle = ticker.start(rx).unwrap();
        assert!(ticker.start(tx.subscribe()).is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.registry.write_count(), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(ticker.sweeps_completed() >= 1);
        assert_eq!(h.registry.write_count(), 1);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!ticker.is_running());
    }

    #[tokio::test]
    async fn test_plan_touches_nothing() {
        let h = harness(
            vec![fresh_set("p1", &["1234", "custom.example.com"])],
            CountingAcme::default(),
            ExecutorSettings::default(),
        );

        let plan = h.executor.plan("p1").await.unwrap();

        assert_eq!(plan.registered, vec!["1234", "custom.example.com"]);
        assert_eq!(plan.valid_domains, vec!["custom.example.com"]);
        assert_eq!(plan.decision, RenewalDecision::FirstIssue);
        assert_eq!(h.acme.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
    }
}
