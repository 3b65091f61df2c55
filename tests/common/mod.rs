//! Recording stand-ins for every pipeline collaborator.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenantforge::metrics::ProvisioningMetrics;
use tenantforge::tenant::traits::{
    BlueprintInstaller, CertificateService, DomainConfigurator, EnvironmentProvisioner,
    HealthCheck, ResourceAllocator, Rollback, RoutingConfigService, StatusPageService,
    TenantRepository,
};
use tenantforge::tenant::{
    HealthPolicy, LifecycleState, PipelineDeps, PortAllocator, ProvisionInstancePipeline,
    TenantRecord,
};
use uuid::Uuid;

/// Shared, ordered log of every collaborator call.
pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
pub struct MemoryRepo {
    pub records: Mutex<HashMap<Uuid, TenantRecord>>,
    pub writes: Mutex<Vec<(Uuid, LifecycleState)>>,
}

impl MemoryRepo {
    pub fn states_for(&self, id: Uuid) -> Vec<LifecycleState> {
        self.writes
            .lock()
            .iter()
            .filter(|(rid, _)| *rid == id)
            .map(|(_, s)| *s)
            .collect()
    }

    pub fn state_of(&self, id: Uuid) -> Option<String> {
        self.records.lock().get(&id).map(|r| r.state.clone())
    }

    pub fn insert(&self, record: TenantRecord) {
        self.records.lock().insert(record.id, record);
    }
}

#[async_trait]
impl TenantRepository for MemoryRepo {
    async fn create(&self, record: TenantRecord) -> Result<()> {
        let state = record.state.parse::<LifecycleState>()?;
        self.writes.lock().push((record.id, state));
        self.records.lock().insert(record.id, record);
        Ok(())
    }

    async fn update_state(&self, id: Uuid, state: LifecycleState) -> Result<()> {
        self.writes.lock().push((id, state));
        if let Some(record) = self.records.lock().get_mut(&id) {
            record.state = state.to_string();
            record.updated_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn set_port(&self, id: Uuid, port: u16) -> Result<()> {
        if let Some(record) = self.records.lock().get_mut(&id) {
            record.port = Some(port);
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<TenantRecord>> {
        Ok(self.records.lock().get(&id).cloned())
    }

    async fn get_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|r| r.domain == domain)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn list_with_ports(&self) -> Result<Vec<TenantRecord>> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|r| r.port.is_some())
            .cloned()
            .collect())
    }
}

/// One stub for the three id-only host steps.
pub struct Step {
    name: &'static str,
    fail: bool,
    log: CallLog,
}

impl Step {
    pub fn new(name: &'static str, log: &CallLog) -> Self {
        Self {
            name,
            fail: false,
            log: log.clone(),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn record(&self) -> Result<()> {
        self.log.lock().push(self.name.to_string());
        if self.fail {
            bail!("{} exploded", self.name);
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceAllocator for Step {
    async fn allocate(&self, _instance_id: Uuid) -> Result<()> {
        self.record()
    }
}

#[async_trait]
impl EnvironmentProvisioner for Step {
    async fn create_environment(&self, _instance_id: Uuid) -> Result<()> {
        self.record()
    }
}

#[async_trait]
impl BlueprintInstaller for Step {
    async fn install(&self, _instance_id: Uuid) -> Result<()> {
        self.record()
    }
}

/// Takes a real port; domains starting with `bad` fail and those starting
/// with `panic` panic.
pub struct Configurator {
    pub ports: Arc<PortAllocator>,
    pub log: CallLog,
}

#[async_trait]
impl DomainConfigurator for Configurator {
    async fn configure(&self, _instance_id: Uuid, domain: &str) -> Result<Option<u16>> {
        self.log.lock().push("configure".into());
        if domain.starts_with("bad") {
            bail!("pm2 refused {}", domain);
        }
        if domain.starts_with("panic") {
            panic!("pm2 crashed on {domain}");
        }
        Ok(Some(self.ports.allocate_port()?))
    }
}

pub struct Health {
    pub healthy: bool,
    pub calls: AtomicU32,
}

#[async_trait]
impl HealthCheck for Health {
    async fn check_health(&self, _id: Uuid, _port: u16, _max: u32, _delay: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.healthy
    }
}

#[derive(Default)]
pub struct RollbackSpy {
    pub calls: Mutex<Vec<(Uuid, String)>>,
}

#[async_trait]
impl Rollback for RollbackSpy {
    async fn rollback(&self, instance_id: Uuid, reason: &str) {
        self.calls.lock().push((instance_id, reason.to_string()));
    }
}

/// Status pages, routing and certificates, each optionally failing.
pub struct Extras {
    pub fail: bool,
    pub log: CallLog,
}

impl Extras {
    fn record(&self, what: &str) -> Result<()> {
        self.log.lock().push(what.to_string());
        if self.fail {
            bail!("{} unavailable", what);
        }
        Ok(())
    }
}

#[async_trait]
impl StatusPageService for Extras {
    async fn generate(&self, domain: &str, _id: Uuid, _message: &str) -> Result<PathBuf> {
        self.record("status_page")?;
        Ok(PathBuf::from(format!("/tmp/{domain}/index.html")))
    }

    async fn remove(&self, _domain: &str) -> Result<()> {
        self.record("status_page_removed")
    }
}

#[async_trait]
impl RoutingConfigService for Extras {
    async fn generate_and_reload(&self, _id: Uuid, _domain: &str, _port: u16) -> Result<()> {
        self.record("routing")
    }
}

#[async_trait]
impl CertificateService for Extras {
    async fn generate_certificate(&self, _domain: &str) -> Result<bool> {
        self.record("certificate")?;
        Ok(true)
    }
}

/// Everything a test needs to build and inspect a pipeline.
pub struct Harness {
    pub log: CallLog,
    pub repo: Arc<MemoryRepo>,
    pub rollback: Arc<RollbackSpy>,
    pub health: Arc<Health>,
    pub ports: Arc<PortAllocator>,
    pub metrics: Arc<ProvisioningMetrics>,
    pub failing_step: Option<&'static str>,
    pub extras_fail: bool,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            repo: Arc::new(MemoryRepo::default()),
            rollback: Arc::new(RollbackSpy::default()),
            health: Arc::new(Health {
                healthy: true,
                calls: AtomicU32::new(0),
            }),
            ports: Arc::new(PortAllocator::new([6000, 6010])),
            metrics: Arc::new(ProvisioningMetrics::new()),
            failing_step: None,
            extras_fail: false,
        }
    }

    pub fn unhealthy(mut self) -> Self {
        self.health = Arc::new(Health {
            healthy: false,
            calls: AtomicU32::new(0),
        });
        self
    }

    pub fn failing(mut self, step: &'static str) -> Self {
        self.failing_step = Some(step);
        self
    }

    pub fn extras_failing(mut self) -> Self {
        self.extras_fail = true;
        self
    }

    pub fn with_ports(mut self, range: [u16; 2]) -> Self {
        self.ports = Arc::new(PortAllocator::new(range));
        self
    }

    fn step(&self, name: &'static str) -> Step {
        let step = Step::new(name, &self.log);
        if self.failing_step == Some(name) {
            step.failing()
        } else {
            step
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn pipeline(&self) -> ProvisionInstancePipeline {
        let extras = Arc::new(Extras {
            fail: self.extras_fail,
            log: self.log.clone(),
        });
        ProvisionInstancePipeline::new(PipelineDeps {
            resources: Arc::new(self.step("allocate")),
            environment: Arc::new(self.step("environment")),
            installer: Arc::new(self.step("install")),
            domains: Arc::new(Configurator {
                ports: self.ports.clone(),
                log: self.log.clone(),
            }),
            health: self.health.clone(),
            rollback: self.rollback.clone(),
            repo: self.repo.clone(),
            status_pages: extras.clone(),
            routing: extras.clone(),
            certs: extras,
            metrics: self.metrics.clone(),
            health_policy: HealthPolicy {
                max_attempts: 3,
                delay: Duration::ZERO,
            },
        })
    }
}
