//! Stand-ins for the host-level collaborators, selected with `mode = "fake"`.
//! They only log and sleep, so the whole pipeline can run on a dev machine.

use super::allocator::PortAllocator;
use super::traits::{
    BlueprintInstaller, DomainConfigurator, EnvironmentProvisioner, HealthCheck,
    ResourceAllocator,
};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(800);

pub struct FakeResourceAllocator {
    delay: Duration,
}

impl FakeResourceAllocator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ResourceAllocator for FakeResourceAllocator {
    async fn allocate(&self, instance_id: Uuid) -> Result<()> {
        info!("alloc: resources allocated for {}", instance_id);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

pub struct FakeEnvironmentProvisioner {
    delay: Duration,
}

impl FakeEnvironmentProvisioner {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl EnvironmentProvisioner for FakeEnvironmentProvisioner {
    async fn create_environment(&self, instance_id: Uuid) -> Result<()> {
        info!("env: environment created for {}", instance_id);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

pub struct FakeBlueprintInstaller {
    delay: Duration,
}

impl FakeBlueprintInstaller {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl BlueprintInstaller for FakeBlueprintInstaller {
    async fn install(&self, instance_id: Uuid) -> Result<()> {
        info!("install: blueprint installed for {}", instance_id);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Takes a real port from the shared allocator but starts nothing.
pub struct FakeDomainConfigurator {
    ports: Arc<PortAllocator>,
    delay: Duration,
}

impl FakeDomainConfigurator {
    pub fn new(ports: Arc<PortAllocator>, delay: Duration) -> Self {
        Self { ports, delay }
    }
}

#[async_trait]
impl DomainConfigurator for FakeDomainConfigurator {
    async fn configure(&self, _instance_id: Uuid, domain: &str) -> Result<Option<u16>> {
        let port = self.ports.allocate_port()?;
        info!("domain: configured {} on port {}", domain, port);
        tokio::time::sleep(self.delay).await;
        Ok(Some(port))
    }
}

/// Reports every tenant healthy without probing.
pub struct FakeHealthCheck;

#[async_trait]
impl HealthCheck for FakeHealthCheck {
    async fn check_health(
        &self,
        _instance_id: Uuid,
        port: u16,
        _max_attempts: u32,
        _delay: Duration,
    ) -> bool {
        info!("health: fake probe on port {} passed", port);
        true
    }
}
