//! Capability traits for every stage the provisioning pipeline drives.
//!
//! Each trait has a real implementation (shell, filesystem, HTTP) and a fake
//! one; `main` picks which set to wire from `PlatformConfig::mode`.

use super::lifecycle::{LifecycleState, TenantRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait ResourceAllocator: Send + Sync {
    async fn allocate(&self, instance_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait EnvironmentProvisioner: Send + Sync {
    async fn create_environment(&self, instance_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait BlueprintInstaller: Send + Sync {
    async fn install(&self, instance_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait DomainConfigurator: Send + Sync {
    /// Bind the tenant to a port and start it. `None` means no port was assigned.
    async fn configure(&self, instance_id: Uuid, domain: &str) -> Result<Option<u16>>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check_health(
        &self,
        instance_id: Uuid,
        port: u16,
        max_attempts: u32,
        delay: Duration,
    ) -> bool;
}

/// Compensating teardown. Implementations swallow every internal failure.
#[async_trait]
pub trait Rollback: Send + Sync {
    async fn rollback(&self, instance_id: Uuid, reason: &str);
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, record: TenantRecord) -> Result<()>;
    async fn update_state(&self, id: Uuid, state: LifecycleState) -> Result<()>;
    async fn set_port(&self, id: Uuid, port: u16) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<TenantRecord>>;
    async fn get_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>>;
    /// Every record that has a port assigned.
    async fn list_with_ports(&self) -> Result<Vec<TenantRecord>>;
}

#[async_trait]
pub trait AlertService: Send + Sync {
    async fn send_rollback_alert(&self, tenant_id: Uuid, domain: &str, reason: &str) -> Result<()>;
}

#[async_trait]
pub trait StatusPageService: Send + Sync {
    async fn generate(&self, domain: &str, instance_id: Uuid, message: &str) -> Result<PathBuf>;
    async fn remove(&self, domain: &str) -> Result<()>;
}

#[async_trait]
pub trait RoutingConfigService: Send + Sync {
    async fn generate_and_reload(&self, tenant_id: Uuid, domain: &str, port: u16) -> Result<()>;
}

#[async_trait]
pub trait CertificateService: Send + Sync {
    /// `Ok(false)` means issuance did not complete and the tenant keeps its
    /// fallback certificate.
    async fn generate_certificate(&self, domain: &str) -> Result<bool>;
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` through `bash -c`, returning stdout. A non-zero exit is an error.
    async fn execute(&self, command: &str, working_dir: Option<&str>) -> Result<String>;
}
