use crate::metrics::ProvisioningMetrics;
use crate::queue::ProvisioningQueue;
use crate::tenant::traits::{CertificateService, HealthCheck, TenantRepository};
use std::sync::Arc;

pub type SharedState = Arc<AppState>;

/// What the HTTP handlers can reach. Handlers only enqueue and read; the
/// pipeline owns every write.
pub struct AppState {
    pub api_key: String,
    pub queue: Arc<ProvisioningQueue>,
    pub repo: Arc<dyn TenantRepository>,
    pub health: Arc<dyn HealthCheck>,
    pub certs: Arc<dyn CertificateService>,
    pub metrics: Arc<ProvisioningMetrics>,
}

impl AppState {
    pub fn new(
        api_key: String,
        queue: Arc<ProvisioningQueue>,
        repo: Arc<dyn TenantRepository>,
        health: Arc<dyn HealthCheck>,
        certs: Arc<dyn CertificateService>,
        metrics: Arc<ProvisioningMetrics>,
    ) -> SharedState {
        Arc::new(Self {
            api_key,
            queue,
            repo,
            health,
            certs,
            metrics,
        })
    }
}
