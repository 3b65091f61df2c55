pub mod caddy;
pub mod nginx;

use crate::tenant::traits::RoutingConfigService;
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub use caddy::CaddyRouting;
pub use nginx::{NginxRouting, NginxSettings, TlsPaths};

/// Used with `backend = "none"`: tenants are reachable only on their port.
pub struct NoopRouting;

#[async_trait]
impl RoutingConfigService for NoopRouting {
    async fn generate_and_reload(&self, _tenant_id: Uuid, domain: &str, port: u16) -> Result<()> {
        tracing::debug!("routing disabled, {} stays on port {}", domain, port);
        Ok(())
    }
}
