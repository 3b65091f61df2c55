use super::deploy::pm2_delete_command;
use super::filesystem::remove_tenant_dirs;
use super::lifecycle::{short_name, LifecycleState};
use super::traits::{AlertService, CommandExecutor, Rollback, TenantRepository};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Tears a half-provisioned tenant down. Every step runs regardless of the
/// previous one's outcome and nothing is ever returned to the caller.
pub struct TenantRollback {
    executor: Arc<dyn CommandExecutor>,
    repo: Arc<dyn TenantRepository>,
    alerts: Arc<dyn AlertService>,
    apps_dir: PathBuf,
}

impl TenantRollback {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        repo: Arc<dyn TenantRepository>,
        alerts: Arc<dyn AlertService>,
        apps_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            repo,
            alerts,
            apps_dir: apps_dir.into(),
        }
    }
}

#[async_trait]
impl Rollback for TenantRollback {
    async fn rollback(&self, instance_id: Uuid, reason: &str) {
        let name = short_name(instance_id);
        warn!(tenant = %name, "rollback: starting: {}", reason);

        if let Err(e) = self.executor.execute(&pm2_delete_command(&name), None).await {
            warn!(tenant = %name, "rollback: stopping process failed: {}", e);
        }

        if let Err(e) = remove_tenant_dirs(&self.apps_dir, &name).await {
            warn!(tenant = %name, "rollback: removing directory failed: {}", e);
        }

        if let Err(e) = self.repo.update_state(instance_id, LifecycleState::Failed).await {
            warn!(tenant = %name, "rollback: marking record failed: {}", e);
        }

        let domain = match self.repo.get_by_id(instance_id).await {
            Ok(Some(record)) => record.domain,
            Ok(None) => "unknown".to_string(),
            Err(e) => {
                warn!(tenant = %name, "rollback: domain lookup failed: {}", e);
                "unknown".to_string()
            }
        };

        if let Err(e) = self
            .alerts
            .send_rollback_alert(instance_id, &domain, reason)
            .await
        {
            error!(tenant = %name, "rollback: alert delivery failed: {}", e);
        }

        info!(tenant = %name, "rollback: finished");
    }
}
