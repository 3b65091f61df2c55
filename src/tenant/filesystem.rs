use super::lifecycle::short_name;
use super::traits::EnvironmentProvisioner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Root of a tenant's environment: `{apps_dir}/{name}`.
pub fn tenant_dir(apps_dir: &Path, name: &str) -> PathBuf {
    apps_dir.join(name)
}

/// Where the application build is copied and started from.
pub fn publish_dir(apps_dir: &Path, name: &str) -> PathBuf {
    tenant_dir(apps_dir, name).join("publish")
}

/// Create `{apps_dir}/{name}/publish`. Idempotent.
pub async fn create_tenant_dirs(apps_dir: &Path, name: &str) -> Result<PathBuf> {
    let dir = publish_dir(apps_dir, name);
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create dir: {}", dir.display()))?;
    Ok(dir)
}

/// Remove the tenant's whole directory. A missing directory is not an error.
pub async fn remove_tenant_dirs(apps_dir: &Path, name: &str) -> Result<()> {
    let dir = tenant_dir(apps_dir, name);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove dir: {}", dir.display())),
    }
}

/// Lays out the tenant's directory tree on the local filesystem.
pub struct LocalEnvironmentProvisioner {
    apps_dir: PathBuf,
}

impl LocalEnvironmentProvisioner {
    pub fn new(apps_dir: impl Into<PathBuf>) -> Self {
        Self {
            apps_dir: apps_dir.into(),
        }
    }
}

#[async_trait]
impl EnvironmentProvisioner for LocalEnvironmentProvisioner {
    async fn create_environment(&self, instance_id: Uuid) -> Result<()> {
        let name = short_name(instance_id);
        let dir = create_tenant_dirs(&self.apps_dir, &name).await?;
        tracing::info!("env: created {}", dir.display());
        Ok(())
    }
}
