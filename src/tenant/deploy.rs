//! Host-level collaborators: port reservation, build copy and pm2 process start.

use super::allocator::PortAllocator;
use super::filesystem::publish_dir;
use super::lifecycle::short_name;
use super::traits::{BlueprintInstaller, CommandExecutor, DomainConfigurator, ResourceAllocator};
use crate::shell::quote;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Reserves a port for the tenant at the allocation stage.
///
/// The port reserved here is not the serving port; `Pm2DomainConfigurator`
/// allocates that one separately.
pub struct PortResourceAllocator {
    ports: Arc<PortAllocator>,
}

impl PortResourceAllocator {
    pub fn new(ports: Arc<PortAllocator>) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl ResourceAllocator for PortResourceAllocator {
    async fn allocate(&self, instance_id: Uuid) -> Result<()> {
        let port = self.ports.allocate_port()?;
        info!("alloc: port {} reserved for {}", port, instance_id);
        Ok(())
    }
}

/// Copies the prebuilt application for the configured app type into the
/// tenant's publish directory.
pub struct BuildCopyInstaller {
    executor: Arc<dyn CommandExecutor>,
    builds_dir: PathBuf,
    apps_dir: PathBuf,
    app_type: String,
}

impl BuildCopyInstaller {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        builds_dir: impl Into<PathBuf>,
        apps_dir: impl Into<PathBuf>,
        app_type: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            builds_dir: builds_dir.into(),
            apps_dir: apps_dir.into(),
            app_type: app_type.into(),
        }
    }
}

#[async_trait]
impl BlueprintInstaller for BuildCopyInstaller {
    async fn install(&self, instance_id: Uuid) -> Result<()> {
        let name = short_name(instance_id);
        let source = self.builds_dir.join(&self.app_type);
        let target = publish_dir(&self.apps_dir, &name);
        info!("install: copying {} build for {}", self.app_type, name);
        let command = format!(
            "cp -r {}/. {}/",
            quote(&source.to_string_lossy()),
            quote(&target.to_string_lossy())
        );
        self.executor.execute(&command, None).await?;
        Ok(())
    }
}

/// Allocates the serving port, starts the app under pm2 and checks pm2 sees it.
pub struct Pm2DomainConfigurator {
    executor: Arc<dyn CommandExecutor>,
    ports: Arc<PortAllocator>,
    apps_dir: PathBuf,
}

impl Pm2DomainConfigurator {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        ports: Arc<PortAllocator>,
        apps_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            ports,
            apps_dir: apps_dir.into(),
        }
    }
}

pub fn pm2_start_command(publish: &str, name: &str, port: u16) -> String {
    format!(
        "cd {} && PORT={} pm2 start server.js --name {} --watch && pm2 save",
        quote(publish),
        port,
        quote(name)
    )
}

pub fn pm2_delete_command(name: &str) -> String {
    format!("pm2 delete {}", quote(name))
}

#[async_trait]
impl DomainConfigurator for Pm2DomainConfigurator {
    async fn configure(&self, instance_id: Uuid, domain: &str) -> Result<Option<u16>> {
        let name = short_name(instance_id);
        let port = self.ports.allocate_port()?;
        let publish = publish_dir(&self.apps_dir, &name);

        info!("domain: starting {} for {} on port {}", name, domain, port);
        self.executor
            .execute(&pm2_start_command(&publish.to_string_lossy(), &name, port), None)
            .await?;

        info!("domain: verifying {}", name);
        self.executor
            .execute(&format!("pm2 describe {}", quote(&name)), None)
            .await?;

        Ok(Some(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingExecutor {
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn execute(&self, command: &str, _working_dir: Option<&str>) -> Result<String> {
            self.commands.lock().push(command.to_string());
            Ok(String::new())
        }
    }

    #[test]
    fn start_command_sets_port_and_name() {
        let cmd = pm2_start_command("/var/www/abcd1234/publish", "abcd1234", 6003);
        assert_eq!(
            cmd,
            "cd '/var/www/abcd1234/publish' && PORT=6003 pm2 start server.js --name 'abcd1234' --watch && pm2 save"
        );
    }

    #[tokio::test]
    async fn configurator_returns_allocated_port() {
        let exec = Arc::new(RecordingExecutor::default());
        let ports = Arc::new(PortAllocator::new([6000, 6010]));
        ports.reserve_port(6000);
        let configurator = Pm2DomainConfigurator::new(exec.clone(), ports, "/srv/apps");

        let port = configurator
            .configure(Uuid::new_v4(), "a.example.com")
            .await
            .unwrap();

        assert_eq!(port, Some(6001));
        let commands = exec.commands.lock();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].contains("PORT=6001"));
        assert!(commands[1].starts_with("pm2 describe"));
    }

    #[tokio::test]
    async fn configurator_surfaces_port_exhaustion() {
        let exec = Arc::new(RecordingExecutor::default());
        let ports = Arc::new(PortAllocator::new([6000, 6000]));
        ports.reserve_port(6000);
        let configurator = Pm2DomainConfigurator::new(exec.clone(), ports, "/srv/apps");

        let err = configurator
            .configure(Uuid::new_v4(), "a.example.com")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<super::super::allocator::NoPortsAvailable>().is_some());
        assert!(exec.commands.lock().is_empty());
    }

    #[tokio::test]
    async fn installer_copies_configured_build() {
        let exec = Arc::new(RecordingExecutor::default());
        let installer = BuildCopyInstaller::new(exec.clone(), "/srv/builds", "/srv/apps", "node");
        let id = Uuid::new_v4();
        installer.install(id).await.unwrap();

        let commands = exec.commands.lock();
        assert_eq!(
            commands[0],
            format!("cp -r '/srv/builds/node/.' '/srv/apps/{}/publish/'", short_name(id))
        );
    }
}
