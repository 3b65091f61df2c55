use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tenantforge::{
    alert::WebhookAlertService,
    background::{self, provisioning_worker::ProvisioningQueueWorker, BackgroundCoordinator},
    certs::{AcmeCertificateService, DisabledCertificates},
    config::{self, Mode, PlatformConfig, RoutingBackend},
    db::{self, pool::DbPool, tenants::SqliteTenantRepository},
    metrics::ProvisioningMetrics,
    proxy::{CaddyRouting, NginxRouting, NginxSettings, NoopRouting},
    queue::ProvisioningQueue,
    shell::LocalCommandExecutor,
    state::AppState,
    status_page::HtmlStatusPages,
    tenant::{
        deploy::{BuildCopyInstaller, Pm2DomainConfigurator, PortResourceAllocator},
        fake::{
            FakeBlueprintInstaller, FakeDomainConfigurator, FakeEnvironmentProvisioner,
            FakeHealthCheck, FakeResourceAllocator,
        },
        filesystem::LocalEnvironmentProvisioner,
        health::HttpHealthChecker,
        reconcile_ports,
        rollback::TenantRollback,
        traits::{
            AlertService, BlueprintInstaller, CertificateService, CommandExecutor,
            DomainConfigurator, EnvironmentProvisioner, HealthCheck, ResourceAllocator,
            RoutingConfigService, TenantRepository,
        },
        validate::{normalize_app_type, validate_domain},
        HealthPolicy, Instance, LifecycleState, PipelineDeps, PortAllocator,
        ProvisionInstancePipeline,
    },
};
use tracing::{error, info, warn};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "tenantforge", about = "Single-host tenant provisioning service", version)]
struct Cli {
    /// Path to TOML config file
    #[arg(short, long, default_value = "tenantforge.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create data directories and apply database migrations
    Bootstrap,
    /// Start the HTTP API, the provisioning workers and background tasks
    Serve,
    /// Run one instance through the pipeline in the foreground
    Provision {
        #[arg(long)]
        domain: String,
        #[arg(long)]
        app_type: Option<String>,
    },
    /// Write a compressed snapshot of the tenant database
    Backup {
        /// Output directory for backup files
        #[arg(long, default_value = "data/backups")]
        output: String,
    },
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenantforge=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    match cli.command {
        Commands::Bootstrap => bootstrap(&cfg),
        Commands::Serve => serve(cfg).await,
        Commands::Provision { domain, app_type } => {
            provision(cfg, &domain, app_type.as_deref()).await
        }
        Commands::Backup { output } => backup(&cfg, &output),
    }
}

// ── Bootstrap ──────────────────────────────────────────────────────────────

fn bootstrap(cfg: &PlatformConfig) -> anyhow::Result<()> {
    info!("Starting bootstrap...");
    create_data_dirs(cfg)?;
    open_database(cfg, 1)?;
    info!("Bootstrap complete.");
    Ok(())
}

// ── Serve ──────────────────────────────────────────────────────────────────

async fn serve(cfg: PlatformConfig) -> anyhow::Result<()> {
    let api_key = cfg
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .context("no API key configured: set api_key or PROVISIONING_API_KEY")?;

    info!("Opening database (4 reader connections)...");
    let pool = Arc::new(open_database(&cfg, 4)?);
    let repo: Arc<dyn TenantRepository> = Arc::new(SqliteTenantRepository::new(pool.clone()));

    let ports = Arc::new(PortAllocator::new(cfg.port_range));
    if cfg.reconcile_ports {
        let reserved = reconcile_ports(repo.as_ref(), &ports)
            .await
            .context("failed to reconcile tenant ports")?;
        info!("Reserved {} ports held by existing tenants", reserved);
    }

    let metrics = Arc::new(ProvisioningMetrics::new());
    let services = wire(&cfg, ports, repo.clone(), metrics.clone())?;

    if let Some(caddy) = &services.caddy {
        let running: Vec<(String, u16)> = repo
            .list_with_ports()
            .await?
            .into_iter()
            .filter(|t| t.state == LifecycleState::Running.as_str())
            .filter_map(|t| t.port.map(|port| (t.domain, port)))
            .collect();
        if !running.is_empty() {
            match caddy.sync_routes(&running).await {
                Ok(()) => info!("Synced {} tenant routes to Caddy", running.len()),
                Err(e) => warn!("Failed to sync Caddy routes: {}", e),
            }
        }
    }

    let queue = Arc::new(ProvisioningQueue::new());
    let pipeline = Arc::new(services.pipeline);

    let mut coordinator = BackgroundCoordinator::new();
    for id in 1..=cfg.worker_count.max(1) {
        ProvisioningQueueWorker::new(id, queue.clone(), pipeline.clone(), metrics.clone())
            .spawn(&mut coordinator);
    }

    if !cfg.seed_domains.is_empty() {
        let seed_queue = queue.clone();
        let domains = cfg.seed_domains.clone();
        let token = coordinator.token();
        coordinator.spawn("seed", async move {
            let n = background::seed::run(seed_queue, domains, background::seed::SEED_DELAY, token)
                .await;
            info!("seed: enqueued {} instances", n);
        });
    }

    if cfg.backup.enabled {
        let token = coordinator.token();
        coordinator.spawn(
            "database backup",
            background::backup::run(pool.path().to_path_buf(), cfg.backup.clone(), token),
        );
    }

    let state = AppState::new(
        api_key,
        queue,
        repo,
        services.health,
        services.certs,
        metrics,
    );
    let app = tenantforge::routes::app(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid bind address")?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {}", e);
    }

    coordinator.shutdown().await;
    info!("Server stopped.");
    Ok(())
}

// ── Provision (one-shot) ───────────────────────────────────────────────────

async fn provision(
    cfg: PlatformConfig,
    domain: &str,
    app_type: Option<&str>,
) -> anyhow::Result<()> {
    let domain = domain.trim().to_lowercase();
    validate_domain(&domain)?;
    let app_type = normalize_app_type(app_type)?;

    let pool = Arc::new(open_database(&cfg, 1)?);
    let repo: Arc<dyn TenantRepository> = Arc::new(SqliteTenantRepository::new(pool.clone()));
    let ports = Arc::new(PortAllocator::new(cfg.port_range));
    reconcile_ports(repo.as_ref(), &ports).await?;

    let services = wire(&cfg, ports, repo, Arc::new(ProvisioningMetrics::new()))?;
    let mut instance = Instance::new(domain, app_type);
    let result = services.pipeline.execute(&mut instance).await;

    println!("{} {} {}", instance.id(), instance.domain(), instance.state());
    result.with_context(|| format!("provisioning {} failed", instance.domain()))
}

// ── Backup ─────────────────────────────────────────────────────────────────

fn backup(cfg: &PlatformConfig, output: &str) -> anyhow::Result<()> {
    let archive = db::backup_compressed(&cfg.database_path, Path::new(output))
        .context("database backup failed")?;
    info!("Backup written to {}", archive.display());
    Ok(())
}

// ── Graceful shutdown ──────────────────────────────────────────────────────

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}

// ── Wiring ─────────────────────────────────────────────────────────────────

struct Services {
    pipeline: ProvisionInstancePipeline,
    health: Arc<dyn HealthCheck>,
    certs: Arc<dyn CertificateService>,
    caddy: Option<Arc<CaddyRouting>>,
}

fn wire(
    cfg: &PlatformConfig,
    ports: Arc<PortAllocator>,
    repo: Arc<dyn TenantRepository>,
    metrics: Arc<ProvisioningMetrics>,
) -> anyhow::Result<Services> {
    let executor: Arc<dyn CommandExecutor> = Arc::new(LocalCommandExecutor::new());
    let alerts: Arc<dyn AlertService> = Arc::new(WebhookAlertService::new(
        cfg.alerts.webhook_url.clone(),
        cfg.alerts.webhook_secret.clone(),
    )?);
    let status_pages = Arc::new(HtmlStatusPages::new(&cfg.status_dir)?);
    let rollback = Arc::new(TenantRollback::new(
        executor.clone(),
        repo.clone(),
        alerts,
        &cfg.apps_dir,
    ));

    let mut caddy = None;
    let (routing, certs): (Arc<dyn RoutingConfigService>, Arc<dyn CertificateService>) =
        if cfg.mode == Mode::Fake {
            (Arc::new(NoopRouting), Arc::new(DisabledCertificates))
        } else {
            let mut nginx = None;
            let routing: Arc<dyn RoutingConfigService> = match cfg.routing.backend {
                RoutingBackend::Nginx => {
                    let settings = NginxSettings {
                        sites_available: cfg.routing.sites_available.clone(),
                        sites_enabled: cfg.routing.sites_enabled.clone(),
                        webroot: cfg.certs.webroot.clone(),
                        test_command: cfg.routing.test_command.clone(),
                        reload_command: cfg.routing.reload_command.clone(),
                    };
                    let routing = Arc::new(NginxRouting::new(settings, executor.clone())?);
                    nginx = Some(routing.clone());
                    routing
                }
                RoutingBackend::Caddy => {
                    let routing = Arc::new(CaddyRouting::new(&cfg.routing.caddy_api_url));
                    caddy = Some(routing.clone());
                    routing
                }
                RoutingBackend::None => Arc::new(NoopRouting),
            };
            let certs: Arc<dyn CertificateService> = if cfg.certs.enabled {
                Arc::new(AcmeCertificateService::new(
                    executor.clone(),
                    &cfg.certs.acme_bin,
                    &cfg.certs.cert_dir,
                    &cfg.certs.webroot,
                    nginx,
                ))
            } else {
                Arc::new(DisabledCertificates)
            };
            (routing, certs)
        };

    let step_delay = Duration::from_millis(cfg.fake_step_delay_ms);
    let (resources, environment, installer, domains, health): (
        Arc<dyn ResourceAllocator>,
        Arc<dyn EnvironmentProvisioner>,
        Arc<dyn BlueprintInstaller>,
        Arc<dyn DomainConfigurator>,
        Arc<dyn HealthCheck>,
    ) = match cfg.mode {
        Mode::Local => (
            Arc::new(PortResourceAllocator::new(ports.clone())),
            Arc::new(LocalEnvironmentProvisioner::new(&cfg.apps_dir)),
            Arc::new(BuildCopyInstaller::new(
                executor.clone(),
                &cfg.builds_dir,
                &cfg.apps_dir,
                &cfg.app_type,
            )),
            Arc::new(Pm2DomainConfigurator::new(executor, ports, &cfg.apps_dir)),
            Arc::new(HttpHealthChecker::new(cfg.health.timeout())?),
        ),
        Mode::Fake => (
            Arc::new(FakeResourceAllocator::new(step_delay)),
            Arc::new(FakeEnvironmentProvisioner::new(step_delay)),
            Arc::new(FakeBlueprintInstaller::new(step_delay)),
            Arc::new(FakeDomainConfigurator::new(ports, step_delay)),
            Arc::new(FakeHealthCheck),
        ),
    };
    info!("Pipeline wired in {:?} mode", cfg.mode);

    let pipeline = ProvisionInstancePipeline::new(PipelineDeps {
        resources,
        environment,
        installer,
        domains,
        health: health.clone(),
        rollback,
        repo,
        status_pages,
        routing,
        certs: certs.clone(),
        metrics,
        health_policy: HealthPolicy {
            max_attempts: cfg.health.max_attempts,
            delay: cfg.health.delay(),
        },
    });

    Ok(Services {
        pipeline,
        health,
        certs,
        caddy,
    })
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn open_database(cfg: &PlatformConfig, readers: usize) -> anyhow::Result<DbPool> {
    let pool = DbPool::open(&cfg.database_path, readers).context("failed to open database")?;
    db::run_migrations(&pool).context("failed to run database migrations")?;
    Ok(pool)
}

fn create_data_dirs(cfg: &PlatformConfig) -> anyhow::Result<()> {
    if let Some(parent) = cfg.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create db dir: {}", parent.display()))?;
        }
    }

    // Host directories may need root; a failure here is not fatal for bootstrap
    for dir in [&cfg.backup.dir, &cfg.status_dir, &cfg.apps_dir] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("could not create {}: {}", dir.display(), e);
        }
    }

    info!(
        "Data directories ready: db={}, backups={}, status={}",
        cfg.database_path.display(),
        cfg.backup.dir.display(),
        cfg.status_dir.display()
    );
    Ok(())
}
