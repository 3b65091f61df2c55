//! The provisioning pipeline: drives one `Instance` from `Requested` to
//! `Running`, or through `RollingBack` to `Failed`.
//!
//! Every stage is tagged with a [`Criticality`]. Fatal stages abort the run
//! and trigger the rollback branch; advisory stages (status page, routing,
//! certificates, persistence) only log.

use super::allocator::NoPortsAvailable;
use super::lifecycle::{short_name, Instance, LifecycleError, LifecycleState, TenantRecord};
use super::traits::{
    BlueprintInstaller, CertificateService, DomainConfigurator, EnvironmentProvisioner,
    HealthCheck, ResourceAllocator, Rollback, RoutingConfigService, StatusPageService,
    TenantRepository,
};
use super::validate::{normalize_app_type, validate_domain, ValidationError};
use crate::metrics::ProvisioningMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const STATUS_PAGE_MESSAGE: &str = "Setting up your environment...";

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    NoPortsAvailable(#[from] NoPortsAvailable),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("port allocation failed for {domain}")]
    NoPort { domain: String },
    #[error("health check failed for {domain} on port {port}")]
    Unhealthy { domain: String, port: u16 },
    #[error("{stage} failed: {source:#}")]
    Stage {
        stage: LifecycleState,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    Fatal,
    Advisory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    StatusPage,
    Persist,
    Allocate,
    Environment,
    Install,
    Configure,
    StatusPageRemoval,
    Routing,
    Certificate,
}

impl Step {
    const fn criticality(self) -> Criticality {
        match self {
            Step::Allocate | Step::Environment | Step::Install | Step::Configure => {
                Criticality::Fatal
            }
            Step::StatusPage
            | Step::Persist
            | Step::StatusPageRemoval
            | Step::Routing
            | Step::Certificate => Criticality::Advisory,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Step::StatusPage => "status page",
            Step::Persist => "persist",
            Step::Allocate => "resource allocation",
            Step::Environment => "environment",
            Step::Install => "blueprint install",
            Step::Configure => "domain configuration",
            Step::StatusPageRemoval => "status page removal",
            Step::Routing => "routing",
            Step::Certificate => "certificate",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_attempts: super::health::DEFAULT_MAX_ATTEMPTS,
            delay: super::health::DEFAULT_DELAY,
        }
    }
}

/// Everything the pipeline talks to. Built once in `main` (or a test) and
/// handed over by value.
pub struct PipelineDeps {
    pub resources: Arc<dyn ResourceAllocator>,
    pub environment: Arc<dyn EnvironmentProvisioner>,
    pub installer: Arc<dyn BlueprintInstaller>,
    pub domains: Arc<dyn DomainConfigurator>,
    pub health: Arc<dyn HealthCheck>,
    pub rollback: Arc<dyn Rollback>,
    pub repo: Arc<dyn TenantRepository>,
    pub status_pages: Arc<dyn StatusPageService>,
    pub routing: Arc<dyn RoutingConfigService>,
    pub certs: Arc<dyn CertificateService>,
    pub metrics: Arc<ProvisioningMetrics>,
    pub health_policy: HealthPolicy,
}

pub struct ProvisionInstancePipeline {
    deps: PipelineDeps,
}

impl ProvisionInstancePipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    /// Run every stage. On a fatal error the instance ends `Failed` and the
    /// error is returned.
    pub async fn execute(&self, instance: &mut Instance) -> Result<(), ProvisionError> {
        let started = Instant::now();
        let result = self.run(instance).await;
        if let Err(err) = &result {
            self.fail(instance, err).await;
        }
        self.deps.metrics.observe_provision(started.elapsed());
        result
    }

    async fn run(&self, instance: &mut Instance) -> Result<(), ProvisionError> {
        let d = &self.deps;
        let id = instance.id();
        let domain = instance.domain().to_string();

        self.guard(
            instance,
            Step::StatusPage,
            d.status_pages.generate(&domain, id, STATUS_PAGE_MESSAGE).await,
        )?;

        self.advance(instance, LifecycleState::Validating).await?;
        validate_domain(&domain)?;
        normalize_app_type(Some(instance.app_type()))?;

        self.advance(instance, LifecycleState::AllocatingResources).await?;
        self.guard(instance, Step::Allocate, d.resources.allocate(id).await)?;

        self.advance(instance, LifecycleState::CreatingEnvironment).await?;
        self.guard(instance, Step::Environment, d.environment.create_environment(id).await)?;

        self.advance(instance, LifecycleState::InstallingBlueprint).await?;
        self.guard(instance, Step::Install, d.installer.install(id).await)?;

        self.advance(instance, LifecycleState::ConfiguringDomain).await?;
        let port = self
            .guard(instance, Step::Configure, d.domains.configure(id, &domain).await)?
            .flatten();
        if let Some(port) = port {
            self.guard(instance, Step::Persist, d.repo.set_port(id, port).await)?;
        }

        self.advance(instance, LifecycleState::HealthChecking).await?;
        let port = port.ok_or_else(|| ProvisionError::NoPort {
            domain: domain.clone(),
        })?;
        let policy = d.health_policy;
        let healthy = d
            .health
            .check_health(id, port, policy.max_attempts, policy.delay)
            .await;
        d.metrics.health_check(healthy);
        if !healthy {
            return Err(ProvisionError::Unhealthy { domain, port });
        }
        self.guard(instance, Step::StatusPageRemoval, d.status_pages.remove(&domain).await)?;

        self.advance(instance, LifecycleState::Finalizing).await?;
        self.guard(
            instance,
            Step::Routing,
            d.routing.generate_and_reload(id, &domain, port).await,
        )?;
        if let Some(false) = self.guard(
            instance,
            Step::Certificate,
            d.certs.generate_certificate(&domain).await,
        )? {
            warn!(tenant = %instance.short_name(), "certificate not issued for {}, keeping fallback", domain);
        }

        self.advance(instance, LifecycleState::Running).await?;
        d.metrics.tenant_provisioned(instance.app_type());
        info!(tenant = %instance.short_name(), port, "pipeline: {} is running", domain);
        Ok(())
    }

    /// Apply a step's criticality to its outcome.
    fn guard<T>(
        &self,
        instance: &Instance,
        step: Step,
        outcome: anyhow::Result<T>,
    ) -> Result<Option<T>, ProvisionError> {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(e) => match step.criticality() {
                Criticality::Advisory => {
                    warn!(tenant = %instance.short_name(), "pipeline: {} failed (ignored): {:#}", step.label(), e);
                    Ok(None)
                }
                Criticality::Fatal => Err(stage_error(instance.state(), e)),
            },
        }
    }

    /// Move the instance forward and persist the new state. Entering
    /// `AllocatingResources` creates the durable record.
    async fn advance(
        &self,
        instance: &mut Instance,
        next: LifecycleState,
    ) -> Result<(), ProvisionError> {
        let from = instance.state();
        instance.transition_to(next)?;
        info!(tenant = %instance.short_name(), "pipeline: {} -> {}", from, next);

        let persisted = match next {
            LifecycleState::Requested | LifecycleState::Validating => return Ok(()),
            LifecycleState::AllocatingResources => {
                self.deps.repo.create(TenantRecord::for_instance(instance)).await
            }
            _ => self.deps.repo.update_state(instance.id(), next).await,
        };
        self.guard(instance, Step::Persist, persisted)?;
        Ok(())
    }

    async fn fail(&self, instance: &mut Instance, err: &ProvisionError) {
        let state = instance.state();
        if state.is_terminal() {
            return;
        }
        error!(tenant = %instance.short_name(), "pipeline: {} failed at {}: {}", instance.domain(), state, err);

        if state.code() < LifecycleState::AllocatingResources.code() {
            if let Err(e) = instance.transition_to(LifecycleState::Failed) {
                warn!("pipeline: {}", e);
            }
        } else {
            if let Err(e) = self.advance(instance, LifecycleState::RollingBack).await {
                warn!("pipeline: {}", e);
            }
            self.deps.metrics.rollback();
            self.deps.rollback.rollback(instance.id(), &err.to_string()).await;
            if let Err(e) = self.advance(instance, LifecycleState::Failed).await {
                warn!("pipeline: {}", e);
            }
        }

        self.take_down_status_page(instance.id(), instance.domain()).await;
    }

    /// Failure path for a run whose task died before returning. Only the
    /// repository knows how far it got; anything persisted and still live is
    /// rolled back and marked `Failed`.
    pub async fn abandon(&self, instance_id: Uuid, domain: &str, reason: &str) {
        let d = &self.deps;
        let name = short_name(instance_id);
        error!(tenant = %name, "pipeline: {} aborted: {}", domain, reason);

        match d.repo.get_by_id(instance_id).await {
            Ok(Some(record)) => {
                let live = record
                    .state
                    .parse::<LifecycleState>()
                    .map_or(true, |s| !s.is_terminal());
                if live {
                    if let Err(e) = d.repo.update_state(instance_id, LifecycleState::RollingBack).await {
                        warn!(tenant = %name, "pipeline: persist failed (ignored): {:#}", e);
                    }
                    d.metrics.rollback();
                    d.rollback.rollback(instance_id, reason).await;
                    if let Err(e) = d.repo.update_state(instance_id, LifecycleState::Failed).await {
                        warn!(tenant = %name, "pipeline: persist failed (ignored): {:#}", e);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!(tenant = %name, "pipeline: record lookup failed: {:#}", e),
        }

        self.take_down_status_page(instance_id, domain).await;
    }

    async fn take_down_status_page(&self, instance_id: Uuid, domain: &str) {
        if let Err(e) = self.deps.status_pages.remove(domain).await {
            warn!(tenant = %short_name(instance_id), "pipeline: {} failed (ignored): {:#}", Step::StatusPageRemoval.label(), e);
        }
    }
}

fn stage_error(stage: LifecycleState, err: anyhow::Error) -> ProvisionError {
    match err.downcast::<NoPortsAvailable>() {
        Ok(exhausted) => ProvisionError::NoPortsAvailable(exhausted),
        Err(source) => ProvisionError::Stage { stage, source },
    }
}
