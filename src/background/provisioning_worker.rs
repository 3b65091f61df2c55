use super::BackgroundCoordinator;
use crate::metrics::ProvisioningMetrics;
use crate::queue::ProvisioningQueue;
use crate::tenant::lifecycle::LifecycleState;
use crate::tenant::pipeline::ProvisionInstancePipeline;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Pulls instances off the queue and runs each through the pipeline. A
/// failing instance never takes the worker down.
pub struct ProvisioningQueueWorker {
    id: usize,
    queue: Arc<ProvisioningQueue>,
    pipeline: Arc<ProvisionInstancePipeline>,
    metrics: Arc<ProvisioningMetrics>,
}

impl ProvisioningQueueWorker {
    pub fn new(
        id: usize,
        queue: Arc<ProvisioningQueue>,
        pipeline: Arc<ProvisionInstancePipeline>,
        metrics: Arc<ProvisioningMetrics>,
    ) -> Self {
        Self {
            id,
            queue,
            pipeline,
            metrics,
        }
    }

    /// Hand the worker to the coordinator; it stops on the coordinator's token.
    pub fn spawn(self, coordinator: &mut BackgroundCoordinator) {
        let token = coordinator.token();
        coordinator.spawn(format!("provisioning worker {}", self.id), self.run(token));
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!("worker-{}: waiting for instances", self.id);
        while let Some(instance) = self.queue.dequeue(&cancel).await {
            self.metrics.set_queue_depth(self.queue.len());
            let (id, domain) = (instance.id(), instance.domain().to_string());
            info!("worker-{}: provisioning {} ({})", self.id, domain, id);

            // Own task per instance so a panicking collaborator unwinds there.
            let pipeline = self.pipeline.clone();
            let run = tokio::spawn(async move {
                let mut instance = instance;
                let outcome = pipeline.execute(&mut instance).await;
                (instance, outcome)
            });

            match run.await {
                Ok((_, Ok(()))) => {}
                Ok((mut instance, Err(e))) => {
                    error!("worker-{}: {} failed: {}", self.id, domain, e);
                    if !instance.state().is_terminal() {
                        let _ = instance.transition_to(LifecycleState::Failed);
                    }
                }
                Err(e) => {
                    let reason = if e.is_panic() {
                        format!("provisioning {domain} panicked")
                    } else {
                        format!("provisioning {domain} was cancelled")
                    };
                    error!("worker-{}: {}", self.id, reason);
                    self.pipeline.abandon(id, &domain, &reason).await;
                }
            }
        }
        info!("worker-{}: shutdown signal received", self.id);
    }
}
