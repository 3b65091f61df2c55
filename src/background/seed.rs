use crate::queue::ProvisioningQueue;
use crate::tenant::lifecycle::Instance;
use crate::tenant::validate::{validate_domain, DEFAULT_APP_TYPE};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const SEED_DELAY: Duration = Duration::from_secs(2);

/// After `delay`, enqueue one instance per configured domain. Invalid
/// domains are skipped. Returns how many were enqueued.
pub async fn run(
    queue: Arc<ProvisioningQueue>,
    domains: Vec<String>,
    delay: Duration,
    cancel: CancellationToken,
) -> usize {
    tokio::select! {
        _ = cancel.cancelled() => return 0,
        _ = tokio::time::sleep(delay) => {}
    }

    let mut enqueued = 0;
    for domain in domains {
        if let Err(e) = validate_domain(&domain) {
            tracing::warn!("seed: skipping {}: {}", domain, e);
            continue;
        }
        let instance = Instance::new(domain, DEFAULT_APP_TYPE);
        tracing::info!("seed: enqueuing {}", instance.domain());
        if queue.enqueue(instance).is_ok() {
            enqueued += 1;
        }
    }
    enqueued
}
