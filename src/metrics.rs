use parking_lot::Mutex;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::time::Duration;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct AppTypeLabels {
    app_type: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: String,
}

const PROVISION_BUCKETS: [f64; 9] = [1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0];

/// Process-wide Prometheus metrics, shared through `Arc`.
pub struct ProvisioningMetrics {
    registry: Mutex<Registry>,
    tenants_provisioned: Family<AppTypeLabels, Counter>,
    health_checks: Family<OutcomeLabels, Counter>,
    rollbacks: Counter,
    queue_depth: Gauge,
    provision_duration_seconds: Histogram,
}

impl ProvisioningMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let tenants_provisioned = Family::<AppTypeLabels, Counter>::default();
        registry.register(
            "tenantforge_tenants_provisioned",
            "Tenants that reached Running, by app type",
            tenants_provisioned.clone(),
        );

        let health_checks = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "tenantforge_health_checks",
            "Pipeline health checks by outcome",
            health_checks.clone(),
        );

        let rollbacks = Counter::default();
        registry.register("tenantforge_rollbacks", "Rollbacks executed", rollbacks.clone());

        let queue_depth: Gauge = Gauge::default();
        registry.register(
            "tenantforge_queue_depth",
            "Instances waiting in the provisioning queue",
            queue_depth.clone(),
        );

        let provision_duration_seconds = Histogram::new(PROVISION_BUCKETS.into_iter());
        registry.register(
            "tenantforge_provision_duration_seconds",
            "Wall time of one pipeline run",
            provision_duration_seconds.clone(),
        );

        Self {
            registry: Mutex::new(registry),
            tenants_provisioned,
            health_checks,
            rollbacks,
            queue_depth,
            provision_duration_seconds,
        }
    }

    pub fn tenant_provisioned(&self, app_type: &str) {
        self.tenants_provisioned
            .get_or_create(&AppTypeLabels {
                app_type: app_type.to_string(),
            })
            .inc();
    }

    pub fn health_check(&self, healthy: bool) {
        let outcome = if healthy { "success" } else { "failure" };
        self.health_checks
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn rollback(&self) {
        self.rollbacks.inc();
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth
            .set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    pub fn observe_provision(&self, elapsed: Duration) {
        self.provision_duration_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        let reg = self.registry.lock();
        encode(&mut buf, &reg)?;
        Ok(buf)
    }
}

impl Default for ProvisioningMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_includes_every_family() {
        let metrics = ProvisioningMetrics::new();
        metrics.tenant_provisioned("node");
        metrics.health_check(true);
        metrics.health_check(false);
        metrics.rollback();
        metrics.set_queue_depth(3);
        metrics.observe_provision(Duration::from_secs(4));

        let output = metrics.encode().unwrap();
        assert!(output.contains("tenantforge_tenants_provisioned_total{app_type=\"node\"} 1"));
        assert!(output.contains("tenantforge_health_checks_total{outcome=\"failure\"} 1"));
        assert!(output.contains("tenantforge_rollbacks_total 1"));
        assert!(output.contains("tenantforge_queue_depth 3"));
        assert!(output.contains("tenantforge_provision_duration_seconds"));
    }

    #[test]
    fn empty_registry_still_encodes() {
        let output = ProvisioningMetrics::new().encode().unwrap();
        assert!(output.contains("# EOF"));
    }
}
