use super::lifecycle::short_name;
use super::traits::HealthCheck;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

/// Probes `http://{host}:{port}/` with a fixed delay between attempts.
/// The first 2xx short-circuits; no sleep follows the last attempt.
pub struct HttpHealthChecker {
    client: reqwest::Client,
    host: String,
}

impl HttpHealthChecker {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            host: "127.0.0.1".into(),
        })
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

#[async_trait]
impl HealthCheck for HttpHealthChecker {
    async fn check_health(
        &self,
        instance_id: Uuid,
        port: u16,
        max_attempts: u32,
        delay: Duration,
    ) -> bool {
        let tenant = short_name(instance_id);
        let url = format!("http://{}:{}/", self.host, port);

        for attempt in 1..=max_attempts {
            info!("health: checking tenant {tenant} on port {port} (attempt {attempt}/{max_attempts})");
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!("health: tenant {tenant} is healthy (port {port})");
                    return true;
                }
                Ok(resp) => warn!("health: status {} from {}", resp.status(), url),
                Err(e) => warn!("health: request to {} failed: {}", url, e),
            }

            if attempt < max_attempts {
                tokio::time::sleep(delay).await;
            }
        }

        warn!("health: tenant {tenant} failed health check after {max_attempts} attempts");
        false
    }
}
