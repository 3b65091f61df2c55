use crate::tenant::traits::RoutingConfigService;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

/// Build a single route entry for Caddy's config API.
/// Matches `hostname` and reverse-proxies to `127.0.0.1:{port}`.
pub fn build_route(hostname: &str, port: u16) -> Value {
    json!({
        "@id": route_id(hostname),
        "match": [
            {
                "host": [hostname]
            }
        ],
        "handle": [
            {
                "handler": "reverse_proxy",
                "upstreams": [
                    {
                        "dial": format!("127.0.0.1:{}", port)
                    }
                ]
            }
        ],
        "terminal": true
    })
}

/// Stable `@id` so a re-provisioned domain replaces its old route.
pub fn route_id(hostname: &str) -> String {
    format!("tenant-{}", hostname.replace('.', "-"))
}

/// Pushes tenant routes into a running Caddy through its admin API.
/// Caddy reloads itself on every config change, so there is no separate
/// reload step.
pub struct CaddyRouting {
    api_url: String,
    client: reqwest::Client,
}

impl CaddyRouting {
    pub fn new(api_url: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn add_route(&self, hostname: &str, port: u16) -> Result<()> {
        // drop any earlier route for the same host; 404 just means none existed
        let id_url = format!("{}/id/{}", self.api_url, route_id(hostname));
        let resp = self.client.delete(&id_url).send().await?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            tracing::warn!("caddy: clearing old route for {} returned {}", hostname, resp.status());
        }

        let url = format!("{}/config/apps/http/servers/srv0/routes", self.api_url);
        let resp = self
            .client
            .post(&url)
            .json(&build_route(hostname, port))
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Caddy add route failed: {}", body);
        }
        tracing::info!("caddy: route added {} -> 127.0.0.1:{}", hostname, port);
        Ok(())
    }

    /// Re-push every (domain, port) pair; used on startup.
    pub async fn sync_routes(&self, tenants: &[(String, u16)]) -> Result<()> {
        for (domain, port) in tenants {
            if let Err(e) = self.add_route(domain, *port).await {
                tracing::warn!("caddy: failed to sync route for {}: {}", domain, e);
            }
        }
        tracing::info!("caddy: route sync complete ({} tenants)", tenants.len());
        Ok(())
    }
}

#[async_trait]
impl RoutingConfigService for CaddyRouting {
    async fn generate_and_reload(&self, _tenant_id: Uuid, domain: &str, port: u16) -> Result<()> {
        self.add_route(domain, port).await
    }
}
