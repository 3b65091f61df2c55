use crate::tenant::traits::AlertService;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RollbackEvent<'a> {
    event_type: &'static str,
    tenant_id: Uuid,
    domain: &'a str,
    reason: &'a str,
    timestamp: String,
    severity: &'static str,
}

/// Logs every rollback and, when a URL is configured, POSTs a JSON event to
/// it. With a secret set, the body is signed as `sha256=<hex hmac>`.
pub struct WebhookAlertService {
    client: reqwest::Client,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
}

impl WebhookAlertService {
    pub fn new(webhook_url: Option<String>, webhook_secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.filter(|u| !u.is_empty()),
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
        })
    }
}

pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| anyhow!("invalid webhook secret"))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[async_trait]
impl AlertService for WebhookAlertService {
    async fn send_rollback_alert(&self, tenant_id: Uuid, domain: &str, reason: &str) -> Result<()> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        tracing::error!(
            tenant_id = %tenant_id,
            domain,
            "alert: rollback executed at {}: {}",
            timestamp,
            reason
        );

        let Some(url) = &self.webhook_url else {
            return Ok(());
        };

        let body = serde_json::to_vec(&RollbackEvent {
            event_type: "Rollback",
            tenant_id,
            domain,
            reason,
            timestamp,
            severity: "high",
        })?;

        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.webhook_secret {
            request = request.header(SIGNATURE_HEADER, sign(secret, &body)?);
        }

        let resp = request
            .body(body)
            .send()
            .await
            .with_context(|| format!("webhook POST to {url} failed"))?;
        if !resp.status().is_success() {
            bail!("webhook returned {}", resp.status());
        }
        tracing::info!("alert: webhook delivered ({})", resp.status());
        Ok(())
    }
}
