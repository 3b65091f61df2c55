use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::ApiKey;
use crate::error::AppError;
use crate::state::SharedState;
use crate::tenant::lifecycle::{Instance, LifecycleState};
use crate::tenant::validate::{normalize_app_type, validate_domain};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    #[serde(default, alias = "Domain")]
    pub domain: Option<String>,
    #[serde(default, alias = "AppType")]
    pub app_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionResponse {
    pub instance_id: Uuid,
    pub domain: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatusResponse {
    pub instance_id: Uuid,
    pub domain: String,
    pub state: String,
    pub port: Option<u16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_healthy: bool,
    pub health_status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateResponse {
    pub status: &'static str,
    pub message: String,
}

fn parse_instance_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("invalid instance id format".into()))
}

/// POST /api/provision
pub async fn provision(
    _key: ApiKey,
    State(state): State<SharedState>,
    Json(req): Json<ProvisionRequest>,
) -> Result<Json<ProvisionResponse>, AppError> {
    let domain = req.domain.unwrap_or_default().trim().to_ascii_lowercase();
    validate_domain(&domain)?;
    let app_type = normalize_app_type(req.app_type.as_deref())?;

    if let Some(existing) = state.repo.get_by_domain(&domain).await? {
        if existing.state != LifecycleState::Failed.as_str() {
            return Err(AppError::Conflict(format!(
                "domain {} already has tenant {} ({})",
                domain, existing.id, existing.state
            )));
        }
    }

    let instance = Instance::new(domain.clone(), app_type);
    let instance_id = instance.id();
    state
        .queue
        .enqueue(instance)
        .map_err(|e| AppError::Unavailable(e.to_string()))?;
    state.metrics.set_queue_depth(state.queue.len());
    tracing::info!("api: enqueued {} ({})", domain, instance_id);

    Ok(Json(ProvisionResponse {
        instance_id,
        domain,
        status: "Queued",
    }))
}

/// GET /api/status/{id}
pub async fn status(
    _key: ApiKey,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<TenantStatusResponse>, AppError> {
    let id = parse_instance_id(&id)?;
    let tenant = state
        .repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("tenant not found".into()))?;

    let (is_healthy, health_status) = match tenant.port {
        Some(port) if tenant.state == LifecycleState::Running.as_str() => {
            let healthy = state.health.check_health(id, port, 1, Duration::ZERO).await;
            (healthy, if healthy { "Healthy" } else { "Unhealthy" }.to_string())
        }
        Some(_) => (false, tenant.state.clone()),
        None => (false, "Unknown".to_string()),
    };

    Ok(Json(TenantStatusResponse {
        instance_id: tenant.id,
        domain: tenant.domain,
        state: tenant.state,
        port: tenant.port,
        created_at: tenant.created_at,
        updated_at: tenant.updated_at,
        is_healthy,
        health_status,
    }))
}

/// POST /api/ssl/{id}: issuance runs in the background.
pub async fn issue_certificate(
    _key: ApiKey,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<CertificateResponse>, AppError> {
    let id = parse_instance_id(&id)?;
    let tenant = state
        .repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("tenant not found".into()))?;

    let certs = state.certs.clone();
    let domain = tenant.domain.clone();
    tokio::spawn(async move {
        tracing::info!("ssl: issuing certificate for {} on request", domain);
        match certs.generate_certificate(&domain).await {
            Ok(true) => tracing::info!("ssl: certificate ready for {}", domain),
            Ok(false) => tracing::warn!("ssl: certificate not issued for {}", domain),
            Err(e) => tracing::error!("ssl: certificate for {} failed: {:#}", domain, e),
        }
    });

    Ok(Json(CertificateResponse {
        status: "Processing",
        message: format!("certificate generation started for {}", tenant.domain),
    }))
}
