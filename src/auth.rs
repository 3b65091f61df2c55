use crate::error::AppError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Present on any handler that requires a valid `X-API-Key` header.
pub struct ApiKey;

/// Constant-time comparison; an empty key never matches.
pub fn key_matches(expected: &str, provided: &str) -> bool {
    if provided.trim().is_empty() || expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

impl FromRequestParts<Arc<AppState>> for ApiKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        if !key_matches(&state.api_key, provided) {
            tracing::warn!("api: rejected request with invalid {}", API_KEY_HEADER);
            return Err(AppError::Unauthorized);
        }
        Ok(ApiKey)
    }
}
