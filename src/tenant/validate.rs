use regex::Regex;
use std::sync::LazyLock;

pub const APP_TYPES: [&str; 3] = ["node", "python", "static"];
pub const DEFAULT_APP_TYPE: &str = "node";
pub const MAX_DOMAIN_LEN: usize = 253;

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$").expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("domain is required and cannot be empty")]
    EmptyDomain,
    #[error("domain cannot exceed 253 characters")]
    DomainTooLong,
    #[error("domain format is invalid, must be a valid FQDN")]
    InvalidDomain,
    #[error("app type '{0}' is not supported, valid types: node, python, static")]
    UnsupportedAppType(String),
}

/// Validate a hostname: dot-separated labels of 1..=63 alphanumerics or
/// hyphens, no label starting or ending with a hyphen, 253 chars overall.
pub fn validate_domain(domain: &str) -> Result<(), ValidationError> {
    if domain.trim().is_empty() {
        return Err(ValidationError::EmptyDomain);
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(ValidationError::DomainTooLong);
    }
    if domain.split('.').all(|label| LABEL_RE.is_match(label)) {
        Ok(())
    } else {
        Err(ValidationError::InvalidDomain)
    }
}

/// Normalise an app type: blank falls back to `node`, otherwise lowercased
/// and checked against the supported set.
pub fn normalize_app_type(app_type: Option<&str>) -> Result<String, ValidationError> {
    let raw = app_type.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(DEFAULT_APP_TYPE.to_string());
    }
    let lowered = raw.to_ascii_lowercase();
    if APP_TYPES.contains(&lowered.as_str()) {
        Ok(lowered)
    } else {
        Err(ValidationError::UnsupportedAppType(raw.to_string()))
    }
}
