//! Environment-driven endpoint resolution.
//!
//! Both endpoints fall back to a local development backend when the
//! environment provides nothing; the resolved source tag is returned so the
//! caller can log where the value came from.

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_SOCKET_URL: &str = "ws://127.0.0.1:8000/ws";
pub const ENV_API_BASE_URL: &str = "HRDESK_API_BASE_URL";
pub const ENV_SOCKET_URL: &str = "HRDESK_SOCKET_URL";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("url must not be empty")]
    EmptyUrl,
    #[error("api base url must use http:// or https:// and include a host")]
    InvalidApiBaseUrl,
    #[error("socket url must use ws:// or wss:// and include a host")]
    InvalidSocketUrl,
}

/// Resolved client endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub api_base_url: String,
    pub socket_url: String,
}

impl CoreConfig {
    /// Resolve both endpoints from the environment, defaulting local.
    pub fn from_env() -> Result<Self, ConfigError> {
        let (api_base_url, api_source) = resolve_api_base_url()?;
        let (socket_url, socket_source) = resolve_socket_url()?;
        tracing::debug!(
            "resolved api base url from {}, socket url from {}",
            api_source,
            socket_source
        );
        Ok(Self {
            api_base_url,
            socket_url,
        })
    }
}

pub fn resolve_api_base_url() -> Result<(String, &'static str), ConfigError> {
    if let Some(url) = env_non_empty(ENV_API_BASE_URL) {
        return normalize_api_base_url(&url).map(|normalized| (normalized, ENV_API_BASE_URL));
    }
    normalize_api_base_url(DEFAULT_API_BASE_URL).map(|normalized| (normalized, "default_local"))
}

pub fn resolve_socket_url() -> Result<(String, &'static str), ConfigError> {
    if let Some(url) = env_non_empty(ENV_SOCKET_URL) {
        return normalize_socket_url(&url).map(|normalized| (normalized, ENV_SOCKET_URL));
    }
    normalize_socket_url(DEFAULT_SOCKET_URL).map(|normalized| (normalized, "default_local"))
}

pub fn normalize_api_base_url(raw: &str) -> Result<String, ConfigError> {
    normalize_url(raw, &["http://", "https://"], ConfigError::InvalidApiBaseUrl)
}

pub fn normalize_socket_url(raw: &str) -> Result<String, ConfigError> {
    normalize_url(raw, &["ws://", "wss://"], ConfigError::InvalidSocketUrl)
}

fn normalize_url(
    raw: &str,
    schemes: &[&str],
    invalid: ConfigError,
) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyUrl);
    }
    if !schemes.iter().any(|scheme| trimmed.starts_with(scheme)) {
        return Err(invalid);
    }
    let Some((_, remainder)) = trimmed.split_once("://") else {
        return Err(invalid);
    };
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(invalid);
    }
    Ok(trimmed.to_string())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
