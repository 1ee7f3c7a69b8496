//! Client configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

const ENV_BASE_URI: &str = "SERVICE_CLIENT_BASE_URI";
const ENV_STORE_CREDENTIALS: &str = "SERVICE_CLIENT_STORE_CREDENTIALS";
const ENV_AUTO_RENEWAL: &str = "SERVICE_CLIENT_AUTO_RENEWAL";
const ENV_MAX_RENEWAL_ATTEMPTS: &str = "SERVICE_CLIENT_MAX_RENEWAL_ATTEMPTS";

/// Settings shared by `ServiceClient` and `AuthenticatedClient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Absolute base URI operation URIs are resolved against
    pub base_uri: String,

    /// Keep credentials after a successful `authenticate_with` (default: true)
    pub store_credentials: bool,

    /// Hand expired-authentication failures to the renewal policy (default: true)
    pub auto_renewal: bool,

    /// Cap on re-authentications and retries per renewal; `None` lets the
    /// policy loop without bound (default: 3)
    pub max_renewal_attempts: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_uri: "http://localhost:3000/".to_string(),
            store_credentials: true,
            auto_renewal: true,
            max_renewal_attempts: Some(3),
        }
    }
}

impl ClientConfig {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            ..Self::default()
        }
    }

    /// Load from `SERVICE_CLIENT_*` environment variables, falling back to
    /// defaults for unset ones. `SERVICE_CLIENT_MAX_RENEWAL_ATTEMPTS=0`
    /// disables the cap.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(uri) = lookup(ENV_BASE_URI) {
            config.base_uri = uri;
        }
        if let Some(value) = lookup(ENV_STORE_CREDENTIALS) {
            config.store_credentials = parse_bool(ENV_STORE_CREDENTIALS, &value)?;
        }
        if let Some(value) = lookup(ENV_AUTO_RENEWAL) {
            config.auto_renewal = parse_bool(ENV_AUTO_RENEWAL, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RENEWAL_ATTEMPTS) {
            let attempts: u32 = value
                .trim()
                .parse()
                .map_err(|e| ClientError::Other(format!("{ENV_MAX_RENEWAL_ATTEMPTS}: {e}")))?;
            config.max_renewal_attempts = (attempts > 0).then_some(attempts);
        }
        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ClientError::Other(format!("{key}: expected a boolean, got {other:?}"))),
    }
}
