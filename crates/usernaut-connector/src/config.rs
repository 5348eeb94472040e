//! Connector configuration types.

use std::collections::HashMap;

use serde::Deserialize;
use usernaut_core::BackendRef;

use crate::error::{ConnectorError, ConnectorResult};
use crate::types::BackendType;

/// Authentication method for a backend's HTTP API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum AuthConfig {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
    ApiKey {
        key: String,
        header_name: String,
    },
}

/// Connection parameters for one backend instance.
///
/// Common fields cover every adapter; backend-specific keys (parent
/// group id, LDAP provider name, account identifier) live in `params`
/// and are validated by the adapter at construction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionSettings {
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ConnectionSettings {
    /// Fetch a required adapter-specific parameter, failing with a config
    /// error naming the missing key.
    pub fn require_param(&self, name: &str) -> ConnectorResult<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ConnectorError::invalid_config(format!("missing required connection parameter '{name}'"))
            })
    }

    /// Fetch an optional parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn validate(&self) -> ConnectorResult<()> {
        if self.base_url.is_empty() {
            return Err(ConnectorError::invalid_config("base_url must not be empty"));
        }
        Ok(())
    }
}

/// One backend instance as declared in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: BackendType,
    #[serde(default)]
    pub enabled: bool,
    /// Another backend this one depends on (git hosting depending on the
    /// directory for LDAP sync).
    #[serde(default)]
    pub depends_on: Option<BackendRef>,
    #[serde(default)]
    pub connection: ConnectionSettings,
}

impl BackendSettings {
    /// The composite key `"{name}_{type}"`.
    #[must_use]
    pub fn backend_key(&self) -> String {
        format!("{}_{}", self.name, self.type_)
    }

    #[must_use]
    pub fn backend_ref(&self) -> BackendRef {
        BackendRef::new(self.name.clone(), self.type_.as_str())
    }
}

/// Pool and resiliency settings shared by every HTTP adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 5,
            pool_max_idle_per_host: 10,
            max_retries: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
        }
    }
}
