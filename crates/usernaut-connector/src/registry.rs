//! Backend registry: the one singleton-like structure in the system,
//! built once from configuration and shared read-only.
//!
//! The registry stores per-backend settings and a factory per backend
//! type. `create` hands out a fresh boxed adapter per call: adapters are
//! cheap (they clone a pooled HTTP client), and per-reconcile state such
//! as LDAP-sync mode must never leak between reconciles of different
//! groups.

use std::collections::HashMap;

use crate::config::BackendSettings;
use crate::error::{ConnectorError, ConnectorResult};
use crate::traits::Connector;
use crate::types::BackendType;

/// Type alias for a boxed adapter.
pub type BoxedConnector = Box<dyn Connector>;

/// Factory building an adapter from its backend settings.
pub type ConnectorFactory =
    Box<dyn Fn(&BackendSettings) -> ConnectorResult<BoxedConnector> + Send + Sync>;

/// Registry of backend settings and adapter factories.
pub struct ConnectorRegistry {
    factories: HashMap<BackendType, ConnectorFactory>,
    backends: HashMap<String, BackendSettings>,
}

impl ConnectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            backends: HashMap::new(),
        }
    }

    /// Register the factory for a backend type.
    pub fn register_factory(&mut self, backend_type: BackendType, factory: ConnectorFactory) {
        self.factories.insert(backend_type, factory);
    }

    /// Add one configured backend instance, validating eagerly so a
    /// misconfigured enabled backend fails startup.
    pub fn add_backend(&mut self, settings: BackendSettings) -> ConnectorResult<()> {
        if settings.enabled {
            settings.connection.validate()?;
        }
        self.backends.insert(settings.backend_key(), settings);
        Ok(())
    }

    /// Settings for one backend instance, if configured.
    #[must_use]
    pub fn settings(&self, name: &str, type_: &str) -> Option<&BackendSettings> {
        self.backends.get(&format!("{name}_{type_}"))
    }

    /// All enabled backend instances.
    #[must_use]
    pub fn enabled_backends(&self) -> Vec<&BackendSettings> {
        let mut enabled: Vec<&BackendSettings> =
            self.backends.values().filter(|b| b.enabled).collect();
        enabled.sort_by(|a, b| a.backend_key().cmp(&b.backend_key()));
        enabled
    }

    /// Construct a fresh adapter for one backend instance.
    pub fn create(&self, name: &str, type_: &str) -> ConnectorResult<BoxedConnector> {
        let settings = self
            .settings(name, type_)
            .ok_or_else(|| ConnectorError::UnknownBackend {
                backend: format!("{name}_{type_}"),
            })?;
        if !settings.enabled {
            return Err(ConnectorError::Disabled {
                backend: settings.backend_key(),
            });
        }
        let factory =
            self.factories
                .get(&settings.type_)
                .ok_or_else(|| ConnectorError::UnknownBackend {
                    backend: settings.type_.to_string(),
                })?;
        factory(settings)
    }

    #[must_use]
    pub fn has_factory(&self, backend_type: BackendType) -> bool {
        self.factories.contains_key(&backend_type)
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
