//! The orchestrator boundary.
//!
//! The watch/informer machinery lives outside this system; what the
//! engine needs is a client that can fetch a Group resource by
//! namespaced name, persist spec-level changes (finalizers, labels,
//! owner references), and persist status. Reconcile requests arrive as
//! `(namespace, name)` pairs over the dispatcher channel.
//!
//! [`InMemoryGroupClient`] backs tests and the embedded dispatch loop.
//! It emulates the orchestrator's garbage collection: once a resource
//! carries a deletion timestamp and its last finalizer is removed, the
//! entry disappears.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use usernaut_core::GroupResource;

/// A reconcile request keyed by namespaced resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    pub namespace: String,
    pub name: String,
}

impl ReconcileRequest {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Error from the resource client.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("resource {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("resource client error: {0}")]
    Client(String),
}

/// What the engine needs from the orchestrator.
#[async_trait]
pub trait GroupResourceClient: Send + Sync {
    /// Fetch one Group resource. `Ok(None)` when it does not exist.
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GroupResource>, ResourceError>;

    /// Persist spec-level changes: finalizers, labels, owner references.
    /// Does not touch status.
    async fn update(&self, resource: &GroupResource) -> Result<(), ResourceError>;

    /// Persist the status subresource only.
    async fn update_status(&self, resource: &GroupResource) -> Result<(), ResourceError>;

    /// All Group resources in a namespace, for the periodic resync.
    async fn list(&self, namespace: &str) -> Result<Vec<GroupResource>, ResourceError>;
}

/// Map-backed resource client for tests and embedded runs.
#[derive(Default)]
pub struct InMemoryGroupClient {
    resources: RwLock<HashMap<(String, String), GroupResource>>,
}

impl InMemoryGroupClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(resource: &GroupResource) -> (String, String) {
        (
            resource.metadata.namespace.clone(),
            resource.metadata.name.clone(),
        )
    }

    /// Create or replace a resource wholesale (the "author" side).
    pub async fn apply(&self, resource: GroupResource) {
        let mut resources = self.resources.write().await;
        resources.insert(Self::key(&resource), resource);
    }

    /// Stamp a deletion timestamp, as the orchestrator does when a
    /// delete is requested while finalizers are present.
    pub async fn mark_deleted(&self, namespace: &str, name: &str) {
        let mut resources = self.resources.write().await;
        if let Some(resource) =
            resources.get_mut(&(namespace.to_string(), name.to_string()))
        {
            resource.metadata.deletion_timestamp = Some(Utc::now());
        }
    }

    pub async fn contains(&self, namespace: &str, name: &str) -> bool {
        let resources = self.resources.read().await;
        resources.contains_key(&(namespace.to_string(), name.to_string()))
    }
}

#[async_trait]
impl GroupResourceClient for InMemoryGroupClient {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GroupResource>, ResourceError> {
        let resources = self.resources.read().await;
        Ok(resources
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn update(&self, resource: &GroupResource) -> Result<(), ResourceError> {
        let mut resources = self.resources.write().await;
        let key = Self::key(resource);
        let Some(stored) = resources.get_mut(&key) else {
            return Err(ResourceError::NotFound {
                namespace: key.0,
                name: key.1,
            });
        };

        // Finalizer removal on a deleting resource completes the delete.
        if resource.metadata.deletion_timestamp.is_some() && resource.metadata.finalizers.is_empty()
        {
            resources.remove(&key);
            return Ok(());
        }

        let status = stored.status.clone();
        *stored = resource.clone();
        stored.status = status;
        Ok(())
    }

    async fn update_status(&self, resource: &GroupResource) -> Result<(), ResourceError> {
        let mut resources = self.resources.write().await;
        let key = Self::key(resource);
        let Some(stored) = resources.get_mut(&key) else {
            return Err(ResourceError::NotFound {
                namespace: key.0,
                name: key.1,
            });
        };
        stored.status = resource.status.clone();
        Ok(())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<GroupResource>, ResourceError> {
        let resources = self.resources.read().await;
        Ok(resources
            .values()
            .filter(|resource| resource.metadata.namespace == namespace)
            .cloned()
            .collect())
    }
}
