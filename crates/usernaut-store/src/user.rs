//! User view: `user:<email>` → `{backend_key: backend_user_id}`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use usernaut_cache::Cache;

use crate::{StoreError, StoreResult, USER_GROUPS_PREFIX, USER_PREFIX};

/// Backend-id mappings per user, keyed by email.
///
/// Co-owned: the preloader writes initial mappings, the reconciler adds
/// ids as it creates users, the offboarding job deletes whole records.
pub struct UserStore {
    cache: Arc<dyn Cache>,
}

impl UserStore {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn key(email: &str) -> String {
        format!("{USER_PREFIX}{email}")
    }

    /// Backend-id map for a user. A missing user is an empty map.
    pub async fn get_backends(&self, email: &str) -> StoreResult<HashMap<String, String>> {
        let key = Self::key(email);
        match self.cache.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|source| StoreError::Corrupt { key, source }),
            None => Ok(HashMap::new()),
        }
    }

    /// Add or update one backend id, creating the user entry if needed.
    pub async fn set_backend(
        &self,
        email: &str,
        backend_key: &str,
        backend_id: &str,
    ) -> StoreResult<()> {
        let mut backends = self.get_backends(email).await?;
        backends.insert(backend_key.to_string(), backend_id.to_string());
        self.write(email, &backends).await
    }

    /// Remove one backend id; the whole entry is deleted when the map
    /// becomes empty.
    pub async fn delete_backend(&self, email: &str, backend_key: &str) -> StoreResult<()> {
        let mut backends = self.get_backends(email).await?;
        backends.remove(backend_key);
        if backends.is_empty() {
            self.delete(email).await
        } else {
            self.write(email, &backends).await
        }
    }

    pub async fn delete(&self, email: &str) -> StoreResult<()> {
        Ok(self.cache.delete(&Self::key(email)).await?)
    }

    pub async fn exists(&self, email: &str) -> StoreResult<bool> {
        Ok(self.cache.get(&Self::key(email)).await?.is_some())
    }

    /// All users whose email matches a glob pattern (without the `user:`
    /// prefix, which is added here).
    ///
    /// Reverse-index entries (`user:groups:*`) also live under the `user:`
    /// prefix; their values are JSON arrays, not backend maps, and are
    /// skipped.
    pub async fn get_by_pattern(
        &self,
        pattern: &str,
    ) -> StoreResult<HashMap<String, HashMap<String, String>>> {
        let entries = self
            .cache
            .get_by_pattern(&format!("{USER_PREFIX}{pattern}"))
            .await?;

        let mut users = HashMap::with_capacity(entries.len());
        for (key, raw) in entries {
            let suffix = key.trim_start_matches(USER_PREFIX);
            if key.starts_with(USER_GROUPS_PREFIX) {
                continue;
            }
            match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(backends) => {
                    users.insert(suffix.to_string(), backends);
                }
                Err(err) => {
                    debug!(key = %key, error = %err, "skipping non-user entry in pattern scan");
                }
            }
        }
        Ok(users)
    }

    async fn write(&self, email: &str, backends: &HashMap<String, String>) -> StoreResult<()> {
        let key = Self::key(email);
        let raw = serde_json::to_string(backends)
            .map_err(|source| StoreError::Serialize { key: key.clone(), source })?;
        Ok(self.cache.set(&key, &raw).await?)
    }
}
