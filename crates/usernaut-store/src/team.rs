//! Team preload view: `team:<transformed-team-name>` → `{backend_key: team_id}`.
//!
//! Populated only by the preloader from each backend's own view of team
//! names. The reconciler reads it as a one-time migration source: once a
//! team id is promoted into the group store, this view is never consulted
//! again for that `(group, backend)` pair.

use std::collections::HashMap;
use std::sync::Arc;

use usernaut_cache::Cache;

use crate::{StoreError, StoreResult, TEAM_PREFIX};

/// Backend-id mappings per team, keyed by transformed team name.
pub struct TeamStore {
    cache: Arc<dyn Cache>,
}

impl TeamStore {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn key(team_name: &str) -> String {
        format!("{TEAM_PREFIX}{team_name}")
    }

    /// Backend-id map for a team. A missing team is an empty map.
    pub async fn get_backends(&self, team_name: &str) -> StoreResult<HashMap<String, String>> {
        let key = Self::key(team_name);
        match self.cache.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|source| StoreError::Corrupt { key, source }),
            None => Ok(HashMap::new()),
        }
    }

    pub async fn set_backend(
        &self,
        team_name: &str,
        backend_key: &str,
        team_id: &str,
    ) -> StoreResult<()> {
        let mut backends = self.get_backends(team_name).await?;
        backends.insert(backend_key.to_string(), team_id.to_string());
        self.write(team_name, &backends).await
    }

    /// Remove one backend id; the whole entry is deleted when the map
    /// becomes empty.
    pub async fn delete_backend(&self, team_name: &str, backend_key: &str) -> StoreResult<()> {
        let mut backends = self.get_backends(team_name).await?;
        backends.remove(backend_key);
        if backends.is_empty() {
            self.delete(team_name).await
        } else {
            self.write(team_name, &backends).await
        }
    }

    pub async fn delete(&self, team_name: &str) -> StoreResult<()> {
        Ok(self.cache.delete(&Self::key(team_name)).await?)
    }

    pub async fn exists(&self, team_name: &str) -> StoreResult<bool> {
        Ok(self.cache.get(&Self::key(team_name)).await?.is_some())
    }

    async fn write(&self, team_name: &str, backends: &HashMap<String, String>) -> StoreResult<()> {
        let key = Self::key(team_name);
        let raw = serde_json::to_string(backends)
            .map_err(|source| StoreError::Serialize { key: key.clone(), source })?;
        Ok(self.cache.set(&key, &raw).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usernaut_cache::InMemoryCache;

    fn store() -> TeamStore {
        TeamStore::new(Arc::new(InMemoryCache::new()))
    }

    #[tokio::test]
    async fn test_round_trip() {
        let teams = store();
        teams
            .set_backend("data-platform", "ftA_fivetran", "t1")
            .await
            .unwrap();

        let backends = teams.get_backends("data-platform").await.unwrap();
        assert_eq!(backends["ftA_fivetran"], "t1");
    }

    #[tokio::test]
    async fn test_delete_backend_on_last_removes_entry() {
        let teams = store();
        teams.set_backend("data-platform", "ftA_fivetran", "t1").await.unwrap();
        teams.delete_backend("data-platform", "ftA_fivetran").await.unwrap();
        assert!(!teams.exists("data-platform").await.unwrap());
    }
}
