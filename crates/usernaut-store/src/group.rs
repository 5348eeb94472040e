//! Group view: `group:<logical-group-name>` → `{members, backends}`.
//!
//! The primary source of truth for cleanup and API queries, keyed by the
//! logical group name (not the transformed team name).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use usernaut_cache::Cache;

use crate::{StoreError, StoreResult, GROUP_PREFIX};

/// One backend's projection of a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBackend {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
}

/// The consolidated group record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupData {
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub backends: HashMap<String, GroupBackend>,
}

/// Consolidated group records keyed by logical group name.
pub struct GroupStore {
    cache: Arc<dyn Cache>,
}

impl GroupStore {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn key(group_name: &str) -> String {
        format!("{GROUP_PREFIX}{group_name}")
    }

    /// Full group record. A missing group is the empty record.
    pub async fn get(&self, group_name: &str) -> StoreResult<GroupData> {
        let key = Self::key(group_name);
        match self.cache.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|source| StoreError::Corrupt { key, source }),
            None => Ok(GroupData::default()),
        }
    }

    pub async fn set(&self, group_name: &str, data: &GroupData) -> StoreResult<()> {
        let key = Self::key(group_name);
        let raw = serde_json::to_string(data)
            .map_err(|source| StoreError::Serialize { key: key.clone(), source })?;
        Ok(self.cache.set(&key, &raw).await?)
    }

    pub async fn delete(&self, group_name: &str) -> StoreResult<()> {
        Ok(self.cache.delete(&Self::key(group_name)).await?)
    }

    pub async fn exists(&self, group_name: &str) -> StoreResult<bool> {
        Ok(self.cache.get(&Self::key(group_name)).await?.is_some())
    }

    /// Member emails. A missing group is an empty list.
    pub async fn get_members(&self, group_name: &str) -> StoreResult<Vec<String>> {
        Ok(self.get(group_name).await?.members)
    }

    /// Replace the member list, preserving backends.
    pub async fn set_members(&self, group_name: &str, members: Vec<String>) -> StoreResult<()> {
        let mut data = self.get(group_name).await?;
        data.members = members;
        self.set(group_name, &data).await
    }

    /// Backend map keyed by `"{name}_{type}"`.
    pub async fn get_backends(
        &self,
        group_name: &str,
    ) -> StoreResult<HashMap<String, GroupBackend>> {
        Ok(self.get(group_name).await?.backends)
    }

    /// Team id for one backend, `None` when absent.
    pub async fn get_backend_id(
        &self,
        group_name: &str,
        backend_name: &str,
        backend_type: &str,
    ) -> StoreResult<Option<String>> {
        let backends = self.get_backends(group_name).await?;
        Ok(backends
            .get(&format!("{backend_name}_{backend_type}"))
            .map(|b| b.id.clone()))
    }

    /// Add or update one backend, creating the group entry if needed and
    /// preserving members.
    pub async fn set_backend(
        &self,
        group_name: &str,
        backend_name: &str,
        backend_type: &str,
        team_id: &str,
    ) -> StoreResult<()> {
        let mut data = self.get(group_name).await?;
        data.backends.insert(
            format!("{backend_name}_{backend_type}"),
            GroupBackend {
                id: team_id.to_string(),
                name: backend_name.to_string(),
                type_: backend_type.to_string(),
            },
        );
        self.set(group_name, &data).await
    }

    /// Remove one backend; the whole entry is deleted when no backends and
    /// no members remain.
    pub async fn delete_backend(
        &self,
        group_name: &str,
        backend_name: &str,
        backend_type: &str,
    ) -> StoreResult<()> {
        let mut data = self.get(group_name).await?;
        data.backends
            .remove(&format!("{backend_name}_{backend_type}"));
        if data.backends.is_empty() && data.members.is_empty() {
            self.delete(group_name).await
        } else {
            self.set(group_name, &data).await
        }
    }

    pub async fn backend_exists(
        &self,
        group_name: &str,
        backend_name: &str,
        backend_type: &str,
    ) -> StoreResult<bool> {
        Ok(self
            .get_backend_id(group_name, backend_name, backend_type)
            .await?
            .is_some())
    }
}
