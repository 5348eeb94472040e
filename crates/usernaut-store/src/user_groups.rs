//! Reverse index: `user:groups:<email>` → ordered list of group names.
//!
//! Answers "what groups is this user in" without scanning every group.
//! Entries are engine-owned; the offboarding job deletes whole emails
//! only. Mutators are idempotent set operations over an ordered list.

use std::sync::Arc;

use usernaut_cache::Cache;

use crate::{StoreError, StoreResult, USER_GROUPS_PREFIX};

/// User→groups reverse index keyed by email.
pub struct UserGroupsStore {
    cache: Arc<dyn Cache>,
}

impl UserGroupsStore {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn key(email: &str) -> String {
        format!("{USER_GROUPS_PREFIX}{email}")
    }

    /// Group names for a user. A missing entry is an empty list.
    pub async fn get_groups(&self, email: &str) -> StoreResult<Vec<String>> {
        let key = Self::key(email);
        match self.cache.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|source| StoreError::Corrupt { key, source }),
            None => Ok(Vec::new()),
        }
    }

    /// Append a group if not already present.
    pub async fn add_group(&self, email: &str, group_name: &str) -> StoreResult<()> {
        let mut groups = self.get_groups(email).await?;
        if groups.iter().any(|g| g == group_name) {
            return Ok(());
        }
        groups.push(group_name.to_string());
        self.write(email, &groups).await
    }

    /// Replace the whole list.
    pub async fn set_groups(&self, email: &str, groups: Vec<String>) -> StoreResult<()> {
        self.write(email, &groups).await
    }

    /// Remove a group if present; the entry is deleted when the list
    /// becomes empty. Removing an absent group succeeds.
    pub async fn remove_group(&self, email: &str, group_name: &str) -> StoreResult<()> {
        let mut groups = self.get_groups(email).await?;
        let before = groups.len();
        groups.retain(|g| g != group_name);
        if groups.len() == before {
            return Ok(());
        }
        if groups.is_empty() {
            self.delete(email).await
        } else {
            self.write(email, &groups).await
        }
    }

    pub async fn delete(&self, email: &str) -> StoreResult<()> {
        Ok(self.cache.delete(&Self::key(email)).await?)
    }

    pub async fn exists(&self, email: &str) -> StoreResult<bool> {
        Ok(self.cache.get(&Self::key(email)).await?.is_some())
    }

    async fn write(&self, email: &str, groups: &[String]) -> StoreResult<()> {
        let key = Self::key(email);
        let raw = serde_json::to_string(groups)
            .map_err(|source| StoreError::Serialize { key: key.clone(), source })?;
        Ok(self.cache.set(&key, &raw).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usernaut_cache::InMemoryCache;

    fn store() -> UserGroupsStore {
        UserGroupsStore::new(Arc::new(InMemoryCache::new()))
    }

    #[tokio::test]
    async fn test_add_group_is_idempotent() {
        let index = store();
        index.add_group("alice@x", "g1").await.unwrap();
        index.add_group("alice@x", "g1").await.unwrap();
        assert_eq!(index.get_groups("alice@x").await.unwrap(), vec!["g1"]);
    }

    #[tokio::test]
    async fn test_add_then_remove_is_identity() {
        let index = store();
        index.add_group("alice@x", "g1").await.unwrap();
        index.add_group("alice@x", "g2").await.unwrap();
        index.remove_group("alice@x", "g2").await.unwrap();
        assert_eq!(index.get_groups("alice@x").await.unwrap(), vec!["g1"]);
    }

    #[tokio::test]
    async fn test_remove_last_group_deletes_entry() {
        let index = store();
        index.add_group("alice@x", "g1").await.unwrap();
        index.remove_group("alice@x", "g1").await.unwrap();
        assert!(!index.exists("alice@x").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_absent_group_is_noop() {
        let index = store();
        index.add_group("alice@x", "g1").await.unwrap();
        index.remove_group("alice@x", "never-there").await.unwrap();
        assert_eq!(index.get_groups("alice@x").await.unwrap(), vec!["g1"]);
    }

    #[tokio::test]
    async fn test_ordering_is_preserved() {
        let index = store();
        for group in ["g3", "g1", "g2"] {
            index.add_group("alice@x", group).await.unwrap();
        }
        assert_eq!(
            index.get_groups("alice@x").await.unwrap(),
            vec!["g3", "g1", "g2"]
        );
    }
}
