//! In-process cache driver.
//!
//! Backs development runs and the store/reconciler test suites. State is
//! a plain map behind a `tokio::sync::RwLock`; pattern reads snapshot the
//! matching entries under a single read guard.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{glob_match, Cache, CacheResult};

/// Map-backed cache for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries. Test helper.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn get_by_pattern(&self, pattern: &str) -> CacheResult<HashMap<String, String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
