//! # Usernaut Cache
//!
//! Opaque key→string store behind the store layer. Two drivers: an
//! in-process map for development and tests, and redis for production.
//!
//! Keys never carry a TTL. The cache is the system of record for
//! reconciliation state between restarts, so expiry would silently drop
//! team and user mappings.
//!
//! Misses are `Ok(None)` (or an absent map entry for pattern reads),
//! never errors - callers treat a cold cache as an empty container.

pub mod memory;
pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;

pub use self::memory::InMemoryCache;
pub use self::redis::{RedisCache, RedisConfig};

/// Error from a cache driver.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to reach the remote cache.
    #[error("cache connection failed: {0}")]
    Connection(String),

    /// A command failed after the connection was established.
    #[error("cache operation '{operation}' failed: {message}")]
    Operation { operation: String, message: String },
}

impl CacheError {
    pub(crate) fn operation(operation: impl Into<String>, message: impl ToString) -> Self {
        CacheError::Operation {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// The cache contract consumed by the store layer.
///
/// Implementations do not lock across operations; the process-wide cache
/// mutex is held by callers (see the reconciler crate).
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a value. A missing key is `Ok(None)`.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value. No TTL: entries live until deleted.
    async fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Delete a key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Fetch all entries whose key matches a glob pattern (`*` wildcard).
    ///
    /// Implementations collect candidate keys first and then bulk-read, so
    /// a concurrent writer cannot produce duplicated entries; keys deleted
    /// between the two steps are skipped.
    async fn get_by_pattern(&self, pattern: &str) -> CacheResult<HashMap<String, String>>;

    /// Connectivity check used at startup and by health probes.
    async fn ping(&self) -> CacheResult<()>;
}

/// Which cache driver to construct, from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    #[default]
    Memory,
    Redis,
}

/// Glob matching with `*` wildcards, shared by the in-memory driver.
///
/// Supports exactly the subset of redis glob syntax the store layer
/// emits: literal characters and `*`.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = key.chars().collect();

    // Iterative wildcard match with backtracking to the last star.
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut star_t = 0usize;

    while t < text.len() {
        if p < pat.len() && (pat[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match_literal() {
        assert!(glob_match("user:alice@x", "user:alice@x"));
        assert!(!glob_match("user:alice@x", "user:bob@x"));
    }

    #[test]
    fn test_glob_match_trailing_star() {
        assert!(glob_match("user:*", "user:alice@x"));
        assert!(glob_match("user:*", "user:"));
        assert!(!glob_match("user:*", "team:alice@x"));
    }

    #[test]
    fn test_glob_match_inner_star() {
        assert!(glob_match("user:*@redhat.com", "user:alice@redhat.com"));
        assert!(!glob_match("user:*@redhat.com", "user:alice@example.com"));
        assert!(glob_match("*alice*", "user:alice@x"));
    }

    #[test]
    fn test_glob_match_multiple_stars() {
        assert!(glob_match("user:*groups:*", "user:groups:alice@x"));
        assert!(glob_match("*:*:*", "user:groups:alice@x"));
    }
}
