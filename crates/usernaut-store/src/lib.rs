//! # Usernaut Store
//!
//! Prefixed, JSON-typed views over the shared cache. Four views, each
//! enforcing a key prefix and (de)serialization:
//!
//! | view         | key                              | value                          |
//! |--------------|----------------------------------|--------------------------------|
//! | `user`       | `user:<email>`                   | `{backend_key: backend_user_id}` |
//! | `team`       | `team:<transformed-team-name>`   | `{backend_key: backend_team_id}` (preload only) |
//! | `group`      | `group:<logical-group-name>`     | `{members, backends}`          |
//! | `user_groups`| `user:groups:<email>`            | `[group-name]`                 |
//!
//! The prefixes are part of the external contract with any debugging
//! tool pointed at the cache; no key carries a TTL.
//!
//! The store layer does NOT lock. Callers hold the process-wide cache
//! mutex appropriate to their access pattern.

pub mod group;
pub mod team;
pub mod user;
pub mod user_groups;

use std::sync::Arc;

use usernaut_cache::{Cache, CacheError};

pub use group::{GroupBackend, GroupData, GroupStore};
pub use team::TeamStore;
pub use user::UserStore;
pub use user_groups::UserGroupsStore;

pub(crate) const USER_PREFIX: &str = "user:";
pub(crate) const TEAM_PREFIX: &str = "team:";
pub(crate) const GROUP_PREFIX: &str = "group:";
pub(crate) const USER_GROUPS_PREFIX: &str = "user:groups:";

/// Error from a store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A cache value did not parse as the expected JSON shape.
    #[error("corrupt cache entry at '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize value for '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The aggregate store handed to the reconciler, preloader, offboarding
/// job, and query API.
pub struct Store {
    pub user: UserStore,
    pub team: TeamStore,
    pub group: GroupStore,
    pub user_groups: UserGroupsStore,
}

impl Store {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            user: UserStore::new(Arc::clone(&cache)),
            team: TeamStore::new(Arc::clone(&cache)),
            group: GroupStore::new(Arc::clone(&cache)),
            user_groups: UserGroupsStore::new(cache),
        }
    }
}
