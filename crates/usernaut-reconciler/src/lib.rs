//! # Usernaut Reconciler
//!
//! The convergence engine: turns declarative Group resources into users
//! and team memberships across every configured backend, and keeps them
//! that way.
//!
//! ## Crate Organization
//!
//! - [`transform`] - per-backend regex rules mapping logical group names
//!   to backend team names
//! - [`resource`] - the orchestrator boundary: resource client trait and
//!   the in-memory implementation
//! - [`reconciler`] - the per-Group convergence algorithm
//! - [`dispatch`] - reconcile-request queue and worker pool
//! - [`preload`] - startup fan-out populating the User and Team stores
//! - [`jobs`] - periodic task manager
//! - [`offboarding`] - daily LDAP-vs-cache sweep removing departed users
//!
//! ## The cache mutex
//!
//! A single process-wide read-write lock ([`CacheMutex`]) coordinates
//! every cache-touching component: the reconciler holds it exclusively
//! across its whole LDAP + backends + index region, the preloader takes
//! it per write, the offboarding scan takes it shared, and the query API
//! reads under it. It is constructed once in the binary and passed
//! explicitly; nothing reaches for it through a global.

pub mod dispatch;
pub mod jobs;
pub mod offboarding;
pub mod preload;
pub mod reconciler;
pub mod resource;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use dispatch::{spawn_resync_loop, spawn_workers, Dispatcher};
pub use jobs::{JobError, PeriodicTask, PeriodicTaskManager};
pub use offboarding::UserOffboardingJob;
pub use preload::Preloader;
pub use reconciler::{GroupReconciler, ReconcileError, GROUP_FINALIZER};
pub use resource::{GroupResourceClient, InMemoryGroupClient, ReconcileRequest, ResourceError};
pub use transform::{PatternRule, TransformError, TransformRules};

/// The process-wide cache lock. See the crate docs for the protocol.
pub type CacheMutex = Arc<tokio::sync::RwLock<()>>;

/// Construct the shared cache mutex.
#[must_use]
pub fn new_cache_mutex() -> CacheMutex {
    Arc::new(tokio::sync::RwLock::new(()))
}
