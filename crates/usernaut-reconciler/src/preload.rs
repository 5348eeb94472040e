//! Startup preload.
//!
//! Before the reconcile loop accepts work, every enabled backend is
//! snapshotted concurrently: its users into the User store (keyed by
//! email) and its teams into the Team store (keyed by the backend's own
//! team name). Each individual write takes the cache mutex exclusively -
//! backends run in parallel and their writes are independent, so there
//! is no large lock.
//!
//! Per-backend failures are logged and do not abort startup; the
//! reconciler observes the resulting cache miss and recovers by
//! creating whatever is missing.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use usernaut_connector::ConnectorRegistry;
use usernaut_store::Store;

use crate::CacheMutex;

/// Startup fan-out populating the User and Team stores.
pub struct Preloader {
    registry: Arc<ConnectorRegistry>,
    store: Arc<Store>,
    cache_mutex: CacheMutex,
}

impl Preloader {
    pub fn new(registry: Arc<ConnectorRegistry>, store: Arc<Store>, cache_mutex: CacheMutex) -> Self {
        Self {
            registry,
            store,
            cache_mutex,
        }
    }

    /// Preload every enabled backend concurrently. Always returns; the
    /// caller flips readiness afterwards.
    pub async fn run(&self) {
        let backends: Vec<(String, String)> = self
            .registry
            .enabled_backends()
            .iter()
            .map(|settings| (settings.name.clone(), settings.type_.to_string()))
            .collect();

        info!(backend_count = backends.len(), "starting cache preload");

        let tasks = backends.into_iter().map(|(name, type_)| {
            let registry = Arc::clone(&self.registry);
            let store = Arc::clone(&self.store);
            let cache_mutex = Arc::clone(&self.cache_mutex);
            async move {
                if let Err(err) = preload_backend(&registry, &store, &cache_mutex, &name, &type_).await
                {
                    warn!(
                        backend = %name,
                        backend_type = %type_,
                        error = %err,
                        "preload failed for backend, reconciler will recover lazily"
                    );
                }
            }
        });

        join_all(tasks).await;
        info!("cache preload finished");
    }
}

async fn preload_backend(
    registry: &ConnectorRegistry,
    store: &Store,
    cache_mutex: &CacheMutex,
    name: &str,
    type_: &str,
) -> Result<(), String> {
    let connector = registry.create(name, type_).map_err(|err| err.to_string())?;
    let backend_key = format!("{name}_{type_}");

    let (_, users_by_email) = connector
        .fetch_all_users()
        .await
        .map_err(|err| err.to_string())?;
    let mut user_count = 0usize;
    for (email, user) in &users_by_email {
        if email.is_empty() || user.id.is_empty() {
            continue;
        }
        let _guard = cache_mutex.write().await;
        if let Err(err) = store.user.set_backend(email, &backend_key, &user.id).await {
            warn!(user = %email, backend = %backend_key, error = %err, "preload: failed to cache user");
            continue;
        }
        user_count += 1;
    }

    let teams = connector
        .fetch_all_teams()
        .await
        .map_err(|err| err.to_string())?;
    let mut team_count = 0usize;
    for (team_name, team) in &teams {
        if team.id.is_empty() {
            continue;
        }
        let _guard = cache_mutex.write().await;
        if let Err(err) = store.team.set_backend(team_name, &backend_key, &team.id).await {
            warn!(team = %team_name, backend = %backend_key, error = %err, "preload: failed to cache team");
            continue;
        }
        team_count += 1;
    }

    info!(
        backend = %backend_key,
        users = user_count,
        teams = team_count,
        "preloaded backend"
    );
    Ok(())
}
