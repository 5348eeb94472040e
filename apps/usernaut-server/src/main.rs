//! Usernaut server binary.
//!
//! Startup sequence: configuration (fail-fast), tracing, cache driver,
//! LDAP, backend registry, preload, then the reconcile workers, periodic
//! jobs, query API, and health probes. Exit code 0 on clean shutdown,
//! non-zero on startup-configuration failure.

mod config;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use usernaut_api::health::HealthState;
use usernaut_api::{ApiState, BasicAuthConfig};
use usernaut_cache::{Cache, CacheDriver, InMemoryCache, RedisCache};
use usernaut_connector::{BackendType, BoxedConnector, ConnectorRegistry, HttpClientConfig};
use usernaut_connector_fivetran::FivetranConnector;
use usernaut_connector_gitlab::GitlabConnector;
use usernaut_connector_rover::RoverConnector;
use usernaut_connector_snowflake::SnowflakeConnector;
use usernaut_ldap::{LdapClient, LdapResolver};
use usernaut_reconciler::{
    new_cache_mutex, spawn_resync_loop, spawn_workers, Dispatcher, GroupReconciler,
    GroupResourceClient, InMemoryGroupClient, PeriodicTaskManager, Preloader, TransformRules,
    UserOffboardingJob,
};
use usernaut_store::Store;

use config::AppConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Register the adapter factory for every supported backend type.
fn register_factories(registry: &mut ConnectorRegistry, http: &HttpClientConfig) {
    let http_fivetran = http.clone();
    registry.register_factory(
        BackendType::Fivetran,
        Box::new(move |settings| {
            Ok(Box::new(FivetranConnector::new(settings, &http_fivetran)?) as BoxedConnector)
        }),
    );

    let http_gitlab = http.clone();
    registry.register_factory(
        BackendType::Gitlab,
        Box::new(move |settings| {
            Ok(Box::new(GitlabConnector::new(settings, &http_gitlab)?) as BoxedConnector)
        }),
    );

    let http_snowflake = http.clone();
    registry.register_factory(
        BackendType::Snowflake,
        Box::new(move |settings| {
            Ok(Box::new(SnowflakeConnector::new(settings, &http_snowflake)?) as BoxedConnector)
        }),
    );

    let http_rover = http.clone();
    registry.register_factory(
        BackendType::Rover,
        Box::new(move |settings| {
            Ok(Box::new(RoverConnector::new(settings, &http_rover)?) as BoxedConnector)
        }),
    );
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config_path = AppConfig::config_path();
    let config = match AppConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration from {config_path}: {err}");
            std::process::exit(1);
        }
    };
    let namespace = AppConfig::watched_namespace();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        namespace = %namespace,
        "starting usernaut"
    );

    // Cache driver.
    let cache: Arc<dyn Cache> = match config.cache.driver {
        CacheDriver::Memory => {
            info!("using in-memory cache driver");
            Arc::new(InMemoryCache::new())
        }
        CacheDriver::Redis => match RedisCache::connect(&config.cache.redis).await {
            Ok(redis) => {
                info!(host = %config.cache.redis.host, "using redis cache driver");
                Arc::new(redis)
            }
            Err(err) => {
                eprintln!("failed to connect to redis: {err}");
                std::process::exit(1);
            }
        },
    };
    let store = Arc::new(Store::new(cache));
    let cache_mutex = new_cache_mutex();

    // LDAP.
    let ldap: Arc<dyn LdapResolver> = match LdapClient::connect(config.ldap.clone()).await {
        Ok(client) => Arc::new(client),
        Err(err) => {
            eprintln!("failed to connect to LDAP: {err}");
            std::process::exit(1);
        }
    };

    // Backend registry, built once from configuration.
    let mut registry = ConnectorRegistry::new();
    register_factories(&mut registry, &config.http_client);
    for backend in &config.backends {
        if let Err(err) = registry.add_backend(backend.clone()) {
            eprintln!("invalid backend '{}': {err}", backend.backend_key());
            std::process::exit(1);
        }
    }
    let registry = Arc::new(registry);

    // Name-transformation rules.
    let transforms = match TransformRules::from_config(&config.pattern) {
        Ok(transforms) => Arc::new(transforms),
        Err(err) => {
            eprintln!("invalid pattern configuration: {err}");
            std::process::exit(1);
        }
    };

    let offboarding_interval = match config.offboarding_interval() {
        Ok(interval) => interval,
        Err(err) => {
            eprintln!("invalid offboarding interval: {err}");
            std::process::exit(1);
        }
    };
    let resync_interval = match config.resync_interval() {
        Ok(interval) => interval,
        Err(err) => {
            eprintln!("invalid resync interval: {err}");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Health probes come up first so liveness is observable during
    // preload; readiness flips after preload finishes.
    let health = HealthState::new();
    let health_listener = match tokio::net::TcpListener::bind(&config.api_server.health_listen).await
    {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!(
                "failed to bind health listener {}: {err}",
                config.api_server.health_listen
            );
            std::process::exit(1);
        }
    };
    let health_router = usernaut_api::health::router(health.clone());
    let mut health_shutdown = shutdown_rx.clone();
    let health_task = tokio::spawn(async move {
        if let Err(err) = axum::serve(health_listener, health_router)
            .with_graceful_shutdown(async move {
                let _ = health_shutdown.changed().await;
            })
            .await
        {
            error!(error = %err, "health listener failed");
        }
    });

    // Preload backend snapshots before accepting reconcile work.
    Preloader::new(Arc::clone(&registry), Arc::clone(&store), Arc::clone(&cache_mutex))
        .run()
        .await;
    health.mark_ready();

    // The orchestrator watch plugs into this dispatcher; the embedded
    // resource client serves the resync loop and tests.
    let resources: Arc<dyn GroupResourceClient> = Arc::new(InMemoryGroupClient::new());
    let mut reconciler = GroupReconciler::new(
        Arc::clone(&resources),
        Arc::clone(&store),
        Arc::clone(&cache_mutex),
        Arc::clone(&ldap),
        Arc::clone(&registry),
        Arc::clone(&transforms),
    );
    if let Some(label) = &config.app.force_reconcile_label {
        reconciler = reconciler.with_force_reconcile_label(label.clone());
    }
    let reconciler = Arc::new(reconciler);

    let (dispatcher, requests) = Dispatcher::new(256);
    let worker_handles = spawn_workers(
        config.app.reconcile_workers,
        requests,
        Arc::clone(&reconciler),
        dispatcher.clone(),
        shutdown_rx.clone(),
    );
    let resync_handle = spawn_resync_loop(
        Arc::clone(&resources),
        dispatcher.clone(),
        namespace,
        resync_interval,
        shutdown_rx.clone(),
    );

    // Periodic jobs.
    let mut tasks = PeriodicTaskManager::new();
    tasks.add_task(Arc::new(
        UserOffboardingJob::new(
            Arc::clone(&store),
            Arc::clone(&ldap),
            Arc::clone(&registry),
            Arc::clone(&cache_mutex),
        )
        .with_interval(offboarding_interval),
    ));
    let task_handles = tasks.spawn(shutdown_rx.clone());

    // Query API.
    let api_state = ApiState {
        store: Arc::clone(&store),
        cache_mutex: Arc::clone(&cache_mutex),
        backends: Arc::new(
            registry
                .enabled_backends()
                .iter()
                .map(|b| (b.name.clone(), b.type_.to_string()))
                .collect(),
        ),
        basic_auth: config.api_server.basic_auth.as_ref().map(|auth| BasicAuthConfig {
            username: auth.username.clone(),
            password: auth.password.clone(),
        }),
    };
    let api_router = usernaut_api::router(api_state, &config.api_server.cors_allowed_origins);
    let api_listener = match tokio::net::TcpListener::bind(&config.api_server.listen).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!(
                "failed to bind API listener {}: {err}",
                config.api_server.listen
            );
            std::process::exit(1);
        }
    };
    info!(listen = %config.api_server.listen, "query API listening");

    let mut api_shutdown = shutdown_rx.clone();
    let api_task = tokio::spawn(async move {
        if let Err(err) = axum::serve(api_listener, api_router)
            .with_graceful_shutdown(async move {
                let _ = api_shutdown.changed().await;
            })
            .await
        {
            error!(error = %err, "API listener failed");
        }
    });

    // Run until interrupted.
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => warn!(error = %err, "failed to listen for shutdown signal"),
    }
    let _ = shutdown_tx.send(true);

    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = resync_handle.await;
    for handle in task_handles {
        let _ = handle.await;
    }
    let _ = api_task.await;
    let _ = health_task.await;

    info!("usernaut stopped");
}
