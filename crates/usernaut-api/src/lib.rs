//! # Usernaut API
//!
//! Read-only HTTP projection over the store layer, consumed by external
//! tooling:
//!
//! - `GET /api/v1/status` - liveness, unauthenticated
//! - `GET /api/v1/backends` - enabled backend list
//! - `GET /api/v1/user/:email/groups` - group membership for one user
//!
//! Authenticated routes use HTTP basic auth with credentials from
//! configuration. All reads take the shared cache lock; a reverse-index
//! entry whose `group:` record has vanished (offboarding leaves those
//! behind) is filtered out rather than surfaced.
//!
//! Health probes (`/readyz`, `/livez`) live in [`health`] and are served
//! on a separate listener.

pub mod handlers;
pub mod health;
pub mod models;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use usernaut_reconciler::CacheMutex;
use usernaut_store::Store;

/// Basic-auth credentials for the authenticated routes.
#[derive(Clone)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

/// Shared state of the query API.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<Store>,
    pub cache_mutex: CacheMutex,
    /// Enabled backends as `(name, type)` pairs.
    pub backends: Arc<Vec<(String, String)>>,
    pub basic_auth: Option<BasicAuthConfig>,
}

/// Build the query API router.
pub fn router(state: ApiState, cors_allowed_origins: &[String]) -> Router {
    let cors = cors_layer(cors_allowed_origins);

    let public = Router::new().route("/api/v1/status", get(handlers::status));

    let authenticated = Router::new()
        .route("/api/v1/backends", get(handlers::backends))
        .route("/api/v1/user/:email/groups", get(handlers::user_groups))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::basic_auth_middleware,
        ));

    public
        .merge(authenticated)
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|origin| origin == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
    }
}
