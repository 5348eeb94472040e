//! Query API handlers and the basic-auth middleware.

use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use tracing::{debug, warn};

use crate::models::{
    BackendEntry, BackendsResponse, ErrorResponse, StatusResponse, UserGroupEntry,
    UserGroupsResponse,
};
use crate::ApiState;

/// `GET /api/v1/status` - liveness, unauthenticated.
pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/v1/backends` - the enabled backend list.
pub async fn backends(State(state): State<ApiState>) -> Json<BackendsResponse> {
    Json(BackendsResponse {
        backends: state
            .backends
            .iter()
            .map(|(name, type_)| BackendEntry {
                name: name.clone(),
                type_: type_.clone(),
            })
            .collect(),
    })
}

/// `GET /api/v1/user/:email/groups` - groups for one user, assembled
/// from the reverse index and each referenced group record.
pub async fn user_groups(
    State(state): State<ApiState>,
    Path(email): Path<String>,
) -> Response {
    let _guard = state.cache_mutex.read().await;

    let group_names = match state.store.user_groups.get_groups(&email).await {
        Ok(groups) => groups,
        Err(err) => {
            warn!(user = %email, error = %err, "error reading user groups index");
            return internal_error();
        }
    };

    let mut groups = Vec::with_capacity(group_names.len());
    for name in group_names {
        match state.store.group.get_backends(&name).await {
            Ok(backends) if backends.is_empty() => {
                // Offboarding leaves reverse-index entries behind after
                // the group record is gone; drop them from the view.
                debug!(group = %name, "group record missing, filtering from response");
            }
            Ok(backends) => {
                let mut entries: Vec<BackendEntry> = backends
                    .into_values()
                    .map(|backend| BackendEntry {
                        name: backend.name,
                        type_: backend.type_,
                    })
                    .collect();
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                groups.push(UserGroupEntry {
                    name,
                    backends: entries,
                });
            }
            Err(err) => {
                warn!(group = %name, error = %err, "error reading group record");
                return internal_error();
            }
        }
    }

    Json(UserGroupsResponse { email, groups }).into_response()
}

/// HTTP basic auth against the configured credentials. Routes behind
/// this middleware reject requests when no credentials are configured.
pub async fn basic_auth_middleware(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.basic_auth else {
        return unauthorized("api credentials are not configured");
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| base64::engine::general_purpose::STANDARD.decode(encoded).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .is_some_and(|credentials| {
            credentials == format!("{}:{}", expected.username, expected.password)
        });

    if !authorized {
        return unauthorized("invalid credentials");
    }

    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"usernaut\"")],
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal error".to_string(),
        }),
    )
        .into_response()
}
