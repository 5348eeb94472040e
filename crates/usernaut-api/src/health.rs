//! Health probes, served on their own listener.
//!
//! - `GET /livez` - process alive, always 200
//! - `GET /readyz` - 200 once preload has completed for all enabled
//!   backends (or errored with a logged warning), 503 before that

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

/// Readiness flag flipped by the binary after preload.
#[derive(Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub status: String,
}

/// Build the health probe router.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .with_state(state)
}

async fn livez() -> Json<ProbeResponse> {
    Json(ProbeResponse {
        status: "ok".to_string(),
    })
}

async fn readyz(State(state): State<HealthState>) -> (StatusCode, Json<ProbeResponse>) {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ProbeResponse {
                status: "ready".to_string(),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ProbeResponse {
                status: "starting".to_string(),
            }),
        )
    }
}
