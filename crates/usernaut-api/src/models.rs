//! Response shapes of the query API.

use serde::Serialize;

/// `GET /api/v1/status` response.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
}

/// One enabled backend in the `GET /api/v1/backends` response.
#[derive(Debug, Clone, Serialize)]
pub struct BackendEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
}

/// `GET /api/v1/backends` response.
#[derive(Debug, Clone, Serialize)]
pub struct BackendsResponse {
    pub backends: Vec<BackendEntry>,
}

/// One group a user belongs to, with its backend projections.
#[derive(Debug, Clone, Serialize)]
pub struct UserGroupEntry {
    pub name: String,
    pub backends: Vec<BackendEntry>,
}

/// `GET /api/v1/user/:email/groups` response.
#[derive(Debug, Clone, Serialize)]
pub struct UserGroupsResponse {
    pub email: String,
    pub groups: Vec<UserGroupEntry>,
}

/// Error payload for non-2xx responses.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
