//! Connector error types with transient/domain classification.

use reqwest::StatusCode;

/// Error from a backend adapter operation.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The object does not exist in the backend. A domain signal, not a
    /// failure: deletes treat it as success, lookups as a cold cache.
    #[error("not found: {identifier}")]
    NotFound { identifier: String },

    /// The object already exists (409 on create). Adapters absorb this by
    /// fetching and returning the existing object; it only surfaces when
    /// that recovery itself fails.
    #[error("already exists: {identifier}")]
    Conflict { identifier: String },

    /// Credentials rejected or insufficient permissions.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// The backend asked us to back off.
    #[error("rate limited by backend")]
    RateLimited,

    /// Transient remote failure: timeout, 5xx, connection reset. Retried
    /// on the next reconcile dispatch.
    #[error("transient backend error ({status}): {message}")]
    Transient { status: u16, message: String },

    /// The adapter configuration is unusable.
    #[error("invalid connector configuration: {message}")]
    InvalidConfig { message: String },

    /// No factory or settings registered for the requested backend.
    #[error("unknown backend: {backend}")]
    UnknownBackend { backend: String },

    /// The backend exists in configuration but is disabled.
    #[error("backend is not enabled: {backend}")]
    Disabled { backend: String },

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not parse as the expected shape.
    #[error("failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Catch-all for adapter-specific failures.
    #[error("operation failed: {message}")]
    OperationFailed { message: String },
}

impl ConnectorError {
    pub fn not_found(identifier: impl Into<String>) -> Self {
        ConnectorError::NotFound {
            identifier: identifier.into(),
        }
    }

    pub fn conflict(identifier: impl Into<String>) -> Self {
        ConnectorError::Conflict {
            identifier: identifier.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn operation_failed(message: impl Into<String>) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
        }
    }

    /// Map a non-success HTTP response to the error taxonomy.
    pub fn from_status(status: StatusCode, body: &str, identifier: &str) -> Self {
        match status {
            StatusCode::NOT_FOUND => ConnectorError::not_found(identifier),
            StatusCode::CONFLICT => ConnectorError::conflict(identifier),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ConnectorError::Unauthorized {
                message: truncate(body),
            },
            StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited,
            status if status.is_server_error() => ConnectorError::Transient {
                status: status.as_u16(),
                message: truncate(body),
            },
            status => ConnectorError::OperationFailed {
                message: format!("status {}: {}", status.as_u16(), truncate(body)),
            },
        }
    }

    /// Whether retrying on a later dispatch may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectorError::Transient { .. } | ConnectorError::RateLimited => true,
            ConnectorError::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConnectorError::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConnectorError::Conflict { .. })
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
