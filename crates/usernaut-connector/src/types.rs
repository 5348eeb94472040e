//! Backend type definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Type of backend a connector talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Data-pipeline platform
    Fivetran,
    /// Git hosting platform
    Gitlab,
    /// Data warehouse
    Snowflake,
    /// Internal directory
    Rover,
}

impl BackendType {
    /// Get all supported backend types.
    #[must_use]
    pub fn all() -> &'static [BackendType] {
        &[
            BackendType::Fivetran,
            BackendType::Gitlab,
            BackendType::Snowflake,
            BackendType::Rover,
        ]
    }

    /// The string form used in configuration and cache keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Fivetran => "fivetran",
            BackendType::Gitlab => "gitlab",
            BackendType::Snowflake => "snowflake",
            BackendType::Rover => "rover",
        }
    }

    /// Whether the offboarding job must leave this backend alone: the
    /// backend's own lifecycle (directory sync) manages its users.
    #[must_use]
    pub fn skip_offboarding(&self) -> bool {
        matches!(self, BackendType::Gitlab | BackendType::Rover)
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = ParseBackendTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fivetran" => Ok(BackendType::Fivetran),
            "gitlab" => Ok(BackendType::Gitlab),
            "snowflake" => Ok(BackendType::Snowflake),
            "rover" => Ok(BackendType::Rover),
            _ => Err(ParseBackendTypeError(s.to_string())),
        }
    }
}

/// Error parsing a backend type from string.
#[derive(Debug, Clone)]
pub struct ParseBackendTypeError(String);

impl fmt::Display for ParseBackendTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid backend type '{}', expected one of: fivetran, gitlab, snowflake, rover",
            self.0
        )
    }
}

impl std::error::Error for ParseBackendTypeError {}
