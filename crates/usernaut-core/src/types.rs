//! Users, teams, and backend references.
//!
//! These are the shapes exchanged with backend adapters and stored in the
//! cache. All identifiers are strings: backends variously hand out numeric
//! ids, usernames, or names-as-ids, and the engine never interprets them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A user as represented across backends.
///
/// `email` is the canonical identity throughout the store layer; `id` is
/// whatever the owning backend assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
}

/// A team (group, role, subgroup - whatever the backend calls it).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default, skip_serializing_if = "TeamParams::is_empty")]
    pub team_params: TeamParams,
}

/// Backend-specific parameters attached to a team at creation time.
///
/// Currently only `project_access_paths` on the git-hosting backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamParams {
    #[serde(default)]
    pub property: String,
    #[serde(default)]
    pub value: Vec<String>,
}

impl TeamParams {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.property.is_empty() && self.value.is_empty()
    }
}

/// Reference to one backend instance: a `(name, type)` pair.
///
/// Distinct instances of the same backend type coexist (e.g. two fivetran
/// accounts), so the composite key is always `name + "_" + type`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendRef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
}

impl BackendRef {
    #[must_use]
    pub fn new(name: impl Into<String>, type_: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_: type_.into(),
        }
    }

    /// The composite key used throughout the cache: `"{name}_{type}"`.
    #[must_use]
    pub fn backend_key(&self) -> String {
        format!("{}_{}", self.name, self.type_)
    }
}

impl fmt::Display for BackendRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.name)
    }
}

/// Error splitting a backend key back into `(name, type)`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid backend key '{0}', expected '<name>_<type>'")]
pub struct ParseBackendKeyError(pub String);

/// Split a composite backend key into `(name, type)`.
///
/// The type is the segment after the last underscore, so backend names may
/// themselves contain underscores.
pub fn parse_backend_key(key: &str) -> Result<(String, String), ParseBackendKeyError> {
    match key.rsplit_once('_') {
        Some((name, type_)) if !name.is_empty() && !type_.is_empty() => {
            Ok((name.to_string(), type_.to_string()))
        }
        _ => Err(ParseBackendKeyError(key.to_string())),
    }
}
