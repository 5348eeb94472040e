//! The declarative `Group` resource.
//!
//! A Group names a set of users (directly or via nested groups) and the
//! backends to project them into. The resource lives in the orchestrator;
//! the engine observes it through a resource client and writes back
//! status. The shapes here mirror the orchestrator's resource model
//! (metadata with generation, finalizers, owner references, deletion
//! timestamp) without depending on any orchestrator crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::BackendRef;

/// The single condition type the engine manages.
pub const CONDITION_READY: &str = "Ready";

/// Desired state: who belongs to the group and where it is projected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub group_name: String,
    #[serde(default)]
    pub members: GroupMembers,
    #[serde(default)]
    pub backends: Vec<BackendRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_params: Vec<GroupParam>,
}

/// Direct members plus references to other groups in the same namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembers {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// A backend-scoped parameter, e.g. `project_access_paths` on git hosting.
///
/// `backend` is the backend *type* and `name` the backend instance name,
/// matching the declaration order in the resource schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupParam {
    pub backend: String,
    pub name: String,
    pub property: String,
    #[serde(default)]
    pub value: Vec<String>,
}

/// Observed state written back by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStatus {
    #[serde(default)]
    pub reconciled_users: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub backends_status: Vec<BackendStatus>,
}

/// Per-backend reconcile outcome surfaced to the resource author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub status: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// A standard status condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False", or "Unknown".
    pub status: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default)]
    pub observed_generation: i64,
}

/// Owner reference to another resource, used for orchestrator cascade of
/// nested groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default)]
    pub block_owner_deletion: bool,
}

/// Resource envelope metadata as delivered by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub generation: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

/// A full Group resource: metadata, spec, status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupResource {
    pub metadata: ResourceMeta,
    pub spec: GroupSpec,
    #[serde(default)]
    pub status: GroupStatus,
}

impl GroupResource {
    /// Whether the resource carries a deletion timestamp.
    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata.finalizers.iter().any(|f| f == finalizer)
    }

    /// Append the finalizer if missing. Returns true when the resource
    /// changed and needs to be persisted.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.metadata.finalizers.push(finalizer.to_string());
        true
    }

    /// Remove the finalizer. Returns true when the resource changed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.metadata.finalizers.len();
        self.metadata.finalizers.retain(|f| f != finalizer);
        self.metadata.finalizers.len() != before
    }

    /// Mark the group as waiting for reconciliation.
    pub fn set_waiting(&mut self) {
        self.upsert_condition(Condition {
            type_: CONDITION_READY.to_string(),
            status: "Unknown".to_string(),
            reason: "Waiting".to_string(),
            message: "Group reconciliation in progress".to_string(),
            last_transition_time: Utc::now(),
            observed_generation: self.metadata.generation,
        });
    }

    /// Mark the group Ready=True or Ready=False after a reconcile pass.
    pub fn set_ready(&mut self, ready: bool) {
        let (status, reason, message) = if ready {
            ("True", "Reconciled", "All backends reconciled successfully")
        } else {
            ("False", "BackendErrors", "One or more backends failed to reconcile")
        };
        self.upsert_condition(Condition {
            type_: CONDITION_READY.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: Utc::now(),
            observed_generation: self.metadata.generation,
        });
    }

    /// Mark the group non-configurable: no transformer rule matched any of
    /// its declared backends. Terminal for this generation.
    pub fn set_non_configurable(&mut self, message: impl Into<String>) {
        self.upsert_condition(Condition {
            type_: CONDITION_READY.to_string(),
            status: "False".to_string(),
            reason: "NonConfigurable".to_string(),
            message: message.into(),
            last_transition_time: Utc::now(),
            observed_generation: self.metadata.generation,
        });
    }

    /// Replace the condition of the same type, or append it.
    pub fn upsert_condition(&mut self, condition: Condition) {
        if let Some(existing) = self
            .status
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            *existing = condition;
        } else {
            self.status.conditions.push(condition);
        }
    }

    /// The current Ready condition, if any.
    #[must_use]
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.status
            .conditions
            .iter()
            .find(|c| c.type_ == CONDITION_READY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(name: &str) -> GroupResource {
        GroupResource {
            metadata: ResourceMeta {
                name: name.to_string(),
                namespace: "usernaut".to_string(),
                generation: 3,
                ..Default::default()
            },
            spec: GroupSpec {
                group_name: name.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_finalizer_add_remove() {
        let mut group = resource("g1");
        assert!(group.add_finalizer("example.com/finalizer"));
        assert!(!group.add_finalizer("example.com/finalizer"));
        assert!(group.has_finalizer("example.com/finalizer"));
        assert!(group.remove_finalizer("example.com/finalizer"));
        assert!(!group.remove_finalizer("example.com/finalizer"));
    }

    #[test]
    fn test_condition_upsert_replaces_same_type() {
        let mut group = resource("g1");
        group.set_waiting();
        group.set_ready(true);
        assert_eq!(group.status.conditions.len(), 1);

        let ready = group.ready_condition().unwrap();
        assert_eq!(ready.status, "True");
        assert_eq!(ready.reason, "Reconciled");
        assert_eq!(ready.observed_generation, 3);
    }

    #[test]
    fn test_non_configurable_condition() {
        let mut group = resource("no-rules-match");
        group.set_non_configurable("no matching patterns found in backend configuration");
        let ready = group.ready_condition().unwrap();
        assert_eq!(ready.status, "False");
        assert_eq!(ready.reason, "NonConfigurable");
    }

    #[test]
    fn test_ready_false_on_backend_errors() {
        let mut group = resource("g1");
        group.set_ready(false);
        let ready = group.ready_condition().unwrap();
        assert_eq!(ready.status, "False");
        assert_eq!(ready.reason, "BackendErrors");
    }

    #[test]
    fn test_spec_deserialization() {
        let json = serde_json::json!({
            "metadata": {"name": "g1", "namespace": "usernaut"},
            "spec": {
                "group_name": "g1",
                "members": {"users": ["alice"], "groups": ["g2"]},
                "backends": [{"name": "ftA", "type": "fivetran"}],
                "group_params": [{
                    "backend": "gitlab",
                    "name": "git-main",
                    "property": "project_access_paths",
                    "value": ["data/pipelines"]
                }]
            }
        });
        let group: GroupResource = serde_json::from_value(json).unwrap();
        assert_eq!(group.spec.members.users, vec!["alice"]);
        assert_eq!(group.spec.backends[0].backend_key(), "ftA_fivetran");
        assert_eq!(group.spec.group_params[0].property, "project_access_paths");
    }
}
