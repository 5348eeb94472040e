//! # Usernaut Core
//!
//! Shared domain types for the usernaut lifecycle manager.
//!
//! This crate defines the vocabulary every other usernaut crate speaks:
//! users and teams as the backends see them, backend references and their
//! composite keys, and the declarative `Group` resource (spec, status,
//! conditions) that drives reconciliation.
//!
//! ## Crate Organization
//!
//! - [`types`] - `User`, `Team`, `TeamParams`, `BackendRef`, backend keys
//! - [`group`] - the `Group` resource: spec, status, conditions, metadata

pub mod group;
pub mod types;

pub use group::{
    BackendStatus, Condition, GroupMembers, GroupParam, GroupResource, GroupSpec, GroupStatus,
    OwnerReference, ResourceMeta, CONDITION_READY,
};
pub use types::{parse_backend_key, BackendRef, ParseBackendKeyError, Team, TeamParams, User};
