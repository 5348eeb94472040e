//! GitLab backend adapter.
//!
//! Teams are subgroups under a configured parent group. The adapter has
//! two modes:
//!
//! - **Direct mode**: usernaut creates users and manages subgroup
//!   membership itself.
//! - **LDAP-sync mode** (per reconcile, per group): the corporate
//!   directory provisions accounts and drives membership. User
//!   creation/deletion is suppressed, team creation binds the subgroup
//!   to an LDAP CN and triggers a directory sync, and the engine skips
//!   membership calls entirely.
//!
//! Team deletion is two-phase: a soft delete, a bounded poll until the
//! group reports `marked_for_deletion_on` (capturing its full path), and
//! a hard delete with `permanently_remove`.

mod client;
mod teams;
mod users;

pub use client::GitlabConnector;

/// Developer access level on groups and shared projects.
pub const DEVELOPER_ACCESS_LEVEL: u32 = 30;
