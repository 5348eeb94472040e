//! Capability traits for backend adapters.

use std::collections::HashMap;

use async_trait::async_trait;
use usernaut_core::{Team, User};

use crate::error::ConnectorResult;
use crate::types::BackendType;

/// User lifecycle operations.
#[async_trait]
pub trait UserOps {
    /// All users in the backend, as two maps keyed by backend user id and
    /// by email. Pagination is handled internally; implementations either
    /// return a stable snapshot or tolerate interleaved inserts.
    async fn fetch_all_users(
        &self,
    ) -> ConnectorResult<(HashMap<String, User>, HashMap<String, User>)>;

    /// One user by backend id. The id may be numeric or a username,
    /// depending on the backend. Unknown ids yield `NotFound`.
    async fn fetch_user_details(&self, user_id: &str) -> ConnectorResult<User>;

    /// Create a user. Idempotent on conflict: a 409 response makes the
    /// adapter fetch and return the existing user.
    async fn create_user(&self, user: &User) -> ConnectorResult<User>;

    /// Delete a user. Idempotent: an already-gone user is success.
    async fn delete_user(&self, user_id: &str) -> ConnectorResult<()>;
}

/// Team lifecycle operations.
#[async_trait]
pub trait TeamOps {
    /// All teams, keyed by the backend's own team name.
    async fn fetch_all_teams(&self) -> ConnectorResult<HashMap<String, Team>>;

    async fn fetch_team_details(&self, team_id: &str) -> ConnectorResult<Team>;

    /// Create a team, honoring `team_params` where the backend supports
    /// them.
    async fn create_team(&self, team: &Team) -> ConnectorResult<Team>;

    /// Delete a team. May be multi-phase internally (soft delete, poll,
    /// hard delete); an already-gone team is success.
    async fn delete_team_by_id(&self, team_id: &str) -> ConnectorResult<()>;
}

/// Team membership operations.
#[async_trait]
pub trait MembershipOps {
    /// Current team members, keyed by backend user id.
    async fn fetch_team_members_by_team_id(
        &self,
        team_id: &str,
    ) -> ConnectorResult<HashMap<String, User>>;

    /// Add users (by backend id) to a team. Batch-capable.
    async fn add_users_to_team(&self, team_id: &str, user_ids: &[String]) -> ConnectorResult<()>;

    /// Remove users (by backend id) from a team. Batch-capable.
    async fn remove_users_from_team(
        &self,
        team_id: &str,
        user_ids: &[String],
    ) -> ConnectorResult<()>;
}

/// Optional capability: directory-driven membership.
///
/// When enabled for a group, the adapter (a) suppresses user
/// creation/deletion (the directory provisions accounts), (b) binds new
/// teams to a directory CN and triggers a sync, and (c) expects the
/// engine to skip membership add/remove calls.
pub trait LdapSyncOps {
    /// Flip the adapter into LDAP-sync mode for the given logical group.
    fn enable_ldap_sync(&mut self, group_name: &str);

    fn ldap_sync_enabled(&self) -> bool;
}

/// The full backend adapter contract.
#[async_trait]
pub trait Connector: UserOps + TeamOps + MembershipOps + Send + Sync {
    fn backend_type(&self) -> BackendType;

    /// Human-readable identifier for logs and status messages.
    fn display_name(&self) -> &str;

    /// Feature-detect the LDAP-sync capability. Default: unsupported.
    fn as_ldap_sync_mut(&mut self) -> Option<&mut dyn LdapSyncOps> {
        None
    }
}
