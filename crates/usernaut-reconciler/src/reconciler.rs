//! The per-Group convergence algorithm.
//!
//! One reconcile pass takes a Group resource from declared members to
//! converged backend state:
//!
//! 1. finalizer and owner-reference bookkeeping, status `Waiting`
//! 2. configurability gate (at least one backend's name rules match)
//! 3. recursive member expansion with per-path cycle detection
//! 4. under the exclusive cache lock: LDAP resolution, per-backend
//!    team/user/membership convergence, and - only if every backend
//!    succeeded - the all-or-nothing reverse-index update
//! 5. force-reconcile label removal, composite status
//!
//! Per-backend failures are isolated: one backend's error never aborts
//! the others, but any error suppresses the index update and marks the
//! resource `Ready=False` so the dispatcher re-queues it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use usernaut_connector::{BoxedConnector, ConnectorRegistry};
use usernaut_core::{BackendRef, BackendStatus, GroupResource, OwnerReference, TeamParams, User};
use usernaut_ldap::{LdapResolver, LdapUser};
use usernaut_store::{Store, StoreError};

use crate::resource::{GroupResourceClient, ReconcileRequest, ResourceError};
use crate::transform::TransformRules;
use crate::CacheMutex;

/// Finalizer token guarding backend cleanup.
pub const GROUP_FINALIZER: &str = "operator.dataverse.redhat.com/finalizer";

/// Default label whose addition forces an extra reconcile.
pub const DEFAULT_FORCE_RECONCILE_LABEL: &str = "usernaut.dev/force-reconcile";

/// API version stamped on Group owner references.
const GROUP_API_VERSION: &str = "usernaut.dev/v1alpha1";

/// Error terminating a reconcile pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("error expanding members of group '{group}': {message}")]
    Expansion { group: String, message: String },

    /// At least one backend failed; the dispatcher re-queues the request.
    #[error("failed to reconcile all backends for group '{group}'")]
    BackendsFailed { group: String },
}

/// Errors collected per backend, keyed by `(type, name)`.
type BackendErrors = BTreeMap<(String, String), String>;

/// Resolved LDAP records for one reconcile, keyed by username.
type LdapUserData = HashMap<String, LdapUser>;

/// The convergence engine.
pub struct GroupReconciler {
    resources: Arc<dyn GroupResourceClient>,
    store: Arc<Store>,
    cache_mutex: CacheMutex,
    ldap: Arc<dyn LdapResolver>,
    registry: Arc<ConnectorRegistry>,
    transforms: Arc<TransformRules>,
    force_reconcile_label: String,
}

impl GroupReconciler {
    pub fn new(
        resources: Arc<dyn GroupResourceClient>,
        store: Arc<Store>,
        cache_mutex: CacheMutex,
        ldap: Arc<dyn LdapResolver>,
        registry: Arc<ConnectorRegistry>,
        transforms: Arc<TransformRules>,
    ) -> Self {
        Self {
            resources,
            store,
            cache_mutex,
            ldap,
            registry,
            transforms,
            force_reconcile_label: DEFAULT_FORCE_RECONCILE_LABEL.to_string(),
        }
    }

    /// Override the force-reconcile label name from configuration.
    #[must_use]
    pub fn with_force_reconcile_label(mut self, label: impl Into<String>) -> Self {
        self.force_reconcile_label = label.into();
        self
    }

    /// Run one reconcile pass for a namespaced Group resource.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<(), ReconcileError> {
        let Some(mut group) = self.resources.get(&request.namespace, &request.name).await? else {
            debug!(request = %request, "group resource not found, nothing to do");
            return Ok(());
        };

        if group.is_being_deleted() {
            return self.finalize(&mut group).await;
        }

        if group.add_finalizer(GROUP_FINALIZER) {
            self.resources.update(&group).await?;
        }

        self.set_owner_references(&mut group).await?;

        group.set_waiting();
        self.resources.update_status(&group).await?;

        let group_name = group.spec.group_name.clone();
        info!(
            group = %group_name,
            members = group.spec.members.users.len(),
            nested_groups = ?group.spec.members.groups,
            "reconciling group"
        );

        if !self.is_group_configurable(&group) {
            warn!(group = %group_name, "group is not configurable, no matching patterns for its backends");
            group.status.reconciled_users = Vec::new();
            group.set_non_configurable(
                "Group is not configurable - no matching patterns found in backend configuration",
            );
            self.resources.update_status(&group).await?;
            return Ok(());
        }

        let mut visited = HashSet::new();
        let all_members = self
            .fetch_unique_group_members(&group.metadata.namespace, request.name.clone(), &mut visited)
            .await?;
        let unique_members = deduplicate(all_members);
        group.status.reconciled_users = unique_members.clone();

        // Everything from LDAP resolution through the index update runs
        // under the exclusive cache lock: concurrent reconciles may touch
        // the same users and teams, and the composite store entries need
        // read-modify-write consistency.
        let backend_errors = {
            let _guard = self.cache_mutex.write().await;
            debug!(group = %group_name, "acquired cache lock for reconciliation");

            let (ldap_data, current_members) = self.fetch_ldap_data(&unique_members).await;

            let backend_errors = self
                .process_all_backends(&group, &unique_members, &ldap_data)
                .await;

            if backend_errors.is_empty() {
                if let Err(err) = self
                    .update_cache_indexes(&group_name, &current_members)
                    .await
                {
                    // Index errors are logged but not fatal; the next
                    // reconcile converges them.
                    warn!(group = %group_name, error = %err, "error updating cache indexes");
                }
            } else {
                warn!(
                    group = %group_name,
                    failed_backends = backend_errors.len(),
                    "backend errors detected, skipping cache index updates"
                );
            }

            backend_errors
        };

        self.remove_force_reconcile_label(&mut group).await?;

        self.update_status(&mut group, &backend_errors).await?;

        if backend_errors.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::BackendsFailed { group: group_name })
        }
    }

    /// A group is configurable when at least one declared backend has a
    /// matching name-transformation rule.
    fn is_group_configurable(&self, group: &GroupResource) -> bool {
        !group.spec.backends.is_empty()
            && group.spec.backends.iter().any(|backend| {
                self.transforms
                    .transform(&backend.type_, &group.spec.group_name)
                    .is_ok()
            })
    }

    /// Depth-first expansion of nested groups. `visited` tracks only the
    /// current path: revisiting a group on a different branch (a diamond)
    /// is legitimate, revisiting on the same path is a cycle and yields
    /// an empty member set for that sub-tree.
    fn fetch_unique_group_members<'a>(
        &'a self,
        namespace: &'a str,
        group_name: String,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<Vec<String>, ReconcileError>> {
        async move {
            if visited.contains(&group_name) {
                warn!(group = %group_name, "cyclic group dependency detected, returning empty member list");
                return Ok(Vec::new());
            }
            visited.insert(group_name.clone());

            let result = async {
                let Some(group) = self.resources.get(namespace, &group_name).await? else {
                    return Err(ReconcileError::Expansion {
                        group: group_name.clone(),
                        message: "referenced group does not exist".to_string(),
                    });
                };

                let mut members = group.spec.members.users.clone();
                for nested in &group.spec.members.groups {
                    let nested_members = self
                        .fetch_unique_group_members(namespace, nested.clone(), visited)
                        .await?;
                    members.extend(nested_members);
                }
                Ok(members)
            }
            .await;

            visited.remove(&group_name);
            result
        }
        .boxed()
    }

    /// Resolve each member against LDAP. Users that do not resolve are
    /// dropped from this reconcile (logged); no cache index is touched
    /// here. Returns the resolved records and the member emails.
    async fn fetch_ldap_data(&self, members: &[String]) -> (LdapUserData, Vec<String>) {
        let mut ldap_data = LdapUserData::with_capacity(members.len());
        let mut current_members = Vec::with_capacity(members.len());

        for username in members {
            match self.ldap.get_by_username(username).await {
                Ok(user) => {
                    current_members.push(user.email().to_string());
                    ldap_data.insert(username.clone(), user);
                }
                Err(err) => {
                    warn!(user = %username, error = %err, "error fetching user data from LDAP, skipping");
                }
            }
        }

        (ldap_data, current_members)
    }

    /// Validate group params and process every declared backend in spec
    /// order. A backend with an invalid param is recorded as failed and
    /// never attempted.
    async fn process_all_backends(
        &self,
        group: &GroupResource,
        members: &[String],
        ldap_data: &LdapUserData,
    ) -> BackendErrors {
        let mut backend_errors = BackendErrors::new();
        let mut params_by_backend: HashMap<String, TeamParams> = HashMap::new();

        let declared: HashSet<String> = group
            .spec
            .backends
            .iter()
            .map(BackendRef::backend_key)
            .collect();

        for param in &group.spec.group_params {
            let backend_key = format!("{}_{}", param.name, param.backend);
            if !declared.contains(&backend_key) {
                backend_errors.insert(
                    (param.backend.clone(), param.name.clone()),
                    format!(
                        "group param refers to non-existent backend: {}/{}",
                        param.backend, param.name
                    ),
                );
                continue;
            }
            if param.property.is_empty() {
                backend_errors.insert(
                    (param.backend.clone(), param.name.clone()),
                    format!(
                        "group param property is empty for backend: {}/{}",
                        param.backend, param.name
                    ),
                );
                continue;
            }
            params_by_backend.insert(
                backend_key,
                TeamParams {
                    property: param.property.clone(),
                    value: param.value.clone(),
                },
            );
        }

        for backend in &group.spec.backends {
            let key = (backend.type_.clone(), backend.name.clone());
            if backend_errors.contains_key(&key) {
                continue;
            }

            let team_params = params_by_backend
                .get(&backend.backend_key())
                .cloned()
                .unwrap_or_default();

            if let Err(message) = self
                .process_single_backend(group, backend, members, ldap_data, team_params)
                .await
            {
                warn!(
                    group = %group.spec.group_name,
                    backend = %backend.name,
                    backend_type = %backend.type_,
                    error = %message,
                    "error processing backend"
                );
                backend_errors.insert(key, message);
            }
        }

        backend_errors
    }

    async fn process_single_backend(
        &self,
        group: &GroupResource,
        backend: &BackendRef,
        members: &[String],
        ldap_data: &LdapUserData,
        team_params: TeamParams,
    ) -> Result<(), String> {
        let group_name = &group.spec.group_name;
        let backend_key = backend.backend_key();

        let mut connector = self
            .registry
            .create(&backend.name, &backend.type_)
            .map_err(|err| err.to_string())?;

        let is_ldap_sync = self
            .setup_ldap_sync(&mut connector, group, backend)
            .await?;

        let team_id = self
            .fetch_or_create_team(group_name, connector.as_ref(), backend, team_params)
            .await?;
        info!(backend = %backend_key, team_id = %team_id, "fetched or created team");

        self.create_users_in_backend_and_cache(members, &backend_key, connector.as_ref(), ldap_data)
            .await?;

        let existing = connector
            .fetch_team_members_by_team_id(&team_id)
            .await
            .map_err(|err| err.to_string())?;
        debug!(backend = %backend_key, team_members = existing.len(), "fetched team members");

        let (to_add, to_remove) = self
            .compute_membership_delta(members, &existing, &backend_key, ldap_data)
            .await?;

        if is_ldap_sync {
            // Membership is driven by the directory sync.
            return Ok(());
        }

        if !to_add.is_empty() {
            connector
                .add_users_to_team(&team_id, &to_add)
                .await
                .map_err(|err| err.to_string())?;
            info!(backend = %backend_key, users_added = to_add.len(), "added users to team");
        }
        if !to_remove.is_empty() {
            connector
                .remove_users_from_team(&team_id, &to_remove)
                .await
                .map_err(|err| err.to_string())?;
            info!(backend = %backend_key, users_removed = to_remove.len(), "removed users from team");
        }

        Ok(())
    }

    /// Flip the adapter into LDAP-sync mode when it supports it and all
    /// dependency checks pass. Returns whether the mode is active.
    async fn setup_ldap_sync(
        &self,
        connector: &mut BoxedConnector,
        group: &GroupResource,
        backend: &BackendRef,
    ) -> Result<bool, String> {
        if connector.as_ldap_sync_mut().is_none() {
            return Ok(false);
        }

        let settings = self
            .registry
            .settings(&backend.name, &backend.type_)
            .ok_or_else(|| format!("backend {} not found in configuration", backend))?;

        let Some(depends_on) = settings.depends_on.clone() else {
            debug!(backend = %backend.name, "no directory dependant configured, ldap sync not set up");
            return Ok(false);
        };

        let dep_settings = self
            .registry
            .settings(&depends_on.name, &depends_on.type_)
            .ok_or_else(|| {
                format!(
                    "ldap dependant {} not found in backend configuration",
                    depends_on
                )
            })?;
        if !dep_settings.enabled {
            return Err(format!("{} is not enabled", depends_on));
        }

        if !group.spec.backends.iter().any(|declared| {
            declared.name == depends_on.name && declared.type_ == depends_on.type_
        }) {
            return Err(format!(
                "ldap dependant for {} backend doesn't exist in the group resource",
                backend.type_
            ));
        }

        self.ldap_dependant_in_cache(&group.spec.group_name, &depends_on)
            .await?;

        if let Some(sync) = connector.as_ldap_sync_mut() {
            sync.enable_ldap_sync(&group.spec.group_name);
        }
        info!(backend = %backend.name, "ldap sync set up");
        Ok(true)
    }

    /// The dependent backend must already be reflected in the cache -
    /// either promoted into the group store or still in the team preload
    /// under its transformed name.
    async fn ldap_dependant_in_cache(
        &self,
        group_name: &str,
        depends_on: &BackendRef,
    ) -> Result<(), String> {
        let in_group_store = self
            .store
            .group
            .backend_exists(group_name, &depends_on.name, &depends_on.type_)
            .await
            .map_err(|err| err.to_string())?;
        if in_group_store {
            return Ok(());
        }

        let transformed = self
            .transforms
            .transform(&depends_on.type_, group_name)
            .map_err(|err| err.to_string())?;
        let team_backends = self
            .store
            .team
            .get_backends(&transformed)
            .await
            .map_err(|err| err.to_string())?;
        if team_backends.contains_key(&depends_on.backend_key()) {
            return Ok(());
        }

        Err(format!(
            "dependent backend {} not found in cache for group {}",
            depends_on.backend_key(),
            group_name
        ))
    }

    /// Team lookup order: group store, team preload (one-way promotion),
    /// then creation in the backend.
    async fn fetch_or_create_team(
        &self,
        group_name: &str,
        connector: &dyn usernaut_connector::Connector,
        backend: &BackendRef,
        team_params: TeamParams,
    ) -> Result<String, String> {
        let transformed = self
            .transforms
            .transform(&backend.type_, group_name)
            .map_err(|err| err.to_string())?;
        let backend_key = backend.backend_key();

        if let Some(team_id) = self
            .store
            .group
            .get_backend_id(group_name, &backend.name, &backend.type_)
            .await
            .map_err(|err| err.to_string())?
        {
            debug!(team_id = %team_id, "team found in group store");
            return Ok(team_id);
        }

        let preloaded = self
            .store
            .team
            .get_backends(&transformed)
            .await
            .map_err(|err| err.to_string())?;
        if let Some(team_id) = preloaded.get(&backend_key) {
            info!(team_id = %team_id, "team found in preload store, promoting to group store");
            self.store
                .group
                .set_backend(group_name, &backend.name, &backend.type_, team_id)
                .await
                .map_err(|err| err.to_string())?;
            return Ok(team_id.clone());
        }

        info!(team = %transformed, "team not found in cache, creating in backend");
        let team = connector
            .create_team(&usernaut_core::Team {
                name: transformed,
                description: format!("team for {group_name}"),
                team_params,
                ..Default::default()
            })
            .await
            .map_err(|err| err.to_string())?;

        self.store
            .group
            .set_backend(group_name, &backend.name, &backend.type_, &team.id)
            .await
            .map_err(|err| err.to_string())?;

        Ok(team.id)
    }

    /// Ensure every resolved member has a backend account and a cached
    /// backend-id mapping. Members unresolved in LDAP are skipped here
    /// (they are still considered for removal in the delta step).
    async fn create_users_in_backend_and_cache(
        &self,
        members: &[String],
        backend_key: &str,
        connector: &dyn usernaut_connector::Connector,
        ldap_data: &LdapUserData,
    ) -> Result<(), String> {
        for username in members {
            let Some(ldap_user) = ldap_data.get(username) else {
                warn!(user = %username, "user not found in LDAP data, skipping user creation");
                continue;
            };
            let email = ldap_user.email();

            let user_backends = self
                .store
                .user
                .get_backends(email)
                .await
                .map_err(|err| err.to_string())?;
            if user_backends
                .get(backend_key)
                .is_some_and(|id| !id.is_empty())
            {
                continue;
            }

            let created = connector
                .create_user(&User {
                    email: email.to_string(),
                    user_name: username.clone(),
                    first_name: ldap_user.display_name().to_string(),
                    last_name: ldap_user.sn().to_string(),
                    display_name: ldap_user.cn().to_string(),
                    ..Default::default()
                })
                .await
                .map_err(|err| err.to_string())?;
            info!(user = %username, backend = %backend_key, "created user in backend");

            self.store
                .user
                .set_backend(email, backend_key, &created.id)
                .await
                .map_err(|err| err.to_string())?;
        }
        Ok(())
    }

    /// Compute the membership delta against the backend's current view.
    /// Unresolved members whose id is already in the team are forced into
    /// the removal set (ghost cleanup).
    async fn compute_membership_delta(
        &self,
        members: &[String],
        existing: &HashMap<String, User>,
        backend_key: &str,
        ldap_data: &LdapUserData,
    ) -> Result<(Vec<String>, Vec<String>), String> {
        let mut ids_to_sync = Vec::new();

        for username in members {
            let Some(ldap_user) = ldap_data.get(username) else {
                // Unresolved members never enter ids_to_sync, so any team
                // entry they left behind falls into the removal sweep
                // below (ghost cleanup).
                continue;
            };

            let user_backends = self
                .store
                .user
                .get_backends(ldap_user.email())
                .await
                .map_err(|err| err.to_string())?;
            match user_backends.get(backend_key) {
                Some(id) if !id.is_empty() => ids_to_sync.push(id.clone()),
                _ => {
                    return Err(format!(
                        "user ID for '{username}' not found in cache after creation"
                    ));
                }
            }
        }

        let mut to_remove = Vec::new();
        for existing_id in existing.keys() {
            if !ids_to_sync.iter().any(|id| id == existing_id) {
                to_remove.push(existing_id.clone());
            }
        }

        let to_add = ids_to_sync
            .into_iter()
            .filter(|id| !existing.contains_key(id))
            .collect();

        Ok((to_add, to_remove))
    }

    /// The all-or-nothing index update: reverse index first, then the
    /// consolidated member list. Sub-step failures are collected and
    /// reported but do not abort the remaining sub-steps.
    async fn update_cache_indexes(
        &self,
        group_name: &str,
        current_members: &[String],
    ) -> Result<(), String> {
        let mut errors = Vec::new();

        let previous_members = match self.store.group.get_members(group_name).await {
            Ok(members) => members,
            Err(err) => {
                warn!(group = %group_name, error = %err, "error fetching previous group members, assuming empty");
                Vec::new()
            }
        };

        let current_set: HashSet<&String> = current_members.iter().collect();

        for email in current_members {
            if let Err(err) = self.store.user_groups.add_group(email, group_name).await {
                errors.push(format!("failed to add group {group_name} to user {email}: {err}"));
            }
        }

        for email in &previous_members {
            if !current_set.contains(email) {
                info!(user = %email, group = %group_name, "removing group from user's group list");
                if let Err(err) = self.store.user_groups.remove_group(email, group_name).await {
                    errors.push(format!(
                        "failed to remove group {group_name} from user {email}: {err}"
                    ));
                }
            }
        }

        if let Err(err) = self
            .store
            .group
            .set_members(group_name, current_members.to_vec())
            .await
        {
            return Err(format!("failed to update group members for {group_name}: {err}"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "cache index update completed with {} errors: {}",
                errors.len(),
                errors.join("; ")
            ))
        }
    }

    async fn remove_force_reconcile_label(
        &self,
        group: &mut GroupResource,
    ) -> Result<(), ReconcileError> {
        if group
            .metadata
            .labels
            .remove(&self.force_reconcile_label)
            .is_some()
        {
            self.resources.update(group).await?;
        }
        Ok(())
    }

    async fn update_status(
        &self,
        group: &mut GroupResource,
        backend_errors: &BackendErrors,
    ) -> Result<(), ReconcileError> {
        let mut backends_status = Vec::with_capacity(group.spec.backends.len());
        for backend in &group.spec.backends {
            let key = (backend.type_.clone(), backend.name.clone());
            let status = match backend_errors.get(&key) {
                Some(message) => BackendStatus {
                    name: backend.name.clone(),
                    type_: backend.type_.clone(),
                    status: false,
                    message: message.clone(),
                },
                None => BackendStatus {
                    name: backend.name.clone(),
                    type_: backend.type_.clone(),
                    status: true,
                    message: "Successful".to_string(),
                },
            };
            backends_status.push(status);
        }

        group.status.backends_status = backends_status;
        group.set_ready(backend_errors.is_empty());
        self.resources.update_status(group).await?;
        Ok(())
    }

    /// Owner references mirror the nested-group edges so the
    /// orchestrator can cascade deletes.
    async fn set_owner_references(&self, group: &mut GroupResource) -> Result<(), ReconcileError> {
        let mut desired: HashMap<String, OwnerReference> = HashMap::new();
        for parent_name in &group.spec.members.groups {
            let Some(parent) = self
                .resources
                .get(&group.metadata.namespace, parent_name)
                .await?
            else {
                return Err(ReconcileError::Expansion {
                    group: group.spec.group_name.clone(),
                    message: format!("referenced group '{parent_name}' does not exist"),
                });
            };
            desired.insert(
                parent.metadata.uid.clone(),
                OwnerReference {
                    api_version: GROUP_API_VERSION.to_string(),
                    kind: "Group".to_string(),
                    name: parent.metadata.name.clone(),
                    uid: parent.metadata.uid.clone(),
                    block_owner_deletion: true,
                },
            );
        }

        let existing_group_refs: HashSet<String> = group
            .metadata
            .owner_references
            .iter()
            .filter(|r| r.kind == "Group" && r.api_version == GROUP_API_VERSION)
            .map(|r| r.uid.clone())
            .collect();

        let needs_update = desired.len() != existing_group_refs.len()
            || desired.keys().any(|uid| !existing_group_refs.contains(uid));
        if !needs_update {
            return Ok(());
        }

        let mut refs: Vec<OwnerReference> = group
            .metadata
            .owner_references
            .iter()
            .filter(|r| !(r.kind == "Group" && r.api_version == GROUP_API_VERSION))
            .cloned()
            .collect();
        let mut group_refs: Vec<OwnerReference> = desired.into_values().collect();
        group_refs.sort_by(|a, b| a.name.cmp(&b.name));
        refs.extend(group_refs);

        group.metadata.owner_references = refs;
        self.resources.update(group).await?;
        Ok(())
    }

    /// Deletion path: best-effort cleanup, finalizer removed regardless.
    async fn finalize(&self, group: &mut GroupResource) -> Result<(), ReconcileError> {
        if !group.has_finalizer(GROUP_FINALIZER) {
            return Ok(());
        }

        let group_name = group.spec.group_name.clone();
        info!(group = %group_name, "finalizer: starting backend team deletion cleanup");

        {
            let _guard = self.cache_mutex.write().await;

            self.cleanup_user_groups_index(&group_name).await;

            for backend in &group.spec.backends {
                self.delete_backend_team(&group_name, backend).await;
            }

            if let Err(err) = self.store.group.delete(&group_name).await {
                warn!(group = %group_name, error = %err, "finalizer: failed to delete group from cache");
            }
        }

        group.remove_finalizer(GROUP_FINALIZER);
        self.resources.update(group).await?;
        info!(group = %group_name, "finalizer: removed, deletion can proceed");
        Ok(())
    }

    async fn cleanup_user_groups_index(&self, group_name: &str) {
        let members = match self.store.group.get_members(group_name).await {
            Ok(members) => members,
            Err(err) => {
                warn!(group = %group_name, error = %err, "finalizer: error fetching group members for cleanup");
                return;
            }
        };

        for email in members {
            if let Err(err) = self.store.user_groups.remove_group(&email, group_name).await {
                warn!(
                    user = %email,
                    group = %group_name,
                    error = %err,
                    "finalizer: error removing group from user's groups index"
                );
            }
        }
    }

    async fn delete_backend_team(&self, group_name: &str, backend: &BackendRef) {
        // Graceful transform fallback: cleanup proceeds even when the
        // pattern no longer matches.
        let transformed = self
            .transforms
            .transform_or_fallback(&backend.type_, group_name);

        let connector = match self.registry.create(&backend.name, &backend.type_) {
            Ok(connector) => connector,
            Err(err) => {
                warn!(backend = %backend, error = %err, "finalizer: error creating backend client, skipping");
                return;
            }
        };

        match self
            .store
            .group
            .get_backend_id(group_name, &backend.name, &backend.type_)
            .await
        {
            Ok(Some(team_id)) => {
                info!(backend = %backend, team_id = %team_id, "finalizer: deleting team from backend");
                if let Err(err) = connector.delete_team_by_id(&team_id).await {
                    warn!(
                        backend = %backend,
                        team_id = %team_id,
                        error = %err,
                        "finalizer: failed to delete team, may already be gone"
                    );
                }
            }
            Ok(None) => {
                info!(backend = %backend, "finalizer: no team ID in cache, skipping backend deletion");
            }
            Err(err) => {
                warn!(backend = %backend, error = %err, "finalizer: error fetching team id from cache");
            }
        }

        if let Err(err) = self.store.team.delete(&transformed).await {
            warn!(team = %transformed, error = %err, "finalizer: failed to delete preload entry");
        }
    }
}

fn deduplicate(members: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    members
        .into_iter()
        .filter(|member| seen.insert(member.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    use usernaut_cache::InMemoryCache;
    use usernaut_connector::BackendType;
    use usernaut_core::{GroupMembers, GroupParam, GroupSpec, ResourceMeta};

    use crate::resource::InMemoryGroupClient;
    use crate::testing::{
        build_registry, new_backend_state, MockBackend, MockLdap, SharedBackendState,
    };
    use crate::transform::PatternRule;

    struct Fixture {
        resources: Arc<InMemoryGroupClient>,
        store: Arc<Store>,
        reconciler: GroupReconciler,
    }

    fn default_rules() -> TransformRules {
        let config = StdHashMap::from([
            (
                "fivetran".to_string(),
                vec![PatternRule {
                    input: "^(.*)$".to_string(),
                    output: "ft_$1".to_string(),
                }],
            ),
            (
                "gitlab".to_string(),
                vec![PatternRule {
                    input: "^(.*)$".to_string(),
                    output: "$1".to_string(),
                }],
            ),
            (
                "rover".to_string(),
                vec![PatternRule {
                    input: "^(.*)$".to_string(),
                    output: "$1-group".to_string(),
                }],
            ),
        ]);
        TransformRules::from_config(&config).unwrap()
    }

    fn fixture(backends: Vec<MockBackend>, ldap: MockLdap, rules: TransformRules) -> Fixture {
        let resources = Arc::new(InMemoryGroupClient::new());
        let store = Arc::new(Store::new(Arc::new(InMemoryCache::new())));
        let reconciler = GroupReconciler::new(
            Arc::clone(&resources) as Arc<dyn GroupResourceClient>,
            Arc::clone(&store),
            crate::new_cache_mutex(),
            Arc::new(ldap),
            Arc::new(build_registry(backends)),
            Arc::new(rules),
        );
        Fixture {
            resources,
            store,
            reconciler,
        }
    }

    fn group(name: &str, users: &[&str], groups: &[&str], backends: &[(&str, &str)]) -> GroupResource {
        GroupResource {
            metadata: ResourceMeta {
                name: name.to_string(),
                namespace: "usernaut".to_string(),
                uid: format!("uid-{name}"),
                generation: 1,
                ..Default::default()
            },
            spec: GroupSpec {
                group_name: name.to_string(),
                members: GroupMembers {
                    users: users.iter().map(ToString::to_string).collect(),
                    groups: groups.iter().map(ToString::to_string).collect(),
                },
                backends: backends
                    .iter()
                    .map(|(name, type_)| BackendRef::new(*name, *type_))
                    .collect(),
                group_params: Vec::new(),
            },
            ..Default::default()
        }
    }

    fn request(name: &str) -> ReconcileRequest {
        ReconcileRequest::new("usernaut", name)
    }

    fn mutating_calls(state: &SharedBackendState) -> Vec<String> {
        state.lock().unwrap().calls.clone()
    }

    #[tokio::test]
    async fn test_fresh_onboarding() {
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group("g1", &["alice"], &[], &[("ftA", "fivetran")]))
            .await;

        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        // Backend: team exists and alice is a member.
        {
            let state = ft_state.lock().unwrap();
            let team = state.teams_by_name.get("ft_g1").expect("team created");
            let members = state.members.get(&team.id).unwrap();
            assert_eq!(members.len(), 1);
            let user = state.users_by_email.get("alice@x").expect("user created");
            assert!(members.contains_key(&user.id));
        }

        // Store: user mapping, group record, reverse index.
        let user_backends = fixture.store.user.get_backends("alice@x").await.unwrap();
        assert!(!user_backends["ftA_fivetran"].is_empty());

        let data = fixture.store.group.get("g1").await.unwrap();
        assert_eq!(data.members, vec!["alice@x"]);
        assert!(data.backends.contains_key("ftA_fivetran"));

        let groups = fixture.store.user_groups.get_groups("alice@x").await.unwrap();
        assert_eq!(groups, vec!["g1"]);

        // Status: Ready=True, reconciled users recorded.
        let stored = fixture.resources.get("usernaut", "g1").await.unwrap().unwrap();
        assert_eq!(stored.ready_condition().unwrap().status, "True");
        assert_eq!(stored.status.reconciled_users, vec!["alice"]);
        assert!(stored.status.backends_status[0].status);
        assert!(stored.has_finalizer(GROUP_FINALIZER));
    }

    #[tokio::test]
    async fn test_nested_groups_with_cycle() {
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new()
                .with_user("alice", "alice@x")
                .with_user("bob", "bob@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group("g1", &["alice"], &["g2"], &[("ftA", "fivetran")]))
            .await;
        fixture
            .resources
            .apply(group("g2", &["bob"], &["g1"], &[("ftA", "fivetran")]))
            .await;

        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        let stored = fixture.resources.get("usernaut", "g1").await.unwrap().unwrap();
        assert_eq!(stored.status.reconciled_users, vec!["alice", "bob"]);

        let data = fixture.store.group.get("g1").await.unwrap();
        assert_eq!(data.members, vec!["alice@x", "bob@x"]);
    }

    #[tokio::test]
    async fn test_diamond_expansion_is_not_a_cycle() {
        // g1 -> {g2, g3}, both -> g4: g4's users appear once.
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("dana", "dana@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group("g1", &[], &["g2", "g3"], &[("ftA", "fivetran")]))
            .await;
        fixture.resources.apply(group("g2", &[], &["g4"], &[])).await;
        fixture.resources.apply(group("g3", &[], &["g4"], &[])).await;
        fixture.resources.apply(group("g4", &["dana"], &[], &[])).await;

        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        let stored = fixture.resources.get("usernaut", "g1").await.unwrap().unwrap();
        assert_eq!(stored.status.reconciled_users, vec!["dana"]);
    }

    #[tokio::test]
    async fn test_partial_backend_failure_is_all_or_nothing() {
        let ft_a = new_backend_state();
        let ft_b = new_backend_state();
        ft_b.lock().unwrap().fail_create_team = Some("500 internal error".to_string());

        let fixture = fixture(
            vec![
                MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_a)),
                MockBackend::new("ftB", BackendType::Fivetran, Arc::clone(&ft_b)),
            ],
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group(
                "g1",
                &["alice"],
                &[],
                &[("ftA", "fivetran"), ("ftB", "fivetran")],
            ))
            .await;

        let err = fixture.reconciler.reconcile(&request("g1")).await.unwrap_err();
        assert!(matches!(err, ReconcileError::BackendsFailed { .. }));

        // Per-user backend ids written by the succeeding backend persist.
        let user_backends = fixture.store.user.get_backends("alice@x").await.unwrap();
        assert!(user_backends.contains_key("ftA_fivetran"));

        // All-or-nothing: neither members nor the reverse index updated.
        let data = fixture.store.group.get("g1").await.unwrap();
        assert!(data.members.is_empty());
        assert!(fixture
            .store
            .user_groups
            .get_groups("alice@x")
            .await
            .unwrap()
            .is_empty());

        let stored = fixture.resources.get("usernaut", "g1").await.unwrap().unwrap();
        assert_eq!(stored.ready_condition().unwrap().status, "False");
        let statuses: StdHashMap<String, bool> = stored
            .status
            .backends_status
            .iter()
            .map(|s| (s.name.clone(), s.status))
            .collect();
        assert!(statuses["ftA"]);
        assert!(!statuses["ftB"]);
        let ftb_status = stored
            .status
            .backends_status
            .iter()
            .find(|s| s.name == "ftB")
            .unwrap();
        assert!(ftb_status.message.contains("500"));
    }

    #[tokio::test]
    async fn test_all_or_nothing_preserves_previous_members() {
        // A group that reconciled cleanly keeps its indexes when a later
        // reconcile fails.
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group("g1", &["alice"], &[], &[("ftA", "fivetran")]))
            .await;

        fixture.reconciler.reconcile(&request("g1")).await.unwrap();
        let before = fixture.store.group.get_members("g1").await.unwrap();

        // Delete the cached team mapping and make creation fail so the
        // next pass hits a backend error.
        fixture
            .store
            .group
            .delete_backend("g1", "ftA", "fivetran")
            .await
            .unwrap();
        ft_state.lock().unwrap().teams_by_name.clear();
        ft_state.lock().unwrap().fail_create_team = Some("503".to_string());

        let err = fixture.reconciler.reconcile(&request("g1")).await.unwrap_err();
        assert!(matches!(err, ReconcileError::BackendsFailed { .. }));

        assert_eq!(fixture.store.group.get_members("g1").await.unwrap(), before);
        assert_eq!(
            fixture.store.user_groups.get_groups("alice@x").await.unwrap(),
            vec!["g1"]
        );
    }

    #[tokio::test]
    async fn test_non_configurable_group() {
        let ft_state = new_backend_state();
        let restrictive = TransformRules::from_config(&StdHashMap::from([(
            "fivetran".to_string(),
            vec![PatternRule {
                input: "^dataverse-.*$".to_string(),
                output: "$0".to_string(),
            }],
        )]))
        .unwrap();

        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("alice", "alice@x"),
            restrictive,
        );
        fixture
            .resources
            .apply(group("no-rules-match", &["alice"], &[], &[("ftA", "fivetran")]))
            .await;

        fixture
            .reconciler
            .reconcile(&request("no-rules-match"))
            .await
            .unwrap();

        let stored = fixture
            .resources
            .get("usernaut", "no-rules-match")
            .await
            .unwrap()
            .unwrap();
        let ready = stored.ready_condition().unwrap();
        assert_eq!(ready.status, "False");
        assert_eq!(ready.reason, "NonConfigurable");
        assert!(stored.status.reconciled_users.is_empty());

        // No backend call was made.
        assert!(mutating_calls(&ft_state).is_empty());
    }

    #[tokio::test]
    async fn test_second_reconcile_is_idempotent() {
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group("g1", &["alice"], &[], &[("ftA", "fivetran")]))
            .await;

        fixture.reconciler.reconcile(&request("g1")).await.unwrap();
        let calls_after_first = mutating_calls(&ft_state).len();

        fixture.reconciler.reconcile(&request("g1")).await.unwrap();
        assert_eq!(mutating_calls(&ft_state).len(), calls_after_first);
    }

    #[tokio::test]
    async fn test_preload_promotion_into_group_store() {
        let ft_state = new_backend_state();
        {
            // The backend already has the team, discovered at preload.
            let mut state = ft_state.lock().unwrap();
            state.teams_by_name.insert(
                "ft_g1".to_string(),
                usernaut_core::Team {
                    id: "t42".to_string(),
                    name: "ft_g1".to_string(),
                    ..Default::default()
                },
            );
            state.members.insert("t42".to_string(), StdHashMap::new());
        }

        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );
        fixture
            .store
            .team
            .set_backend("ft_g1", "ftA_fivetran", "t42")
            .await
            .unwrap();
        fixture
            .resources
            .apply(group("g1", &["alice"], &[], &[("ftA", "fivetran")]))
            .await;

        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        // The preloaded id was promoted; no team was created.
        let promoted = fixture
            .store
            .group
            .get_backend_id("g1", "ftA", "fivetran")
            .await
            .unwrap();
        assert_eq!(promoted.as_deref(), Some("t42"));
        assert!(!mutating_calls(&ft_state)
            .iter()
            .any(|call| call.starts_with("create_team")));
    }

    #[tokio::test]
    async fn test_ghost_members_are_removed() {
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            // "ghost" is declared but no longer resolvable in LDAP.
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group("g1", &["alice", "ghost"], &[], &[("ftA", "fivetran")]))
            .await;

        // Seed the backend with a team that still contains the ghost.
        {
            let mut state = ft_state.lock().unwrap();
            state.teams_by_name.insert(
                "ft_g1".to_string(),
                usernaut_core::Team {
                    id: "t1".to_string(),
                    name: "ft_g1".to_string(),
                    ..Default::default()
                },
            );
            let mut members = StdHashMap::new();
            members.insert(
                "ghost".to_string(),
                User {
                    id: "ghost".to_string(),
                    ..Default::default()
                },
            );
            state.members.insert("t1".to_string(), members);
        }
        fixture
            .store
            .team
            .set_backend("ft_g1", "ftA_fivetran", "t1")
            .await
            .unwrap();

        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        let state = ft_state.lock().unwrap();
        let members = state.members.get("t1").unwrap();
        assert!(!members.contains_key("ghost"));
        assert_eq!(members.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_group_param_fails_backend_without_calls() {
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );

        let mut resource = group("g1", &["alice"], &[], &[("ftA", "fivetran")]);
        resource.spec.group_params = vec![GroupParam {
            backend: "fivetran".to_string(),
            name: "ftA".to_string(),
            property: String::new(),
            value: Vec::new(),
        }];
        fixture.resources.apply(resource).await;

        let err = fixture.reconciler.reconcile(&request("g1")).await.unwrap_err();
        assert!(matches!(err, ReconcileError::BackendsFailed { .. }));
        assert!(mutating_calls(&ft_state).is_empty());

        let stored = fixture.resources.get("usernaut", "g1").await.unwrap().unwrap();
        let status = &stored.status.backends_status[0];
        assert!(!status.status);
        assert!(status.message.contains("property is empty"));
    }

    #[tokio::test]
    async fn test_group_param_for_undeclared_backend_is_an_error() {
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );

        let mut resource = group("g1", &["alice"], &[], &[("ftA", "fivetran")]);
        resource.spec.group_params = vec![GroupParam {
            backend: "gitlab".to_string(),
            name: "git-main".to_string(),
            property: "project_access_paths".to_string(),
            value: vec!["data/p".to_string()],
        }];
        fixture.resources.apply(resource).await;

        let err = fixture.reconciler.reconcile(&request("g1")).await.unwrap_err();
        assert!(matches!(err, ReconcileError::BackendsFailed { .. }));
    }

    #[tokio::test]
    async fn test_gitlab_dependency_converges_over_two_reconciles() {
        let git_state = new_backend_state();
        let rover_state = new_backend_state();

        let fixture = fixture(
            vec![
                MockBackend::new("git-main", BackendType::Gitlab, Arc::clone(&git_state))
                    .with_ldap_sync(BackendRef::new("rover-main", "rover")),
                MockBackend::new("rover-main", BackendType::Rover, Arc::clone(&rover_state)),
            ],
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group(
                "g1",
                &["alice"],
                &[],
                &[("git-main", "gitlab"), ("rover-main", "rover")],
            ))
            .await;

        // First pass: the rover side has not been populated yet, so the
        // git step fails its dependency check while rover succeeds.
        let err = fixture.reconciler.reconcile(&request("g1")).await.unwrap_err();
        assert!(matches!(err, ReconcileError::BackendsFailed { .. }));

        let stored = fixture.resources.get("usernaut", "g1").await.unwrap().unwrap();
        let git_status = stored
            .status
            .backends_status
            .iter()
            .find(|s| s.type_ == "gitlab")
            .unwrap();
        assert!(!git_status.status);
        assert!(git_status.message.contains("not found in cache"));
        assert!(fixture
            .store
            .group
            .backend_exists("g1", "rover-main", "rover")
            .await
            .unwrap());

        // Second pass: the dependency is in the group store now; the git
        // step links the team to LDAP and skips membership calls.
        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        let calls = mutating_calls(&git_state);
        assert!(calls.iter().any(|c| c == "ldap_link:g1"));
        assert!(calls.iter().any(|c| c == "ldap_sync"));
        assert!(!calls.iter().any(|c| c.starts_with("add_to_team")));
        assert!(!calls.iter().any(|c| c.starts_with("create_user:")));

        let stored = fixture.resources.get("usernaut", "g1").await.unwrap().unwrap();
        assert_eq!(stored.ready_condition().unwrap().status, "True");
    }

    #[tokio::test]
    async fn test_member_removal_updates_reverse_index() {
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new()
                .with_user("alice", "alice@x")
                .with_user("bob", "bob@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group("g1", &["alice", "bob"], &[], &[("ftA", "fivetran")]))
            .await;
        fixture.reconciler.reconcile(&request("g1")).await.unwrap();
        assert_eq!(
            fixture.store.user_groups.get_groups("bob@x").await.unwrap(),
            vec!["g1"]
        );

        // Drop bob from the declared members and reconcile again.
        fixture
            .resources
            .apply({
                let mut updated = group("g1", &["alice"], &[], &[("ftA", "fivetran")]);
                updated.metadata.finalizers = vec![GROUP_FINALIZER.to_string()];
                updated
            })
            .await;
        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        assert_eq!(fixture.store.group.get_members("g1").await.unwrap(), vec!["alice@x"]);
        assert!(fixture
            .store
            .user_groups
            .get_groups("bob@x")
            .await
            .unwrap()
            .is_empty());

        // Bob was removed from the backend team as well.
        let calls = mutating_calls(&ft_state);
        assert!(calls.iter().any(|c| c.starts_with("remove_from_team:")));
    }

    #[tokio::test]
    async fn test_finalize_cleans_up_and_removes_finalizer() {
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group("g1", &["alice"], &[], &[("ftA", "fivetran")]))
            .await;
        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        let team_id = fixture
            .store
            .group
            .get_backend_id("g1", "ftA", "fivetran")
            .await
            .unwrap()
            .unwrap();

        fixture.resources.mark_deleted("usernaut", "g1").await;
        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        // Backend team deleted, caches cleaned, resource gone.
        assert!(mutating_calls(&ft_state)
            .iter()
            .any(|c| c == &format!("delete_team:{team_id}")));
        assert!(!fixture.store.group.exists("g1").await.unwrap());
        assert!(!fixture.store.team.exists("ft_g1").await.unwrap());
        assert!(fixture
            .store
            .user_groups
            .get_groups("alice@x")
            .await
            .unwrap()
            .is_empty());
        assert!(!fixture.resources.contains("usernaut", "g1").await);
    }

    #[tokio::test]
    async fn test_force_reconcile_label_is_removed() {
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );
        let mut resource = group("g1", &["alice"], &[], &[("ftA", "fivetran")]);
        resource
            .metadata
            .labels
            .insert(DEFAULT_FORCE_RECONCILE_LABEL.to_string(), "true".to_string());
        fixture.resources.apply(resource).await;

        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        let stored = fixture.resources.get("usernaut", "g1").await.unwrap().unwrap();
        assert!(!stored
            .metadata
            .labels
            .contains_key(DEFAULT_FORCE_RECONCILE_LABEL));
    }

    #[tokio::test]
    async fn test_owner_references_follow_nested_groups() {
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("bob", "bob@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group("g1", &[], &["g2"], &[("ftA", "fivetran")]))
            .await;
        fixture.resources.apply(group("g2", &["bob"], &[], &[])).await;

        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        let stored = fixture.resources.get("usernaut", "g1").await.unwrap().unwrap();
        assert_eq!(stored.metadata.owner_references.len(), 1);
        let owner = &stored.metadata.owner_references[0];
        assert_eq!(owner.kind, "Group");
        assert_eq!(owner.name, "g2");
        assert_eq!(owner.uid, "uid-g2");
    }

    #[tokio::test]
    async fn test_unresolved_users_are_dropped_not_fatal() {
        let ft_state = new_backend_state();
        let fixture = fixture(
            vec![MockBackend::new("ftA", BackendType::Fivetran, Arc::clone(&ft_state))],
            MockLdap::new().with_user("alice", "alice@x"),
            default_rules(),
        );
        fixture
            .resources
            .apply(group("g1", &["alice", "unknown"], &[], &[("ftA", "fivetran")]))
            .await;

        fixture.reconciler.reconcile(&request("g1")).await.unwrap();

        let data = fixture.store.group.get("g1").await.unwrap();
        assert_eq!(data.members, vec!["alice@x"]);
    }
}
