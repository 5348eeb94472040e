//! Shared test doubles: an in-memory backend connector and an in-memory
//! LDAP resolver, both with inspectable state and failure injection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use usernaut_connector::{
    BackendSettings, BackendType, BoxedConnector, ConnectionSettings, Connector, ConnectorError,
    ConnectorRegistry, ConnectorResult, LdapSyncOps, MembershipOps, TeamOps, UserOps,
};
use usernaut_core::{BackendRef, Team, User};
use usernaut_ldap::{LdapError, LdapResolver, LdapResult, LdapUser};

/// Shared, inspectable state of one mock backend.
#[derive(Default)]
pub struct MockBackendState {
    pub users_by_id: HashMap<String, User>,
    pub users_by_email: HashMap<String, User>,
    pub teams_by_name: HashMap<String, Team>,
    /// team id -> member map keyed by backend user id.
    pub members: HashMap<String, HashMap<String, User>>,
    pub next_id: u32,
    /// Every mutating call, e.g. `create_team:ft_g1`.
    pub calls: Vec<String>,
    /// When set, `create_team` fails with this message.
    pub fail_create_team: Option<String>,
    /// When set, `delete_user` fails with this message.
    pub fail_delete_user: Option<String>,
}

pub type SharedBackendState = Arc<Mutex<MockBackendState>>;

pub fn new_backend_state() -> SharedBackendState {
    Arc::new(Mutex::new(MockBackendState::default()))
}

/// A backend adapter over [`MockBackendState`].
pub struct MockConnector {
    state: SharedBackendState,
    type_: BackendType,
    name: String,
    supports_ldap_sync: bool,
    ldap_sync: bool,
    cn: String,
}

#[async_trait]
impl UserOps for MockConnector {
    async fn fetch_all_users(
        &self,
    ) -> ConnectorResult<(HashMap<String, User>, HashMap<String, User>)> {
        let state = self.state.lock().unwrap();
        Ok((state.users_by_id.clone(), state.users_by_email.clone()))
    }

    async fn fetch_user_details(&self, user_id: &str) -> ConnectorResult<User> {
        let state = self.state.lock().unwrap();
        state
            .users_by_id
            .get(user_id)
            .cloned()
            .ok_or_else(|| ConnectorError::not_found(user_id))
    }

    async fn create_user(&self, user: &User) -> ConnectorResult<User> {
        let mut state = self.state.lock().unwrap();
        if self.ldap_sync {
            // Directory-driven mode resolves instead of creating.
            state.calls.push(format!("resolve_user:{}", user.user_name));
            return Ok(state
                .users_by_email
                .get(&user.email)
                .cloned()
                .unwrap_or_else(|| User {
                    id: user.user_name.clone(),
                    ..user.clone()
                }));
        }

        if let Some(existing) = state.users_by_email.get(&user.email) {
            let existing = existing.clone();
            state.calls.push(format!("create_user_conflict:{}", user.email));
            return Ok(existing);
        }

        state.next_id += 1;
        let created = User {
            id: format!("u{}", state.next_id),
            ..user.clone()
        };
        state.calls.push(format!("create_user:{}", user.email));
        state.users_by_id.insert(created.id.clone(), created.clone());
        state
            .users_by_email
            .insert(created.email.clone(), created.clone());
        Ok(created)
    }

    async fn delete_user(&self, user_id: &str) -> ConnectorResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_delete_user {
            let message = message.clone();
            return Err(ConnectorError::Transient {
                status: 500,
                message,
            });
        }
        state.calls.push(format!("delete_user:{user_id}"));
        if let Some(user) = state.users_by_id.remove(user_id) {
            state.users_by_email.remove(&user.email);
        }
        Ok(())
    }
}

#[async_trait]
impl TeamOps for MockConnector {
    async fn fetch_all_teams(&self) -> ConnectorResult<HashMap<String, Team>> {
        Ok(self.state.lock().unwrap().teams_by_name.clone())
    }

    async fn fetch_team_details(&self, team_id: &str) -> ConnectorResult<Team> {
        let state = self.state.lock().unwrap();
        state
            .teams_by_name
            .values()
            .find(|team| team.id == team_id)
            .cloned()
            .ok_or_else(|| ConnectorError::not_found(team_id))
    }

    async fn create_team(&self, team: &Team) -> ConnectorResult<Team> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_create_team {
            let message = message.clone();
            return Err(ConnectorError::Transient {
                status: 500,
                message,
            });
        }

        if self.ldap_sync {
            state.calls.push(format!("ldap_link:{}", self.cn));
            state.calls.push("ldap_sync".to_string());
        }
        if team.team_params.property == "project_access_paths" {
            for path in &team.team_params.value {
                state.calls.push(format!("project_share:{path}"));
            }
        }

        if let Some(existing) = state.teams_by_name.get(&team.name) {
            let existing = existing.clone();
            state.calls.push(format!("create_team_conflict:{}", team.name));
            return Ok(existing);
        }

        state.next_id += 1;
        let created = Team {
            id: format!("t{}", state.next_id),
            ..team.clone()
        };
        state.calls.push(format!("create_team:{}", team.name));
        state.teams_by_name.insert(created.name.clone(), created.clone());
        state.members.insert(created.id.clone(), HashMap::new());
        Ok(created)
    }

    async fn delete_team_by_id(&self, team_id: &str) -> ConnectorResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete_team:{team_id}"));
        state.teams_by_name.retain(|_, team| team.id != team_id);
        state.members.remove(team_id);
        Ok(())
    }
}

#[async_trait]
impl MembershipOps for MockConnector {
    async fn fetch_team_members_by_team_id(
        &self,
        team_id: &str,
    ) -> ConnectorResult<HashMap<String, User>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .get(team_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_users_to_team(&self, team_id: &str, user_ids: &[String]) -> ConnectorResult<()> {
        let mut state = self.state.lock().unwrap();
        for user_id in user_ids {
            state.calls.push(format!("add_to_team:{team_id}:{user_id}"));
            let user = state
                .users_by_id
                .get(user_id)
                .cloned()
                .unwrap_or_else(|| User {
                    id: user_id.clone(),
                    ..Default::default()
                });
            state
                .members
                .entry(team_id.to_string())
                .or_default()
                .insert(user_id.clone(), user);
        }
        Ok(())
    }

    async fn remove_users_from_team(
        &self,
        team_id: &str,
        user_ids: &[String],
    ) -> ConnectorResult<()> {
        let mut state = self.state.lock().unwrap();
        for user_id in user_ids {
            state
                .calls
                .push(format!("remove_from_team:{team_id}:{user_id}"));
            if let Some(members) = state.members.get_mut(team_id) {
                members.remove(user_id);
            }
        }
        Ok(())
    }
}

impl LdapSyncOps for MockConnector {
    fn enable_ldap_sync(&mut self, group_name: &str) {
        self.ldap_sync = true;
        self.cn = group_name.to_string();
    }

    fn ldap_sync_enabled(&self) -> bool {
        self.ldap_sync
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn backend_type(&self) -> BackendType {
        self.type_
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn as_ldap_sync_mut(&mut self) -> Option<&mut dyn LdapSyncOps> {
        self.supports_ldap_sync.then_some(self as &mut dyn LdapSyncOps)
    }
}

/// One mock backend declaration for [`build_registry`].
pub struct MockBackend {
    pub name: &'static str,
    pub type_: BackendType,
    pub state: SharedBackendState,
    pub supports_ldap_sync: bool,
    pub depends_on: Option<BackendRef>,
}

impl MockBackend {
    pub fn new(name: &'static str, type_: BackendType, state: SharedBackendState) -> Self {
        Self {
            name,
            type_,
            state,
            supports_ldap_sync: false,
            depends_on: None,
        }
    }

    pub fn with_ldap_sync(mut self, depends_on: BackendRef) -> Self {
        self.supports_ldap_sync = true;
        self.depends_on = Some(depends_on);
        self
    }
}

/// Build a registry whose factories hand out [`MockConnector`]s bound to
/// the given shared states. Several instances of the same backend type
/// share one factory that routes by instance name.
pub fn build_registry(backends: Vec<MockBackend>) -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();

    // (state, supports_ldap_sync) per instance name, grouped by type.
    let mut by_type: HashMap<BackendType, HashMap<String, (SharedBackendState, bool)>> =
        HashMap::new();
    for backend in &backends {
        by_type.entry(backend.type_).or_default().insert(
            backend.name.to_string(),
            (Arc::clone(&backend.state), backend.supports_ldap_sync),
        );
    }

    for (type_, instances) in by_type {
        registry.register_factory(
            type_,
            Box::new(move |settings: &BackendSettings| {
                let (state, supports_ldap_sync) =
                    instances.get(&settings.name).cloned().ok_or_else(|| {
                        ConnectorError::UnknownBackend {
                            backend: settings.backend_key(),
                        }
                    })?;
                Ok(Box::new(MockConnector {
                    state,
                    type_: settings.type_,
                    name: settings.backend_key(),
                    supports_ldap_sync,
                    ldap_sync: false,
                    cn: String::new(),
                }) as BoxedConnector)
            }),
        );
    }

    for backend in backends {
        registry
            .add_backend(BackendSettings {
                name: backend.name.to_string(),
                type_: backend.type_,
                enabled: true,
                depends_on: backend.depends_on,
                connection: ConnectionSettings {
                    base_url: "http://mock.invalid".to_string(),
                    ..Default::default()
                },
            })
            .expect("mock backend settings are valid");
    }

    registry
}

/// In-memory LDAP resolver.
#[derive(Default)]
pub struct MockLdap {
    by_username: HashMap<String, LdapUser>,
    by_email: HashMap<String, LdapUser>,
}

impl MockLdap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user resolvable by both uid and email.
    pub fn with_user(mut self, uid: &str, email: &str) -> Self {
        let user = LdapUser::new(HashMap::from([
            ("uid".to_string(), uid.to_string()),
            ("mail".to_string(), email.to_string()),
            ("cn".to_string(), format!("{uid} cn")),
            ("sn".to_string(), format!("{uid} sn")),
            ("displayName".to_string(), format!("{uid} display")),
        ]));
        self.by_username.insert(uid.to_string(), user.clone());
        self.by_email.insert(email.to_string(), user);
        self
    }

    /// Register an email that resolves to an empty record.
    pub fn with_empty_user(mut self, email: &str) -> Self {
        let user = LdapUser::new(HashMap::from([
            ("uid".to_string(), String::new()),
            ("mail".to_string(), String::new()),
        ]));
        self.by_email.insert(email.to_string(), user);
        self
    }
}

#[async_trait]
impl LdapResolver for MockLdap {
    async fn get_by_username(&self, uid: &str) -> LdapResult<LdapUser> {
        self.by_username
            .get(uid)
            .cloned()
            .ok_or(LdapError::NoUserFound)
    }

    async fn get_by_email(&self, email: &str) -> LdapResult<LdapUser> {
        self.by_email
            .get(email)
            .cloned()
            .ok_or(LdapError::NoUserFound)
    }
}
