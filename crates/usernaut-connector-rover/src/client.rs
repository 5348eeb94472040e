//! Rover group API client.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;
use usernaut_connector::http::{apply_auth, build_client, into_body, send_with_retry};
use usernaut_connector::{
    BackendSettings, BackendType, Connector, ConnectorResult, HttpClientConfig, MembershipOps,
    TeamOps, UserOps,
};
use usernaut_core::{Team, User};

/// Adapter for the internal directory group API.
pub struct RoverConnector {
    client: reqwest::Client,
    settings: BackendSettings,
    http: HttpClientConfig,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct RoverGroup {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RoverMember {
    uid: String,
    #[serde(default)]
    cn: String,
}

impl RoverConnector {
    pub fn new(settings: &BackendSettings, http: &HttpClientConfig) -> ConnectorResult<Self> {
        settings.connection.validate()?;
        Ok(Self {
            client: build_client(http)?,
            display_name: format!("rover: {}", settings.name),
            settings: settings.clone(),
            http: http.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.connection.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, identifier: &str) -> ConnectorResult<T> {
        let request = apply_auth(self.client.get(self.url(path)), &self.settings.connection.auth);
        let response = send_with_retry(request, &self.http).await?;
        let body = into_body(response, identifier).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post(
        &self,
        path: &str,
        payload: &serde_json::Value,
        identifier: &str,
    ) -> ConnectorResult<()> {
        let request = apply_auth(
            self.client.post(self.url(path)).json(payload),
            &self.settings.connection.auth,
        );
        let response = send_with_retry(request, &self.http).await?;
        into_body(response, identifier).await?;
        Ok(())
    }

    async fn delete(&self, path: &str, identifier: &str) -> ConnectorResult<()> {
        let request =
            apply_auth(self.client.delete(self.url(path)), &self.settings.connection.auth);
        let response = send_with_retry(request, &self.http).await?;
        into_body(response, identifier).await?;
        Ok(())
    }
}

#[async_trait]
impl UserOps for RoverConnector {
    async fn fetch_all_users(
        &self,
    ) -> ConnectorResult<(HashMap<String, User>, HashMap<String, User>)> {
        // People live in the directory proper, not in the group API.
        Ok((HashMap::new(), HashMap::new()))
    }

    async fn fetch_user_details(&self, user_id: &str) -> ConnectorResult<User> {
        Ok(User {
            id: user_id.to_string(),
            user_name: user_id.to_string(),
            ..Default::default()
        })
    }

    async fn create_user(&self, user: &User) -> ConnectorResult<User> {
        // Directory-owned lifecycle: echo the identity, keyed by uid.
        Ok(User {
            id: user.user_name.clone(),
            user_name: user.user_name.clone(),
            email: user.email.clone(),
            ..Default::default()
        })
    }

    async fn delete_user(&self, _user_id: &str) -> ConnectorResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TeamOps for RoverConnector {
    async fn fetch_all_teams(&self) -> ConnectorResult<HashMap<String, Team>> {
        let groups: Vec<RoverGroup> = self.get_json("/v1/groups", "groups").await?;
        let teams: HashMap<String, Team> = groups
            .into_iter()
            .map(|group| {
                (
                    group.name.clone(),
                    Team {
                        id: group.name.clone(),
                        name: group.name,
                        description: group.description,
                        ..Default::default()
                    },
                )
            })
            .collect();
        info!(total_teams_count = teams.len(), "fetched rover groups");
        Ok(teams)
    }

    async fn fetch_team_details(&self, team_id: &str) -> ConnectorResult<Team> {
        let group: RoverGroup = self
            .get_json(&format!("/v1/groups/{team_id}"), team_id)
            .await?;
        Ok(Team {
            id: group.name.clone(),
            name: group.name,
            description: group.description,
            ..Default::default()
        })
    }

    async fn create_team(&self, team: &Team) -> ConnectorResult<Team> {
        let payload = serde_json::json!({
            "name": team.name,
            "description": team.description,
        });
        match self.post("/v1/groups", &payload, &team.name).await {
            Ok(()) => {}
            Err(err) if err.is_conflict() => {
                info!(group = %team.name, "rover group already exists");
            }
            Err(err) => return Err(err),
        }
        Ok(Team {
            id: team.name.clone(),
            name: team.name.clone(),
            description: team.description.clone(),
            ..Default::default()
        })
    }

    async fn delete_team_by_id(&self, team_id: &str) -> ConnectorResult<()> {
        match self.delete(&format!("/v1/groups/{team_id}"), team_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl MembershipOps for RoverConnector {
    async fn fetch_team_members_by_team_id(
        &self,
        team_id: &str,
    ) -> ConnectorResult<HashMap<String, User>> {
        let members: Vec<RoverMember> = self
            .get_json(&format!("/v1/groups/{team_id}/members"), team_id)
            .await?;
        Ok(members
            .into_iter()
            .map(|member| {
                (
                    member.uid.clone(),
                    User {
                        id: member.uid.clone(),
                        user_name: member.uid,
                        display_name: member.cn,
                        ..Default::default()
                    },
                )
            })
            .collect())
    }

    async fn add_users_to_team(&self, team_id: &str, user_ids: &[String]) -> ConnectorResult<()> {
        for uid in user_ids {
            match self
                .post(
                    &format!("/v1/groups/{team_id}/members/{uid}"),
                    &serde_json::json!({}),
                    uid,
                )
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_conflict() => {}
                Err(err) => return Err(err),
            }
        }
        info!(group = %team_id, user_count = user_ids.len(), "added members to rover group");
        Ok(())
    }

    async fn remove_users_from_team(
        &self,
        team_id: &str,
        user_ids: &[String],
    ) -> ConnectorResult<()> {
        for uid in user_ids {
            match self
                .delete(&format!("/v1/groups/{team_id}/members/{uid}"), uid)
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        info!(group = %team_id, user_count = user_ids.len(), "removed members from rover group");
        Ok(())
    }
}

#[async_trait]
impl Connector for RoverConnector {
    fn backend_type(&self) -> BackendType {
        BackendType::Rover
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}
