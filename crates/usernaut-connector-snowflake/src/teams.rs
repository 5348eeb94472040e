//! Snowflake team (account role) and grant operations.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::info;
use usernaut_connector::{ConnectorError, ConnectorResult, MembershipOps, TeamOps};
use usernaut_core::{Team, User};

use crate::client::SnowflakeConnector;

#[derive(Debug, Deserialize)]
struct SnowflakeRole {
    name: String,
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Deserialize)]
struct RoleGrant {
    #[serde(default)]
    grantee_name: String,
    #[serde(default)]
    granted_to: String,
}

impl From<SnowflakeRole> for Team {
    fn from(role: SnowflakeRole) -> Self {
        // Roles have no separate id; the lowercased name is the id.
        Team {
            id: role.name.to_lowercase(),
            name: role.name,
            description: role.comment,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TeamOps for SnowflakeConnector {
    async fn fetch_all_teams(&self) -> ConnectorResult<HashMap<String, Team>> {
        let mut teams = HashMap::new();
        let mut cursor: Option<String> = None;

        loop {
            let path = match &cursor {
                Some(from) => format!(
                    "/api/v2/roles?showLimit={}&fromName={}",
                    self.page_limit, from
                ),
                None => format!("/api/v2/roles?showLimit={}", self.page_limit),
            };
            let roles: Vec<SnowflakeRole> =
                self.json_with_polling(Method::GET, &path, None, "roles").await?;
            let count = roles.len();
            cursor = roles.last().map(|r| r.name.clone());
            for role in roles {
                let team: Team = role.into();
                teams.insert(team.name.clone(), team);
            }
            if count < self.page_limit {
                break;
            }
        }

        info!(total_teams_count = teams.len(), "fetched snowflake roles");
        Ok(teams)
    }

    async fn fetch_team_details(&self, team_id: &str) -> ConnectorResult<Team> {
        let role: SnowflakeRole = self
            .json_with_polling(
                Method::GET,
                &format!("/api/v2/roles/{team_id}"),
                None,
                team_id,
            )
            .await?;
        Ok(role.into())
    }

    async fn create_team(&self, team: &Team) -> ConnectorResult<Team> {
        let payload = serde_json::json!({
            "name": team.name,
            "comment": team.description,
        });
        match self
            .json_with_polling::<SnowflakeRole>(
                Method::POST,
                "/api/v2/roles",
                Some(&payload),
                &team.name,
            )
            .await
        {
            Ok(role) => {
                info!(role = %team.name, "created snowflake role");
                Ok(role.into())
            }
            Err(err) if err.is_conflict() => self.fetch_team_details(&team.name).await,
            Err(err) => Err(err),
        }
    }

    async fn delete_team_by_id(&self, team_id: &str) -> ConnectorResult<()> {
        let (status, body) = self
            .request_with_polling(
                Method::DELETE,
                &format!("/api/v2/roles/{team_id}"),
                None,
                team_id,
            )
            .await?;
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(ConnectorError::from_status(status, &body, team_id))
    }
}

#[async_trait]
impl MembershipOps for SnowflakeConnector {
    async fn fetch_team_members_by_team_id(
        &self,
        team_id: &str,
    ) -> ConnectorResult<HashMap<String, User>> {
        let grants: Vec<RoleGrant> = self
            .json_with_polling(
                Method::GET,
                &format!("/api/v2/roles/{team_id}/grants-of"),
                None,
                team_id,
            )
            .await?;

        Ok(grants
            .into_iter()
            .filter(|grant| grant.granted_to.eq_ignore_ascii_case("USER"))
            .map(|grant| {
                let id = grant.grantee_name.to_lowercase();
                (
                    id.clone(),
                    User {
                        user_name: id.clone(),
                        id,
                        ..Default::default()
                    },
                )
            })
            .collect())
    }

    async fn add_users_to_team(&self, team_id: &str, user_ids: &[String]) -> ConnectorResult<()> {
        for user_id in user_ids {
            let payload = serde_json::json!({
                "grantee_name": user_id,
                "granted_to": "USER",
            });
            self.json_with_polling::<serde_json::Value>(
                Method::POST,
                &format!("/api/v2/roles/{team_id}/grants-of"),
                Some(&payload),
                user_id,
            )
            .await?;
        }
        info!(role = %team_id, user_count = user_ids.len(), "granted snowflake role");
        Ok(())
    }

    async fn remove_users_from_team(
        &self,
        team_id: &str,
        user_ids: &[String],
    ) -> ConnectorResult<()> {
        for user_id in user_ids {
            let (status, body) = self
                .request_with_polling(
                    Method::DELETE,
                    &format!("/api/v2/roles/{team_id}/grants-of/{user_id}"),
                    None,
                    user_id,
                )
                .await?;
            if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
                return Err(ConnectorError::from_status(status, &body, user_id));
            }
        }
        info!(role = %team_id, user_count = user_ids.len(), "revoked snowflake role");
        Ok(())
    }
}
