//! Fivetran team and membership operations.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use usernaut_connector::{ConnectorResult, MembershipOps, TeamOps};
use usernaut_core::{Team, User};

use crate::client::{Envelope, FivetranConnector};
use crate::ACCOUNT_REVIEWER_ROLE;

#[derive(Debug, Deserialize)]
struct FivetranTeam {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    role: String,
}

impl From<FivetranTeam> for Team {
    fn from(team: FivetranTeam) -> Self {
        Team {
            id: team.id,
            name: team.name,
            description: team.description,
            role: team.role,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct TeamMember {
    user_id: String,
    #[serde(default)]
    role: String,
}

#[async_trait]
impl TeamOps for FivetranConnector {
    async fn fetch_all_teams(&self) -> ConnectorResult<HashMap<String, Team>> {
        let mut teams = HashMap::new();
        self.paginate::<FivetranTeam>("/v1/teams", |items| {
            for item in items {
                let team: Team = item.into();
                teams.insert(team.name.clone(), team);
            }
        })
        .await?;

        info!(total_teams_count = teams.len(), "fetched fivetran teams");
        Ok(teams)
    }

    async fn fetch_team_details(&self, team_id: &str) -> ConnectorResult<Team> {
        let envelope: Envelope<FivetranTeam> = self
            .get_json(&format!("/v1/teams/{team_id}"), team_id)
            .await?;
        Ok(envelope.data.into())
    }

    async fn create_team(&self, team: &Team) -> ConnectorResult<Team> {
        let payload = serde_json::json!({
            "name": team.name,
            "description": team.description,
            "role": if team.role.is_empty() { ACCOUNT_REVIEWER_ROLE } else { team.role.as_str() },
        });
        let envelope: Envelope<FivetranTeam> =
            self.post_json("/v1/teams", &payload, &team.name).await?;
        info!(team = %team.name, team_id = %envelope.data.id, "created fivetran team");
        Ok(envelope.data.into())
    }

    async fn delete_team_by_id(&self, team_id: &str) -> ConnectorResult<()> {
        match self.delete(&format!("/v1/teams/{team_id}"), team_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl MembershipOps for FivetranConnector {
    async fn fetch_team_members_by_team_id(
        &self,
        team_id: &str,
    ) -> ConnectorResult<HashMap<String, User>> {
        let mut members = HashMap::new();
        self.paginate::<TeamMember>(&format!("/v1/teams/{team_id}/users"), |items| {
            for member in items {
                members.insert(
                    member.user_id.clone(),
                    User {
                        id: member.user_id,
                        role: member.role,
                        ..Default::default()
                    },
                );
            }
        })
        .await?;
        Ok(members)
    }

    async fn add_users_to_team(&self, team_id: &str, user_ids: &[String]) -> ConnectorResult<()> {
        for user_id in user_ids {
            let payload = serde_json::json!({
                "user_id": user_id,
                "role": ACCOUNT_REVIEWER_ROLE,
            });
            self.post_json::<serde_json::Value>(
                &format!("/v1/teams/{team_id}/users"),
                &payload,
                user_id,
            )
            .await?;
        }
        info!(team_id = %team_id, user_count = user_ids.len(), "added users to fivetran team");
        Ok(())
    }

    async fn remove_users_from_team(
        &self,
        team_id: &str,
        user_ids: &[String],
    ) -> ConnectorResult<()> {
        for user_id in user_ids {
            match self
                .delete(&format!("/v1/teams/{team_id}/users/{user_id}"), user_id)
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        info!(team_id = %team_id, user_count = user_ids.len(), "removed users from fivetran team");
        Ok(())
    }
}
