//! GitLab team (subgroup) and membership operations.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use usernaut_connector::{ConnectorError, ConnectorResult, MembershipOps, TeamOps};
use usernaut_core::{Team, User};

use crate::client::{encode_path, GitlabConnector};
use crate::DEVELOPER_ACCESS_LEVEL;

#[derive(Debug, Deserialize)]
struct GitlabGroup {
    id: i64,
    name: String,
    #[serde(default)]
    full_path: String,
    #[serde(default)]
    marked_for_deletion_on: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitlabMember {
    id: i64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    name: String,
}

impl GitlabConnector {
    async fn find_subgroup_by_name(&self, name: &str) -> ConnectorResult<Option<GitlabGroup>> {
        let groups: Vec<GitlabGroup> = self
            .get_json(
                &format!(
                    "/groups/{}/subgroups?search={}",
                    self.parent_group_id, name
                ),
                name,
            )
            .await?;
        Ok(groups.into_iter().find(|g| g.name == name))
    }

    async fn add_to_ldap_group(&self, group_id: i64) -> ConnectorResult<()> {
        let payload = serde_json::json!({
            "cn": self.cn,
            "group_access": DEVELOPER_ACCESS_LEVEL,
            "provider": self.ldap_provider,
        });
        let status = self
            .post_status(
                &format!("/groups/{group_id}/ldap_group_links"),
                &payload,
                &self.cn,
            )
            .await?;
        info!(cn = %self.cn, status = status, "added LDAP group link");
        Ok(())
    }

    async fn initiate_ldap_sync(&self, group_id: i64) -> ConnectorResult<()> {
        let status = self
            .post_status(
                &format!("/groups/{group_id}/ldap_sync"),
                &serde_json::json!({}),
                &self.cn,
            )
            .await?;
        if status != 202 && status != 200 {
            return Err(ConnectorError::operation_failed(format!(
                "ldap synchronization request failed with status {status}"
            )));
        }
        info!(status = status, "initiated LDAP sync");
        Ok(())
    }

    async fn add_group_as_project_developer(
        &self,
        group_id: i64,
        project_path: &str,
    ) -> ConnectorResult<()> {
        let payload = serde_json::json!({
            "group_id": group_id,
            "group_access": DEVELOPER_ACCESS_LEVEL,
        });
        let status = self
            .post_status(
                &format!("/projects/{}/share", encode_path(project_path)),
                &payload,
                project_path,
            )
            .await?;
        info!(project = %project_path, status = status, "granted Developer access to project");
        Ok(())
    }

    /// Poll until the soft-deleted group reports marked-for-deletion,
    /// returning its full path for the hard delete. `None` means the
    /// group vanished entirely (already hard-deleted).
    async fn poll_for_pending_deletion(&self, team_id: &str) -> ConnectorResult<Option<String>> {
        for attempt in 1..=self.deletion_poll_attempts {
            match self
                .get_json::<GitlabGroup>(&format!("/groups/{team_id}"), team_id)
                .await
            {
                Ok(group) => {
                    if group.marked_for_deletion_on.is_some() {
                        info!(team_id = %team_id, full_path = %group.full_path, "group marked for deletion");
                        return Ok(Some(group.full_path));
                    }
                    info!(
                        team_id = %team_id,
                        attempt = attempt,
                        "group not yet marked for deletion, retrying"
                    );
                }
                Err(err) if err.is_not_found() => return Ok(None),
                Err(err) => {
                    warn!(team_id = %team_id, attempt = attempt, error = %err, "error checking group status");
                }
            }
            tokio::time::sleep(self.deletion_poll_interval).await;
        }
        Err(ConnectorError::operation_failed(format!(
            "group {team_id} was not marked for deletion after {} attempts",
            self.deletion_poll_attempts
        )))
    }
}

#[async_trait]
impl TeamOps for GitlabConnector {
    async fn fetch_all_teams(&self) -> ConnectorResult<HashMap<String, Team>> {
        let mut teams = HashMap::new();
        self.paginate::<GitlabGroup>(
            &format!("/groups/{}/subgroups", self.parent_group_id),
            "",
            |items| {
                for group in items {
                    teams.insert(
                        group.name.clone(),
                        Team {
                            id: group.id.to_string(),
                            name: group.name,
                            ..Default::default()
                        },
                    );
                }
            },
        )
        .await?;

        info!(total_teams_count = teams.len(), "fetched gitlab subgroups");
        Ok(teams)
    }

    async fn fetch_team_details(&self, team_id: &str) -> ConnectorResult<Team> {
        let group: GitlabGroup = self.get_json(&format!("/groups/{team_id}"), team_id).await?;
        Ok(Team {
            id: group.id.to_string(),
            name: group.name,
            ..Default::default()
        })
    }

    async fn create_team(&self, team: &Team) -> ConnectorResult<Team> {
        let payload = serde_json::json!({
            "name": team.name,
            "path": team.name,
            "parent_id": self.parent_group_id.parse::<i64>().unwrap_or_default(),
            "visibility": "public",
        });

        let group = match self
            .post_json::<GitlabGroup>("/groups", &payload, &team.name)
            .await
        {
            Ok(group) => group,
            Err(err) if err.is_conflict() || is_bad_request(&err) => {
                info!(team = %team.name, "team already exists, fetching details");
                self.find_subgroup_by_name(&team.name)
                    .await?
                    .ok_or_else(|| ConnectorError::conflict(team.name.clone()))?
            }
            Err(err) => return Err(err),
        };

        if self.ldap_sync {
            self.add_to_ldap_group(group.id).await?;
            self.initiate_ldap_sync(group.id).await?;
        }

        if team.team_params.property == "project_access_paths" {
            for project_path in &team.team_params.value {
                self.add_group_as_project_developer(group.id, project_path)
                    .await?;
            }
        } else if !team.team_params.property.is_empty() {
            info!(
                property = %team.team_params.property,
                "unrecognized team param property for gitlab, skipping project access"
            );
        }

        Ok(Team {
            id: group.id.to_string(),
            name: group.name,
            ..Default::default()
        })
    }

    async fn delete_team_by_id(&self, team_id: &str) -> ConnectorResult<()> {
        // Phase 1: soft delete.
        match self.delete(&format!("/groups/{team_id}"), team_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        }
        info!(team_id = %team_id, "team soft-deleted");

        // Phase 2: wait for the pending-deletion flag.
        let Some(full_path) = self.poll_for_pending_deletion(team_id).await? else {
            return Ok(());
        };

        // Phase 3: hard delete with the fetched full path.
        self.delete(
            &format!(
                "/groups/{team_id}?permanently_remove=true&full_path={}",
                encode_path(&full_path)
            ),
            team_id,
        )
        .await?;
        info!(team_id = %team_id, "team hard-deleted");
        Ok(())
    }
}

#[async_trait]
impl MembershipOps for GitlabConnector {
    async fn fetch_team_members_by_team_id(
        &self,
        team_id: &str,
    ) -> ConnectorResult<HashMap<String, User>> {
        let mut members = HashMap::new();
        self.paginate::<GitlabMember>(&format!("/groups/{team_id}/members"), "", |items| {
            for member in items {
                members.insert(
                    member.id.to_string(),
                    User {
                        id: member.id.to_string(),
                        user_name: member.username,
                        display_name: member.name,
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
                "user_id": user_id.parse::<i64>().unwrap_or_default(),
                "access_level": DEVELOPER_ACCESS_LEVEL,
            });
            match self
                .post_json::<serde_json::Value>(
                    &format!("/groups/{team_id}/members"),
                    &payload,
                    user_id,
                )
                .await
            {
                Ok(_) => {}
                Err(err) if err.is_conflict() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn remove_users_from_team(
        &self,
        team_id: &str,
        user_ids: &[String],
    ) -> ConnectorResult<()> {
        for user_id in user_ids {
            match self
                .delete(&format!("/groups/{team_id}/members/{user_id}"), user_id)
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

fn is_bad_request(err: &ConnectorError) -> bool {
    matches!(err, ConnectorError::OperationFailed { message } if message.starts_with("status 400"))
}
