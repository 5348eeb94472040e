//! GitLab user operations.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use usernaut_connector::{ConnectorError, ConnectorResult, UserOps};
use usernaut_core::User;

use crate::client::GitlabConnector;

#[derive(Debug, Deserialize)]
struct GitlabUser {
    id: i64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
}

impl From<GitlabUser> for User {
    fn from(user: GitlabUser) -> Self {
        User {
            id: user.id.to_string(),
            email: user.email,
            user_name: user.username,
            display_name: user.name,
            ..Default::default()
        }
    }
}

impl GitlabConnector {
    async fn find_user_by_username(&self, username: &str) -> ConnectorResult<Option<User>> {
        let users: Vec<GitlabUser> = self
            .get_json(&format!("/users?username={username}"), username)
            .await?;
        Ok(users.into_iter().next().map(User::from))
    }
}

#[async_trait]
impl UserOps for GitlabConnector {
    async fn fetch_all_users(
        &self,
    ) -> ConnectorResult<(HashMap<String, User>, HashMap<String, User>)> {
        let mut by_id = HashMap::new();
        let mut by_email = HashMap::new();

        if self.dependant_exists {
            // Accounts come from the directory side; enumerating the
            // GitLab user API would be redundant and slow.
            return Ok((by_id, by_email));
        }

        self.paginate::<GitlabUser>("/users", "&active=true&humans=true", |items| {
            for item in items {
                let user: User = item.into();
                if !user.email.is_empty() {
                    by_email.insert(user.email.clone(), user.clone());
                }
                by_id.insert(user.id.clone(), user);
            }
        })
        .await?;

        info!(total_user_count = by_id.len(), "fetched gitlab users");
        Ok((by_id, by_email))
    }

    async fn fetch_user_details(&self, user_id: &str) -> ConnectorResult<User> {
        if user_id.parse::<i64>().is_ok() {
            let user: GitlabUser = self.get_json(&format!("/users/{user_id}"), user_id).await?;
            return Ok(user.into());
        }

        // Not numeric: treat as a username.
        match self.find_user_by_username(user_id).await? {
            Some(user) => Ok(user),
            None => {
                // The user never logged in, so GitLab has no record yet.
                // Return a username-shaped placeholder so membership math
                // stays total; the directory sync will materialize the
                // account later.
                warn!(user = %user_id, "user not found in gitlab, returning placeholder");
                Ok(User {
                    id: user_id.to_string(),
                    user_name: user_id.to_string(),
                    ..Default::default()
                })
            }
        }
    }

    async fn create_user(&self, user: &User) -> ConnectorResult<User> {
        if self.ldap_sync {
            // The directory provisions accounts; resolve instead of create.
            let mut resolved = self.fetch_user_details(&user.user_name).await?;
            if resolved.email.is_empty() {
                resolved.email = user.email.clone();
            }
            return Ok(resolved);
        }

        let payload = serde_json::json!({
            "email": user.email,
            "username": user.user_name,
            "name": if user.display_name.is_empty() { &user.user_name } else { &user.display_name },
            "reset_password": true,
        });

        match self.post_json::<GitlabUser>("/users", &payload, &user.email).await {
            Ok(created) => {
                info!(username = %user.user_name, "created gitlab user");
                Ok(created.into())
            }
            Err(err) if err.is_conflict() => self
                .find_user_by_username(&user.user_name)
                .await?
                .ok_or_else(|| ConnectorError::conflict(user.user_name.clone())),
            Err(err) => Err(err),
        }
    }

    async fn delete_user(&self, user_id: &str) -> ConnectorResult<()> {
        if self.ldap_sync {
            // Directory-owned lifecycle.
            return Ok(());
        }

        match self.delete(&format!("/users/{user_id}"), user_id).await {
            Ok(()) => {
                info!(user_id = %user_id, "deleted gitlab user");
                Ok(())
            }
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }
}
