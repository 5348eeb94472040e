//! Snowflake user operations and the post-preload continuation stream.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use usernaut_connector::{ConnectorError, ConnectorResult, UserOps};
use usernaut_core::User;

use crate::client::SnowflakeConnector;

#[derive(Debug, Deserialize)]
struct SnowflakeUser {
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: String,
}

impl From<SnowflakeUser> for User {
    fn from(user: SnowflakeUser) -> Self {
        // Snowflake identities are case-insensitive; normalize before
        // anything reaches the store layer.
        User {
            id: user.name.to_lowercase(),
            user_name: user.name.to_lowercase(),
            email: user.email.to_lowercase(),
            display_name: user.display_name,
            ..Default::default()
        }
    }
}

/// Receiver half of the user continuation: each item is one user or the
/// error that ended the stream.
pub type UserStream = mpsc::Receiver<ConnectorResult<User>>;

impl SnowflakeConnector {
    fn users_path(&self, from_name: Option<&str>) -> String {
        match from_name {
            Some(cursor) => format!(
                "/api/v2/users?showLimit={}&fromName={}",
                self.page_limit, cursor
            ),
            None => format!("/api/v2/users?showLimit={}", self.page_limit),
        }
    }

    /// One page of users plus the cursor for the next page.
    async fn fetch_user_page(
        &self,
        from_name: Option<&str>,
    ) -> ConnectorResult<(Vec<User>, Option<String>)> {
        let raw: Vec<SnowflakeUser> = self
            .json_with_polling(Method::GET, &self.users_path(from_name), None, "users")
            .await?;

        let cursor = if raw.len() < self.page_limit {
            None
        } else {
            raw.last().map(|u| u.name.clone())
        };
        Ok((raw.into_iter().map(User::from).collect(), cursor))
    }

    /// Fetch all users, also returning the final cursor so a caller can
    /// resume later with [`fetch_remaining_users`].
    pub async fn fetch_all_users_with_cursor(
        &self,
    ) -> ConnectorResult<(HashMap<String, User>, HashMap<String, User>, Option<String>)> {
        let mut by_id = HashMap::new();
        let mut by_email = HashMap::new();
        let mut cursor: Option<String> = None;
        let mut last_seen: Option<String> = None;

        loop {
            let (users, next) = self.fetch_user_page(cursor.as_deref()).await?;
            for user in users {
                last_seen = Some(user.user_name.clone());
                if !user.email.is_empty() {
                    by_email.insert(user.email.clone(), user.clone());
                }
                by_id.insert(user.id.clone(), user);
            }
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(total_user_count = by_id.len(), "fetched snowflake users");
        Ok((by_id, by_email, last_seen))
    }

    /// Continue fetching users from a cursor, yielding them over a
    /// bounded channel. The channel closes when the listing is exhausted
    /// or after delivering the terminal error.
    pub fn fetch_remaining_users(&self, from_name: String) -> UserStream {
        let (tx, rx) = mpsc::channel(1_000);
        let connector = self.clone();

        tokio::spawn(async move {
            let mut cursor = Some(from_name);
            while let Some(current) = cursor {
                match connector.fetch_user_page(Some(&current)).await {
                    Ok((users, next)) => {
                        for user in users {
                            if tx.send(Ok(user)).await.is_err() {
                                return;
                            }
                        }
                        cursor = next;
                    }
                    Err(err) => {
                        warn!(error = %err, "error fetching snowflake user batch");
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }
            }
        });

        rx
    }
}

#[async_trait]
impl UserOps for SnowflakeConnector {
    async fn fetch_all_users(
        &self,
    ) -> ConnectorResult<(HashMap<String, User>, HashMap<String, User>)> {
        let (by_id, by_email, _) = self.fetch_all_users_with_cursor().await?;
        Ok((by_id, by_email))
    }

    async fn fetch_user_details(&self, user_id: &str) -> ConnectorResult<User> {
        let user: SnowflakeUser = self
            .json_with_polling(
                Method::GET,
                &format!("/api/v2/users/{user_id}"),
                None,
                user_id,
            )
            .await?;
        Ok(user.into())
    }

    async fn create_user(&self, user: &User) -> ConnectorResult<User> {
        if user.email.is_empty() || user.user_name.is_empty() {
            return Err(ConnectorError::invalid_config(
                "email and username are required for snowflake user creation",
            ));
        }

        let mut payload = serde_json::json!({
            "name": user.user_name,
            "email": user.email,
        });
        if !user.display_name.is_empty() {
            payload["displayName"] = serde_json::Value::String(user.display_name.clone());
        }

        match self
            .json_with_polling::<SnowflakeUser>(
                Method::POST,
                "/api/v2/users",
                Some(&payload),
                &user.user_name,
            )
            .await
        {
            Ok(created) => {
                info!(user = %user.user_name, "created snowflake user");
                Ok(created.into())
            }
            Err(err) if err.is_conflict() => {
                info!(user = %user.user_name, "user already exists, fetching details");
                self.fetch_user_details(&user.user_name).await
            }
            Err(err) => Err(err),
        }
    }

    async fn delete_user(&self, user_id: &str) -> ConnectorResult<()> {
        let (status, body) = self
            .request_with_polling(
                Method::DELETE,
                &format!("/api/v2/users/{user_id}"),
                None,
                user_id,
            )
            .await?;
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            info!(user = %user_id, "deleted snowflake user");
            return Ok(());
        }
        Err(ConnectorError::from_status(status, &body, user_id))
    }
}
