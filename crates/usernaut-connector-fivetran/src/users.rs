//! Fivetran user operations.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use usernaut_connector::{ConnectorError, ConnectorResult, UserOps};
use usernaut_core::User;

use crate::client::{Envelope, FivetranConnector};
use crate::ACCOUNT_REVIEWER_ROLE;

#[derive(Debug, Deserialize)]
struct FivetranUser {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
    #[serde(default)]
    role: String,
}

impl From<FivetranUser> for User {
    fn from(user: FivetranUser) -> Self {
        User {
            id: user.id,
            user_name: user.email.clone(),
            email: user.email,
            first_name: user.given_name,
            last_name: user.family_name,
            role: user.role,
            ..Default::default()
        }
    }
}

#[async_trait]
impl UserOps for FivetranConnector {
    async fn fetch_all_users(
        &self,
    ) -> ConnectorResult<(HashMap<String, User>, HashMap<String, User>)> {
        let mut by_id = HashMap::new();
        let mut by_email = HashMap::new();

        self.paginate::<FivetranUser>("/v1/users", |items| {
            for item in items {
                let user: User = item.into();
                if !user.email.is_empty() {
                    by_email.insert(user.email.clone(), user.clone());
                }
                by_id.insert(user.id.clone(), user);
            }
        })
        .await?;

        info!(total_user_count = by_id.len(), "fetched fivetran users");
        Ok((by_id, by_email))
    }

    async fn fetch_user_details(&self, user_id: &str) -> ConnectorResult<User> {
        let envelope: Envelope<FivetranUser> = self
            .get_json(&format!("/v1/users/{user_id}"), user_id)
            .await?;
        Ok(envelope.data.into())
    }

    async fn create_user(&self, user: &User) -> ConnectorResult<User> {
        let payload = serde_json::json!({
            "email": user.email,
            "given_name": user.first_name,
            "family_name": user.last_name,
            "role": if user.role.is_empty() { ACCOUNT_REVIEWER_ROLE } else { user.role.as_str() },
        });

        match self
            .post_json::<Envelope<FivetranUser>>("/v1/users", &payload, &user.email)
            .await
        {
            Ok(envelope) => {
                info!(email = %user.email, "created fivetran user");
                Ok(envelope.data.into())
            }
            Err(err) if err.is_conflict() => {
                warn!(email = %user.email, "user already exists, fetching existing");
                let (_, by_email) = self.fetch_all_users().await?;
                by_email
                    .get(&user.email)
                    .cloned()
                    .ok_or_else(|| ConnectorError::conflict(user.email.clone()))
            }
            Err(err) => Err(err),
        }
    }

    async fn delete_user(&self, user_id: &str) -> ConnectorResult<()> {
        match self.delete(&format!("/v1/users/{user_id}"), user_id).await {
            Ok(()) => {
                info!(user_id = %user_id, "deleted fivetran user");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                warn!(user_id = %user_id, "user already gone");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
