//! LDAP connection management and user lookups.
//!
//! The connection is long-lived: dialed and anonymously bound once, then
//! reused across searches. When a search fails with a transport-level
//! error the cached handle is dropped and the lookup retried once over a
//! fresh connection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{LdapError, LdapResult, LdapUser};

/// LDAP result code for "no such object".
const RC_NO_SUCH_OBJECT: u32 = 32;

/// Directory connection and search parameters, from configuration.
///
/// `user_dn` is a template containing `{uid}`, substituted (escaped) per
/// lookup; `base_user_dn` is the subtree base for email searches.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapSettings {
    pub server: String,
    #[serde(rename = "baseDN")]
    pub base_dn: String,
    #[serde(rename = "userDN")]
    pub user_dn: String,
    #[serde(rename = "baseUserDN")]
    pub base_user_dn: String,
    pub user_search_filter: String,
    #[serde(default = "default_attributes")]
    pub attributes: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_attributes() -> Vec<String> {
    ["mail", "uid", "cn", "sn", "displayName"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_timeout_secs() -> u64 {
    5
}

/// The resolver contract consumed by the reconciler and offboarding job.
#[async_trait]
pub trait LdapResolver: Send + Sync {
    /// Look up a user by directory uid (username).
    async fn get_by_username(&self, uid: &str) -> LdapResult<LdapUser>;

    /// Look up a user by email address.
    async fn get_by_email(&self, email: &str) -> LdapResult<LdapUser>;
}

/// Production resolver over `ldap3`.
pub struct LdapClient {
    settings: LdapSettings,
    connection: Arc<RwLock<Option<Ldap>>>,
}

impl LdapClient {
    /// Dial and bind eagerly so misconfiguration fails at startup.
    pub async fn connect(settings: LdapSettings) -> LdapResult<Self> {
        let client = Self {
            settings,
            connection: Arc::new(RwLock::new(None)),
        };
        client.get_connection().await?;
        Ok(client)
    }

    async fn get_connection(&self) -> LdapResult<Ldap> {
        {
            let guard = self.connection.read().await;
            if let Some(ref conn) = *guard {
                return Ok(conn.clone());
            }
        }

        let conn = self.dial().await?;
        let mut guard = self.connection.write().await;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn dial(&self) -> LdapResult<Ldap> {
        let conn_settings = LdapConnSettings::new()
            .set_conn_timeout(std::time::Duration::from_secs(self.settings.connect_timeout_secs));

        let (conn, mut ldap) = LdapConnAsync::with_settings(conn_settings, &self.settings.server)
            .await
            .map_err(|e| LdapError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        // Anonymous bind, the directory allows unauthenticated reads.
        ldap.simple_bind("", "")
            .await
            .map_err(|e| LdapError::Bind(e.to_string()))?
            .success()
            .map_err(|e| LdapError::Bind(e.to_string()))?;

        debug!(server = %self.settings.server, "LDAP connection established");
        Ok(ldap)
    }

    async fn reset_connection(&self) {
        let mut guard = self.connection.write().await;
        *guard = None;
    }

    /// Run one search, retrying once over a fresh connection when the
    /// transport dropped underneath us.
    async fn search(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
    ) -> LdapResult<LdapUser> {
        match self.search_once(base, scope, filter).await {
            Err(LdapError::Search(err)) if is_connection_error(&err) => {
                warn!(error = %err, "LDAP connection lost, redialing");
                self.reset_connection().await;
                self.search_once(base, scope, filter).await
            }
            other => other,
        }
    }

    async fn search_once(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
    ) -> LdapResult<LdapUser> {
        let mut conn = self.get_connection().await?;
        let attrs: Vec<&str> = self.settings.attributes.iter().map(String::as_str).collect();

        let result = conn.search(base, scope, filter, attrs).await?;
        let (entries, _) = match result.success() {
            Ok(ok) => ok,
            Err(ldap3::LdapError::LdapResult { result }) if result.rc == RC_NO_SUCH_OBJECT => {
                return Err(LdapError::NoUserFound);
            }
            Err(err) => return Err(err.into()),
        };

        let Some(entry) = entries.into_iter().next() else {
            return Err(LdapError::NoUserFound);
        };

        let entry = SearchEntry::construct(entry);
        let mut attributes = HashMap::with_capacity(self.settings.attributes.len());
        for attr in &self.settings.attributes {
            let value = entry
                .attrs
                .get(attr)
                .and_then(|values| values.first())
                .cloned()
                .unwrap_or_default();
            attributes.insert(attr.clone(), value);
        }
        Ok(LdapUser::new(attributes))
    }
}

#[async_trait]
impl LdapResolver for LdapClient {
    async fn get_by_username(&self, uid: &str) -> LdapResult<LdapUser> {
        let base = self.settings.user_dn.replace("{uid}", &escape_filter(uid));
        let filter = format!("({})", self.settings.user_search_filter);
        debug!(uid = %uid, "fetching user LDAP data");
        self.search(&base, Scope::Base, &filter).await
    }

    async fn get_by_email(&self, email: &str) -> LdapResult<LdapUser> {
        let filter = format!(
            "(&({})(mail={}))",
            self.settings.user_search_filter,
            escape_filter(email)
        );
        debug!(email = %email, "fetching user LDAP data by email");
        self.search(&self.settings.base_user_dn, Scope::Subtree, &filter)
            .await
    }
}

fn is_connection_error(err: &ldap3::LdapError) -> bool {
    matches!(
        err,
        ldap3::LdapError::Io { .. } | ldap3::LdapError::EndOfStream
    )
}

/// Escape special characters in LDAP filter values (RFC 4515).
fn escape_filter(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}
