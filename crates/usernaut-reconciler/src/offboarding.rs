//! Daily user offboarding sweep.
//!
//! Every cached user is checked against the directory. A user the
//! directory no longer knows (or knows only as an empty record) is
//! removed from every backend usernaut manages directly - git hosting
//! and the directory itself are skipped, their own lifecycle handles
//! accounts there - and then dropped from the User store.
//!
//! Group membership lists and the reverse index are intentionally left
//! alone: groups are owned by their spec authors, and the query API
//! filters dangling reverse-index references defensively.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use usernaut_connector::{BackendType, ConnectorRegistry};
use usernaut_core::parse_backend_key;
use usernaut_ldap::LdapResolver;
use usernaut_store::Store;

use crate::jobs::{JobError, PeriodicTask};
use crate::CacheMutex;

/// Unique identifier of the offboarding job.
pub const USER_OFFBOARDING_JOB_NAME: &str = "usernaut_user_offboarding";

/// Default sweep interval: daily cleanup of inactive users.
pub const USER_OFFBOARDING_JOB_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// The LDAP-vs-cache reconciliation job.
pub struct UserOffboardingJob {
    store: Arc<Store>,
    ldap: Arc<dyn LdapResolver>,
    registry: Arc<ConnectorRegistry>,
    cache_mutex: CacheMutex,
    interval: Duration,
}

impl UserOffboardingJob {
    pub fn new(
        store: Arc<Store>,
        ldap: Arc<dyn LdapResolver>,
        registry: Arc<ConnectorRegistry>,
        cache_mutex: CacheMutex,
    ) -> Self {
        Self {
            store,
            ldap,
            registry,
            cache_mutex,
            interval: USER_OFFBOARDING_JOB_INTERVAL,
        }
    }

    /// Override the sweep interval (config key
    /// `usernaut_user_offboarding_job_interval`).
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One full sweep. Public so tests and manual triggers can run it
    /// outside the scheduler.
    pub async fn sweep(&self) -> Result<(), JobError> {
        let emails = self.user_emails_from_cache().await?;
        info!(count = emails.len(), "found users in cache");

        let mut offboarded = Vec::new();
        let mut errors = Vec::new();

        for email in &emails {
            match self.is_user_active(email).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(user = %email, "user is inactive in LDAP, starting offboarding");
                    match self.offboard_user(email).await {
                        Ok(()) => offboarded.push(email.clone()),
                        Err(err) => errors.push(format!("failed to offboard user {email}: {err}")),
                    }
                }
                Err(err) => {
                    errors.push(format!("failed to check LDAP for user {email}: {err}"));
                }
            }
        }

        info!(
            total_users = emails.len(),
            offboarded_users = offboarded.len(),
            errors = errors.len(),
            "user offboarding sweep completed"
        );
        if !offboarded.is_empty() {
            info!(removed_users = ?offboarded, total_count = offboarded.len(), "offboarded users summary");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(JobError::new(format!(
                "user offboarding completed with {} errors: {}",
                errors.len(),
                errors.join("; ")
            )))
        }
    }

    async fn user_emails_from_cache(&self) -> Result<Vec<String>, JobError> {
        let _guard = self.cache_mutex.read().await;
        let users = self
            .store
            .user
            .get_by_pattern("*")
            .await
            .map_err(|err| JobError::new(format!("failed to get user list from cache: {err}")))?;

        // The reverse index shares the user: prefix; the store already
        // drops entries that are not backend maps, this guards the key
        // shape as well.
        Ok(users
            .into_keys()
            .filter(|email| !email.starts_with("groups:"))
            .collect())
    }

    /// Active means the directory returns a non-empty record. NotFound,
    /// "no such object", and empty attribute sets all mean inactive.
    async fn is_user_active(&self, email: &str) -> Result<bool, JobError> {
        match self.ldap.get_by_email(email).await {
            Ok(user) => {
                if user.is_empty() {
                    info!(user = %email, "LDAP record is empty, treating as inactive");
                    Ok(false)
                } else {
                    Ok(true)
                }
            }
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(JobError::new(err.to_string())),
        }
    }

    async fn offboard_user(&self, email: &str) -> Result<(), JobError> {
        let backends = {
            let _guard = self.cache_mutex.read().await;
            self.store
                .user
                .get_backends(email)
                .await
                .map_err(|err| JobError::new(format!("failed to get user data from cache: {err}")))?
        };

        let mut errors = Vec::new();
        for (backend_key, user_id) in &backends {
            let Ok((name, type_)) = parse_backend_key(backend_key) else {
                info!(backend = %backend_key, "skipping backend with invalid key format");
                continue;
            };

            match BackendType::from_str(&type_) {
                Ok(backend_type) if backend_type.skip_offboarding() => {
                    info!(
                        user = %email,
                        backend = %backend_key,
                        "skipping user offboarding for excluded backend type"
                    );
                    continue;
                }
                Ok(_) => {}
                Err(_) => {
                    warn!(backend = %backend_key, "skipping backend with unknown type");
                    continue;
                }
            }

            let connector = match self.registry.create(&name, &type_) {
                Ok(connector) => connector,
                Err(err) => {
                    errors.push(format!("backend {backend_key}: {err}"));
                    continue;
                }
            };

            match connector.delete_user(user_id).await {
                Ok(()) => {
                    info!(
                        user = %email,
                        backend_user_id = %user_id,
                        backend = %backend_key,
                        "removed user from backend"
                    );
                }
                Err(err) => {
                    errors.push(format!("backend {backend_key}: {err}"));
                }
            }
        }

        if !errors.is_empty() {
            return Err(JobError::new(format!(
                "failed to remove user from some backends: {}",
                errors.join("; ")
            )));
        }

        let _guard = self.cache_mutex.write().await;
        self.store
            .user
            .delete(email)
            .await
            .map_err(|err| JobError::new(format!("failed to remove user from cache: {err}")))?;
        Ok(())
    }
}

#[async_trait]
impl PeriodicTask for UserOffboardingJob {
    fn name(&self) -> &str {
        USER_OFFBOARDING_JOB_NAME
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<(), JobError> {
        info!("starting user offboarding job");
        self.sweep().await
    }
}
