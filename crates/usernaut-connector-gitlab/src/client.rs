//! GitLab HTTP client plumbing and LDAP-sync mode state.

use std::time::Duration;

use serde::de::DeserializeOwned;
use usernaut_connector::http::{apply_auth, build_client, into_body, send_with_retry};
use usernaut_connector::{
    BackendSettings, BackendType, Connector, ConnectorResult, HttpClientConfig, LdapSyncOps,
};

/// Adapter for one GitLab instance.
pub struct GitlabConnector {
    pub(crate) client: reqwest::Client,
    pub(crate) settings: BackendSettings,
    pub(crate) http: HttpClientConfig,
    pub(crate) parent_group_id: String,
    pub(crate) ldap_provider: String,
    /// Whether a directory dependency is configured. When set, user
    /// listings come from the directory side and the GitLab user API is
    /// not enumerated.
    pub(crate) dependant_exists: bool,
    /// Per-reconcile LDAP-sync mode and the CN it binds to.
    pub(crate) ldap_sync: bool,
    pub(crate) cn: String,
    pub(crate) deletion_poll_attempts: u32,
    pub(crate) deletion_poll_interval: Duration,
    display_name: String,
}

impl GitlabConnector {
    pub fn new(settings: &BackendSettings, http: &HttpClientConfig) -> ConnectorResult<Self> {
        settings.connection.validate()?;
        let parent_group_id = settings.connection.require_param("parent_group_id")?.to_string();
        let ldap_provider = settings
            .connection
            .param("ldap_provider")
            .unwrap_or("ldapmain")
            .to_string();

        Ok(Self {
            client: build_client(http)?,
            display_name: format!("gitlab: {}", settings.name),
            parent_group_id,
            ldap_provider,
            dependant_exists: settings.depends_on.is_some(),
            ldap_sync: false,
            cn: String::new(),
            deletion_poll_attempts: 5,
            deletion_poll_interval: Duration::from_secs(5),
            settings: settings.clone(),
            http: http.clone(),
        })
    }

    /// Shrink the soft-delete poll for tests.
    #[must_use]
    pub fn with_deletion_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.deletion_poll_attempts = attempts;
        self.deletion_poll_interval = interval;
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/api/v4{}", self.settings.connection.base_url, path)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        identifier: &str,
    ) -> ConnectorResult<T> {
        let request = apply_auth(self.client.get(self.url(path)), &self.settings.connection.auth);
        let response = send_with_retry(request, &self.http).await?;
        let body = into_body(response, identifier).await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &serde_json::Value,
        identifier: &str,
    ) -> ConnectorResult<T> {
        let request = apply_auth(
            self.client.post(self.url(path)).json(payload),
            &self.settings.connection.auth,
        );
        let response = send_with_retry(request, &self.http).await?;
        let body = into_body(response, identifier).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// POST where only the status matters (sync triggers, shares).
    pub(crate) async fn post_status(
        &self,
        path: &str,
        payload: &serde_json::Value,
        identifier: &str,
    ) -> ConnectorResult<u16> {
        let request = apply_auth(
            self.client.post(self.url(path)).json(payload),
            &self.settings.connection.auth,
        );
        let response = send_with_retry(request, &self.http).await?;
        let status = response.status();
        into_body(response, identifier).await?;
        Ok(status.as_u16())
    }

    pub(crate) async fn delete(&self, path: &str, identifier: &str) -> ConnectorResult<()> {
        let request =
            apply_auth(self.client.delete(self.url(path)), &self.settings.connection.auth);
        let response = send_with_retry(request, &self.http).await?;
        into_body(response, identifier).await?;
        Ok(())
    }

    /// Walk an offset-paginated listing (`per_page`/`page`), feeding each
    /// page to `collect`, stopping on a short page.
    pub(crate) async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        extra_query: &str,
        mut collect: impl FnMut(Vec<T>),
    ) -> ConnectorResult<()> {
        const PER_PAGE: usize = 100;
        let mut page = 1usize;
        loop {
            let sep = if path.contains('?') { '&' } else { '?' };
            let page_path = format!("{path}{sep}per_page={PER_PAGE}&page={page}{extra_query}");
            let items: Vec<T> = self.get_json(&page_path, path).await?;
            let count = items.len();
            collect(items);
            if count < PER_PAGE {
                return Ok(());
            }
            page += 1;
        }
    }
}

/// Percent-encode a project path for use as a path parameter.
pub(crate) fn encode_path(path: &str) -> String {
    path.replace('/', "%2F")
}

impl LdapSyncOps for GitlabConnector {
    fn enable_ldap_sync(&mut self, group_name: &str) {
        self.ldap_sync = true;
        self.cn = group_name.to_string();
    }

    fn ldap_sync_enabled(&self) -> bool {
        self.ldap_sync
    }
}

#[usernaut_connector::async_trait]
impl Connector for GitlabConnector {
    fn backend_type(&self) -> BackendType {
        BackendType::Gitlab
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn as_ldap_sync_mut(&mut self) -> Option<&mut dyn LdapSyncOps> {
        Some(self)
    }
}
