//! Fivetran HTTP client plumbing.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use usernaut_connector::http::{apply_auth, build_client, into_body, send_with_retry};
use usernaut_connector::{
    BackendSettings, BackendType, Connector, ConnectorResult, HttpClientConfig,
};

/// Adapter for one Fivetran account.
pub struct FivetranConnector {
    pub(crate) client: reqwest::Client,
    pub(crate) settings: BackendSettings,
    pub(crate) http: HttpClientConfig,
    display_name: String,
}

/// Fivetran wraps every response in `{code, message?, data}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[allow(dead_code)]
    pub code: String,
    pub data: T,
}

/// Paginated list payload.
#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl FivetranConnector {
    pub fn new(settings: &BackendSettings, http: &HttpClientConfig) -> ConnectorResult<Self> {
        settings.connection.validate()?;
        Ok(Self {
            client: build_client(http)?,
            display_name: format!("fivetran: {}", settings.name),
            settings: settings.clone(),
            http: http.clone(),
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.connection.base_url, path)
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

    pub(crate) async fn delete(&self, path: &str, identifier: &str) -> ConnectorResult<()> {
        let request =
            apply_auth(self.client.delete(self.url(path)), &self.settings.connection.auth);
        let response = send_with_retry(request, &self.http).await?;
        into_body(response, identifier).await?;
        Ok(())
    }

    /// Walk a cursor-paginated listing, feeding each page to `collect`.
    pub(crate) async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        mut collect: impl FnMut(Vec<T>),
    ) -> ConnectorResult<()> {
        let mut cursor: Option<String> = None;
        loop {
            let page_path = match &cursor {
                Some(cursor) => format!("{path}?limit=100&cursor={cursor}"),
                None => format!("{path}?limit=100"),
            };
            let envelope: Envelope<Page<T>> = self.get_json(&page_path, path).await?;
            collect(envelope.data.items);
            match envelope.data.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(()),
            }
        }
    }
}

#[usernaut_connector::async_trait]
impl Connector for FivetranConnector {
    fn backend_type(&self) -> BackendType {
        BackendType::Fivetran
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}
