//! Snowflake HTTP client plumbing with 202-polling.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use usernaut_connector::http::{apply_auth, build_client, send_with_retry};
use usernaut_connector::{
    BackendSettings, BackendType, Connector, ConnectorError, ConnectorResult, HttpClientConfig,
};

/// Adapter for one Snowflake account. Cloneable so the user-continuation
/// task can own its own handle.
#[derive(Clone)]
pub struct SnowflakeConnector {
    pub(crate) client: reqwest::Client,
    pub(crate) settings: BackendSettings,
    pub(crate) http: HttpClientConfig,
    pub(crate) page_limit: usize,
    pub(crate) poll_attempts: u32,
    pub(crate) poll_interval: Duration,
    display_name: String,
}

impl SnowflakeConnector {
    pub fn new(settings: &BackendSettings, http: &HttpClientConfig) -> ConnectorResult<Self> {
        settings.connection.validate()?;
        Ok(Self {
            client: build_client(http)?,
            display_name: format!("snowflake: {}", settings.name),
            settings: settings.clone(),
            http: http.clone(),
            page_limit: 10_000,
            poll_attempts: 10,
            poll_interval: Duration::from_secs(1),
        })
    }

    /// Shrink page size and polling for tests.
    #[must_use]
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    #[must_use]
    pub fn with_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_interval = interval;
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.connection.base_url, path)
    }

    /// Send a request; when the service answers `202 Accepted`, poll the
    /// `Location` it hands back until the result materializes.
    pub(crate) async fn request_with_polling(
        &self,
        method: Method,
        path: &str,
        payload: Option<&serde_json::Value>,
        identifier: &str,
    ) -> ConnectorResult<(StatusCode, String)> {
        let mut builder = self.client.request(method, self.url(path));
        if let Some(payload) = payload {
            builder = builder.json(payload);
        }
        builder = apply_auth(builder, &self.settings.connection.auth);

        let mut response = send_with_retry(builder, &self.http).await?;

        let mut attempt = 0;
        while response.status() == StatusCode::ACCEPTED {
            attempt += 1;
            if attempt > self.poll_attempts {
                return Err(ConnectorError::operation_failed(format!(
                    "statement for '{identifier}' still pending after {} polls",
                    self.poll_attempts
                )));
            }
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
                .ok_or_else(|| {
                    ConnectorError::operation_failed("202 response without Location header")
                })?;

            debug!(location = %location, attempt = attempt, "polling pending snowflake result");
            tokio::time::sleep(self.poll_interval).await;

            let poll = apply_auth(self.client.get(self.url(&location)), &self.settings.connection.auth);
            response = send_with_retry(poll, &self.http).await?;
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok((status, body))
    }

    /// Like [`request_with_polling`] but maps non-success statuses to the
    /// error taxonomy and decodes the body.
    pub(crate) async fn json_with_polling<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&serde_json::Value>,
        identifier: &str,
    ) -> ConnectorResult<T> {
        let (status, body) = self
            .request_with_polling(method, path, payload, identifier)
            .await?;
        if !status.is_success() {
            return Err(ConnectorError::from_status(status, &body, identifier));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[usernaut_connector::async_trait]
impl Connector for SnowflakeConnector {
    fn backend_type(&self) -> BackendType {
        BackendType::Snowflake
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}
