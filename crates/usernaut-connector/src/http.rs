//! Shared HTTP plumbing for the REST adapters.
//!
//! Every adapter sends through [`send_with_retry`]: bounded exponential
//! backoff on transient statuses and connection errors, honoring
//! `Retry-After` on 429.

use std::time::Duration;

use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use tracing::warn;

use crate::config::{AuthConfig, HttpClientConfig};
use crate::error::{ConnectorError, ConnectorResult};

/// Build the pooled client every adapter clones.
pub fn build_client(config: &HttpClientConfig) -> ConnectorResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build()
        .map_err(|e| ConnectorError::invalid_config(format!("failed to build HTTP client: {e}")))
}

/// Apply the configured authentication to a request.
pub fn apply_auth(builder: RequestBuilder, auth: &AuthConfig) -> RequestBuilder {
    match auth {
        AuthConfig::None => builder,
        AuthConfig::Basic { username, password } => builder.basic_auth(username, Some(password)),
        AuthConfig::Bearer { token } => builder.bearer_auth(token),
        AuthConfig::ApiKey { key, header_name } => builder.header(header_name, key),
    }
}

/// Send a request, retrying transient failures with exponential backoff.
///
/// The builder must be cloneable (no streaming bodies); adapters only
/// send JSON, so this always holds.
pub async fn send_with_retry(
    request: RequestBuilder,
    config: &HttpClientConfig,
) -> ConnectorResult<Response> {
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let req = request
            .try_clone()
            .ok_or_else(|| ConnectorError::invalid_config("request body is not cloneable"))?;

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                if !should_retry_status(status) || attempt > config.max_retries {
                    return Ok(response);
                }

                let wait = if status == StatusCode::TOO_MANY_REQUESTS {
                    retry_after(&response).unwrap_or_else(|| backoff(config, attempt))
                } else {
                    backoff(config, attempt)
                };
                warn!(
                    status = %status,
                    attempt = attempt,
                    wait_ms = wait.as_millis() as u64,
                    "transient backend response, retrying"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => {
                let retriable = err.is_timeout() || err.is_connect();
                if !retriable || attempt > config.max_retries {
                    return Err(err.into());
                }
                let wait = backoff(config, attempt);
                warn!(
                    error = %err,
                    attempt = attempt,
                    wait_ms = wait.as_millis() as u64,
                    "request failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Read the response body and map non-success statuses to the error
/// taxonomy.
pub async fn into_body(response: Response, identifier: &str) -> ConnectorResult<String> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_success() {
        Ok(body)
    } else {
        Err(ConnectorError::from_status(status, &body, identifier))
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff(config: &HttpClientConfig, attempt: u32) -> Duration {
    let exp = config
        .initial_backoff_ms
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    Duration::from_millis(exp.min(config.max_backoff_ms))
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
