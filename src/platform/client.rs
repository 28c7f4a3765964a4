//! HTTP client for the external email/list platform.
//!
//! Transient failures (transport errors, 5xx, 429) are retried with
//! exponential backoff up to a bounded attempt count; anything that
//! survives the retries surfaces as a processing failure for the one
//! feed being handled.

use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::config::PlatformConfig;
use crate::platform::types::{ListUpdate, MailingList, Subscriber, Template, TransactionalSend};
use crate::platform::Platform;
use crate::{RelayError, Result};

/// Reqwest-backed implementation of [`Platform`].
pub struct HttpPlatform {
    client: Client,
    base_url: String,
    api_key: String,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl HttpPlatform {
    /// Create a client from platform configuration.
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelayError::Platform(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry_attempts: config.retry_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Execute a request, retrying transient failures with backoff.
    async fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        let url = format!("{}/{}", self.base_url, path);
        let mut attempt = 0u32;
        let mut backoff = self.retry_backoff;

        loop {
            attempt += 1;
            let mut request = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&self.api_key);
            if let Some(body) = body {
                request = request.json(body);
            }

            let outcome = request.send().await;
            let transient = match &outcome {
                Ok(response) => {
                    response.status().is_server_error()
                        || response.status() == StatusCode::TOO_MANY_REQUESTS
                }
                Err(_) => true,
            };

            if transient && attempt <= self.retry_attempts {
                warn!(path, attempt, "platform call failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                continue;
            }

            return match outcome {
                Ok(response) if response.status().is_success() => Ok(response),
                Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                    Err(RelayError::NotFound(path.to_string()))
                }
                Ok(response) => Err(RelayError::Platform(format!(
                    "{path}: HTTP {}",
                    response.status()
                ))),
                Err(e) => Err(RelayError::Platform(format!("{path}: {e}"))),
            };
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(Method::GET, path, None).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RelayError::Platform(format!("decoding {path}: {e}")))
    }
}

impl Platform for HttpPlatform {
    async fn all_lists(&self) -> Result<Vec<MailingList>> {
        self.get_json("lists").await
    }

    async fn get_list(&self, id: &str) -> Result<MailingList> {
        self.get_json(&format!("lists/{id}")).await
    }

    async fn update_list(&self, id: &str, update: &ListUpdate) -> Result<()> {
        let body = serde_json::to_value(update)
            .map_err(|e| RelayError::Platform(format!("encoding list update: {e}")))?;
        self.execute(Method::PUT, &format!("lists/{id}"), Some(&body))
            .await?;
        Ok(())
    }

    async fn list_subscribers(&self, list_id: &str) -> Result<Vec<Subscriber>> {
        self.get_json(&format!("lists/{list_id}/subscribers")).await
    }

    async fn find_template(&self, name: &str) -> Result<Option<Template>> {
        let templates: Vec<Template> = self.get_json("templates").await?;
        Ok(templates.into_iter().find(|t| t.name == name))
    }

    async fn send_transactional(&self, send: &TransactionalSend) -> Result<()> {
        let body = serde_json::to_value(send)
            .map_err(|e| RelayError::Platform(format!("encoding send: {e}")))?;
        self.execute(Method::POST, "transactional", Some(&body))
            .await?;
        Ok(())
    }
}
