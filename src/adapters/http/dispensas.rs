//! External dispensa source client.
//!
//! Authenticated with a static bearer token. `list_all` tolerates both a
//! bare JSON list and a `{ "data": [...] }` envelope; `get_by_id` maps a
//! 404 to `None`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::warn;

use crate::domain::errors::{DomainResult, ExternalApiError};
use crate::domain::models::Dispensa;
use crate::domain::ports::DispensaSource;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct DispensaApiConfig {
    pub base_url: String,
    pub auth_token: String,
    pub timeout_seconds: u64,
}

impl DispensaApiConfig {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: auth_token.into(),
            timeout_seconds: 30,
        }
    }
}

/// HTTP client for the external dispensa source.
pub struct DispensaApiClient {
    http: reqwest::Client,
    config: DispensaApiConfig,
}

impl DispensaApiClient {
    pub fn new(config: DispensaApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn authorized(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.config.auth_token))
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.config.timeout_seconds))
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

#[async_trait]
impl DispensaSource for DispensaApiClient {
    async fn list_all(&self) -> DomainResult<Vec<Dispensa>> {
        let url = format!("{}/get-all", self.base());
        let response = self
            .authorized(&url)
            .send()
            .await
            .map_err(|e| ExternalApiError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            let err = if status >= 500 {
                ExternalApiError::ServerError { status, message }
            } else {
                ExternalApiError::PermanentError { status, message }
            };
            return Err(err.into());
        }

        let data = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ExternalApiError::InvalidResponse(e.to_string()))?;

        let items = match data {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut obj) => match obj.remove("data") {
                Some(serde_json::Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        Ok(items.into_iter().map(Dispensa::from_raw).collect())
    }

    async fn get_by_id(&self, id: &str) -> DomainResult<Option<Dispensa>> {
        let url = format!("{}/dispensas/{id}", self.base());
        let response = self
            .authorized(&url)
            .send()
            .await
            .map_err(|e| ExternalApiError::RequestFailed(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ExternalApiError::PermanentError { status, message }.into());
        }

        let raw = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ExternalApiError::InvalidResponse(e.to_string()))?;
        Ok(Some(Dispensa::from_raw(raw)))
    }

    async fn health(&self) -> bool {
        let url = format!("{}/health", self.base());
        match self.authorized(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(error = %e, "dispensa source health check failed");
                false
            }
        }
    }
}
