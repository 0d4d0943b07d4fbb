//! Transparency data client with rate limiting and retry.
//!
//! Wraps the government transparency API. Requests honour a per-minute
//! quota; the retry loop treats 200 as data, 404 as "no data", 429 as a
//! Retry-After backoff, and other failures as retryable with exponential
//! backoff up to the retry budget.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use tracing::{info, warn};

use crate::domain::errors::{DomainResult, ExternalApiError};
use crate::domain::models::{ContractFilter, ContractRecord};
use crate::domain::ports::TransparencyClient;

type MinuteLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct TransparencyApiConfig {
    pub base_url: String,
    /// API key sent in the provider's key header, when required.
    pub api_key: Option<String>,
    pub requests_per_minute: u32,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for TransparencyApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.portaldatransparencia.gov.br/api-de-dados".to_string(),
            api_key: None,
            requests_per_minute: 90,
            timeout_seconds: 30,
            max_retries: 3,
        }
    }
}

/// HTTP client for the transparency data provider.
pub struct TransparencyApiClient {
    http: reqwest::Client,
    config: TransparencyApiConfig,
    limiter: MinuteLimiter,
}

impl TransparencyApiClient {
    pub fn new(config: TransparencyApiConfig) -> Self {
        let per_minute = NonZeroU32::new(config.requests_per_minute.max(1))
            .unwrap_or(NonZeroU32::MIN);
        Self {
            http: reqwest::Client::new(),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            config,
        }
    }

    /// Issue one GET with the retry loop described in the module docs.
    async fn request_json(
        &self,
        endpoint: &str,
        params: &[(&'static str, String)],
    ) -> Result<serde_json::Value, ExternalApiError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);

        for attempt in 0..=self.config.max_retries {
            self.limiter.until_ready().await;

            info!(url = %url, attempt = attempt + 1, "api request started");

            let mut request = self
                .http
                .get(&url)
                .query(params)
                .timeout(Duration::from_secs(self.config.timeout_seconds));
            if let Some(ref key) = self.config.api_key {
                request = request.header("chave-api-dados", key);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(url = %url, error = %e, attempt = attempt + 1, "api request error");
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    if e.is_timeout() {
                        return Err(ExternalApiError::Timeout(self.config.timeout_seconds));
                    }
                    return Err(ExternalApiError::RequestFailed(e.to_string()));
                }
            };

            match response.status() {
                StatusCode::OK => {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| ExternalApiError::InvalidResponse(e.to_string()));
                }
                StatusCode::NOT_FOUND => {
                    // No data for the filter.
                    return Ok(serde_json::Value::Array(vec![]));
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(60);
                    warn!(retry_after, attempt = attempt + 1, "api rate limit exceeded");
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(Duration::from_secs(retry_after)).await;
                        continue;
                    }
                    return Err(ExternalApiError::RateLimited { retry_after });
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    warn!(
                        url = %url,
                        status = status.as_u16(),
                        attempt = attempt + 1,
                        "api request failed"
                    );
                    let retryable = status.is_server_error();
                    if retryable && attempt < self.config.max_retries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    if retryable {
                        return Err(ExternalApiError::ServerError {
                            status: status.as_u16(),
                            message: body,
                        });
                    }
                    return Err(ExternalApiError::PermanentError {
                        status: status.as_u16(),
                        message: body,
                    });
                }
            }
        }

        Err(ExternalApiError::MaxRetriesExceeded(self.config.max_retries + 1))
    }
}

/// Exponential backoff between retry attempts.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

#[async_trait]
impl TransparencyClient for TransparencyApiClient {
    async fn get_contracts(
        &self,
        filter: &ContractFilter,
        limit: usize,
    ) -> DomainResult<Vec<ContractRecord>> {
        let params = filter.to_params();
        let data = self.request_json("contratos", &params).await?;

        let items = match data {
            serde_json::Value::Array(items) => items,
            // Some endpoints wrap the list in a data envelope.
            serde_json::Value::Object(mut obj) => match obj.remove("data") {
                Some(serde_json::Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        Ok(items
            .into_iter()
            .take(limit)
            .map(ContractRecord::new)
            .collect())
    }
}
