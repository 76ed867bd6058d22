//! OpenAI HTTP client with rate limiting

use super::types::ApiError;
use crate::providers::{invalid_response, parse_retry_after_ms, rate_limited, request_failed, RequestPacer};
use remodel_core::RemodelResult;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

const PROVIDER: &str = "openai";

/// OpenAI-compatible API client with rate limiting.
pub struct OpenAIClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    pacer: RequestPacer,
}

impl OpenAIClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `https://api.openai.com/v1`
    /// * `api_key` - Bearer token; local servers often need none
    /// * `requests_per_minute` - Maximum requests per minute
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, requests_per_minute: u32) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pacer: RequestPacer::new(requests_per_minute),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make an API request with automatic rate limiting.
    pub async fn request<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> RemodelResult<Res> {
        let _permit = self.pacer.acquire(PROVIDER).await?;

        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| request_failed(PROVIDER, 0, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)));
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let error_msg = match serde_json::from_str::<ApiError>(&error_text) {
            Ok(api_error) => api_error.error.message,
            Err(_) => error_text,
        };

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => rate_limited(PROVIDER, retry_after_ms),
            _ => request_failed(PROVIDER, status.as_u16(), error_msg),
        })
    }
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
