//! OpenAI chat completion provider

use super::client::OpenAIClient;
use super::types::{CompletionRequest, CompletionResponse, Message};
use crate::providers::invalid_response;
use crate::{ChatMessage, CompletionProvider, ProviderConfig, UsageTracker};
use async_trait::async_trait;
use remodel_core::RemodelResult;
use std::sync::Arc;

/// Completion provider for the OpenAI chat-completions API.
pub struct OpenAICompletionProvider {
    client: OpenAIClient,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    usage: Arc<UsageTracker>,
}

impl OpenAICompletionProvider {
    pub fn new(client: OpenAIClient, model: impl Into<String>, usage: Arc<UsageTracker>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            usage,
        }
    }

    pub fn from_config(config: &ProviderConfig, usage: Arc<UsageTracker>) -> Self {
        let client = OpenAIClient::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.requests_per_minute,
        );
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            usage,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompletionProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> RemodelResult<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| Message {
                    role: m.role.as_str().to_string(),
                    content: Some(m.content.clone()),
                })
                .collect(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response: CompletionResponse = self.client.request("chat/completions", &request).await?;

        if let Some(usage) = &response.usage {
            self.usage.record(usage.prompt_tokens, usage.completion_tokens);
        } else {
            self.usage.record(0, 0);
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| invalid_response("openai", "No completion in response"))?;

        tracing::debug!(
            model = %self.model,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            "openai completion received"
        );

        Ok(choice.message.content.unwrap_or_default())
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAICompletionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAICompletionProvider")
            .field("client", &self.client)
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use remodel_core::{LlmError, RemodelError};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn provider(base_url: String, usage: Arc<UsageTracker>) -> OpenAICompletionProvider {
        OpenAICompletionProvider::new(
            OpenAIClient::new(base_url, Some("sk-test".to_string()), 6000),
            "test-model",
            usage,
        )
    }

    #[tokio::test]
    async fn test_complete_success_records_usage() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer sk-test")
                );
                assert_eq!(body["model"], "test-model");
                assert_eq!(body["messages"][0]["role"], "system");
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "DDLS:\n#END#"}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
                }))
            }),
        );
        let usage = Arc::new(UsageTracker::new());
        let provider = provider(serve(router).await, Arc::clone(&usage));

        let reply = provider
            .complete(&[ChatMessage::system("s"), ChatMessage::user("u")])
            .await
            .unwrap();
        assert_eq!(reply, "DDLS:\n#END#");
        assert_eq!(usage.requests(), 1);
        assert_eq!(usage.prompt_tokens(), 12);
        assert_eq!(usage.completion_tokens(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_maps_retry_after() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("retry-after", "3")],
                    Json(json!({"error": {"message": "slow down"}})),
                )
            }),
        );
        let provider = provider(serve(router).await, Arc::new(UsageTracker::new()));

        let err = provider.complete(&[ChatMessage::user("u")]).await.unwrap_err();
        assert_eq!(
            err,
            RemodelError::Llm(LlmError::RateLimited {
                provider: "openai".to_string(),
                retry_after_ms: 3000,
            })
        );
    }

    #[tokio::test]
    async fn test_server_error_carries_message() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": {"message": "Invalid API key", "type": "auth"}})),
                )
            }),
        );
        let provider = provider(serve(router).await, Arc::new(UsageTracker::new()));

        match provider.complete(&[ChatMessage::user("u")]).await {
            Err(RemodelError::Llm(LlmError::RequestFailed { status, message, .. })) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let provider = provider(serve(router).await, Arc::new(UsageTracker::new()));
        assert!(matches!(
            provider.complete(&[ChatMessage::user("u")]).await,
            Err(RemodelError::Llm(LlmError::InvalidResponse { .. }))
        ));
    }
}
