//! Anthropic messages-API completion provider

use super::client::AnthropicClient;
use super::types::{ContentBlock, Message, MessageRequest, MessageResponse};
use crate::providers::invalid_response;
use crate::{ChatMessage, CompletionProvider, ProviderConfig, Role, UsageTracker};
use async_trait::async_trait;
use remodel_core::RemodelResult;
use std::sync::Arc;

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Completion provider for Anthropic Claude models.
pub struct AnthropicCompletionProvider {
    client: AnthropicClient,
    model: String,
    temperature: Option<f32>,
    max_tokens: u32,
    usage: Arc<UsageTracker>,
}

impl AnthropicCompletionProvider {
    pub fn new(client: AnthropicClient, model: impl Into<String>, usage: Arc<UsageTracker>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            usage,
        }
    }

    pub fn from_config(config: &ProviderConfig, usage: Arc<UsageTracker>) -> Self {
        let client = AnthropicClient::new(
            config.base_url.clone(),
            config.api_key.clone().unwrap_or_default(),
            config.requests_per_minute,
        );
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature.map(|t| t.min(1.0)),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            usage,
        }
    }
}

/// Split system messages out of the history; the messages API takes them
/// as a separate field.
pub(crate) fn build_request(
    model: &str,
    messages: &[ChatMessage],
    max_tokens: u32,
    temperature: Option<f32>,
) -> MessageRequest {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    MessageRequest {
        model: model.to_string(),
        messages: messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Message {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect(),
        max_tokens,
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        temperature,
    }
}

#[async_trait]
impl CompletionProvider for AnthropicCompletionProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> RemodelResult<String> {
        let request = build_request(&self.model, messages, self.max_tokens, self.temperature);
        let response: MessageResponse = self.client.request("messages", &request).await?;

        self.usage
            .record(response.usage.input_tokens, response.usage.output_tokens);

        let text: Vec<String> = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();

        if text.is_empty() {
            return Err(invalid_response("anthropic", "No text content in response"));
        }

        tracing::debug!(
            model = %self.model,
            stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
            "anthropic completion received"
        );

        Ok(text.concat())
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for AnthropicCompletionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicCompletionProvider")
            .field("client", &self.client)
            .field("model", &self.model)
            .finish()
    }
}
