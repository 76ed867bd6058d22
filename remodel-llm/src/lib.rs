//! Remodel LLM - Completion Service Layer
//!
//! Provider-agnostic trait for chat completions, the role-tagged
//! conversation the refinement loop keeps, and concrete HTTP providers.
//! Providers are registered explicitly; there is no auto-discovery.

pub mod config;
pub mod mock;
pub mod providers;

pub use config::{ProviderConfig, ProviderKind};
pub use mock::{ScriptedCompletionProvider, ScriptedReply};
pub use providers::{AnthropicClient, AnthropicCompletionProvider, OpenAIClient, OpenAICompletionProvider};

use async_trait::async_trait;
use remodel_core::{LlmError, RemodelError, RemodelResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// CHAT MESSAGES
// ============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// CONVERSATION
// ============================================================================

/// Ordered message history with a resettable opening.
///
/// The messages passed to [`Conversation::new`] form the initial state;
/// [`Conversation::reset`] discards everything appended after them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    initial_len: usize,
}

impl Conversation {
    pub fn new(initial: Vec<ChatMessage>) -> Self {
        let initial_len = initial.len();
        Self {
            messages: initial,
            initial_len,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Append the model's reply followed by our feedback on it.
    pub fn push_exchange(&mut self, reply: impl Into<String>, feedback: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(reply));
        self.messages.push(ChatMessage::user(feedback));
    }

    /// Drop every turn after the initial messages.
    pub fn reset(&mut self) {
        self.messages.truncate(self.initial_len);
    }

    /// Whether anything was appended since construction or the last reset.
    pub fn is_pristine(&self) -> bool {
        self.messages.len() == self.initial_len
    }
}

// ============================================================================
// COMPLETION PROVIDER TRAIT
// ============================================================================

/// A chat completion service.
/// Implementations must be thread-safe (Send + Sync).
///
/// Failures (network, auth, rate limiting) surface as `RemodelError::Llm`;
/// the refinement loop treats them as a failed iteration and moves on.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send the full history and return the raw reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> RemodelResult<String>;

    /// Provider name used in errors and logs (e.g. "openai").
    fn provider_name(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model_id(&self) -> &str;
}

// ============================================================================
// PROVIDER REGISTRY
// ============================================================================

/// Holds the completion provider used by refinement runs.
pub struct ProviderRegistry {
    completion: Option<Arc<dyn CompletionProvider>>,
    usage: Arc<UsageTracker>,
}

impl ProviderRegistry {
    /// Create an empty registry with a fresh usage tracker.
    pub fn new() -> Self {
        Self {
            completion: None,
            usage: Arc::new(UsageTracker::new()),
        }
    }

    /// Build a registry holding the provider described by `config`.
    pub fn from_config(config: &ProviderConfig) -> RemodelResult<Self> {
        config.validate()?;
        let mut registry = Self::new();
        let usage = registry.usage();
        let provider: Arc<dyn CompletionProvider> = match config.kind {
            ProviderKind::OpenAi => Arc::new(OpenAICompletionProvider::from_config(config, usage)),
            ProviderKind::Anthropic => {
                Arc::new(AnthropicCompletionProvider::from_config(config, usage))
            }
        };
        registry.register_completion(provider);
        Ok(registry)
    }

    /// Register the completion provider, replacing any previous one.
    pub fn register_completion(&mut self, provider: Arc<dyn CompletionProvider>) {
        self.completion = Some(provider);
    }

    /// Get the completion provider.
    ///
    /// # Returns
    /// * `Err(RemodelError::Llm(LlmError::ProviderNotConfigured))` - if none is registered
    pub fn completion(&self) -> RemodelResult<Arc<dyn CompletionProvider>> {
        self.completion
            .clone()
            .ok_or(RemodelError::Llm(LlmError::ProviderNotConfigured))
    }

    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    /// Token usage shared with the registered HTTP providers.
    pub fn usage(&self) -> Arc<UsageTracker> {
        Arc::clone(&self.usage)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field(
                "completion",
                &self.completion.as_ref().map(|p| p.provider_name().to_string()),
            )
            .field("usage", &self.usage)
            .finish()
    }
}

// ============================================================================
// USAGE TRACKER
// ============================================================================

/// Counts completion requests and tokens.
/// Thread-safe via atomic operations.
pub struct UsageTracker {
    requests: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
        }
    }

    /// Record one completed request and its token counts.
    pub fn record(&self, prompt_tokens: u64, completion_tokens: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.prompt_tokens.fetch_add(prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(completion_tokens, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens.load(Ordering::Relaxed)
    }

    pub fn completion_tokens(&self) -> u64 {
        self.completion_tokens.load(Ordering::Relaxed)
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens().saturating_add(self.completion_tokens())
    }

    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.prompt_tokens.store(0, Ordering::Relaxed);
        self.completion_tokens.store(0, Ordering::Relaxed);
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("requests", &self.requests())
            .field("prompt_tokens", &self.prompt_tokens())
            .field("completion_tokens", &self.completion_tokens())
            .finish()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Reset always returns to exactly the initial messages.
        #[test]
        fn prop_conversation_reset_restores_initial(
            initial in prop::collection::vec("[a-z ]{0,20}", 0..4),
            turns in prop::collection::vec(("[a-z ]{0,20}", "[a-z ]{0,20}"), 0..6),
        ) {
            let initial: Vec<ChatMessage> = initial.into_iter().map(ChatMessage::user).collect();
            let mut conversation = Conversation::new(initial.clone());
            for (reply, feedback) in turns.iter() {
                conversation.push_exchange(reply.clone(), feedback.clone());
            }
            prop_assert_eq!(conversation.len(), initial.len() + 2 * turns.len());
            conversation.reset();
            prop_assert_eq!(conversation.messages(), initial.as_slice());
        }
    }
}
