//! Scripted completion provider for testing.
//!
//! Replies are served in order. Every request's message history is
//! recorded so tests can assert on what the loop sent.

use crate::{ChatMessage, CompletionProvider};
use async_trait::async_trait;
use remodel_core::{LlmError, RemodelError, RemodelResult};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    Text(String),
    Error(LlmError),
    /// Sleep before answering, to exercise call timeouts.
    Delayed(Duration, String),
}

impl ScriptedReply {
    pub fn text(s: impl Into<String>) -> Self {
        ScriptedReply::Text(s.into())
    }

    pub fn blank() -> Self {
        ScriptedReply::Text(String::new())
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    replies: VecDeque<ScriptedReply>,
    requests: Vec<Vec<ChatMessage>>,
}

/// Completion provider answering from a fixed script.
///
/// Once the script is exhausted the fallback is served, which by default is
/// an `InvalidResponse` error.
#[derive(Debug)]
pub struct ScriptedCompletionProvider {
    state: Mutex<ScriptState>,
    fallback: ScriptedReply,
}

impl ScriptedCompletionProvider {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                replies: replies.into(),
                requests: Vec::new(),
            }),
            fallback: ScriptedReply::Error(LlmError::InvalidResponse {
                provider: "scripted".to_string(),
                reason: "script exhausted".to_string(),
            }),
        }
    }

    /// Script of plain text replies.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(ScriptedReply::text).collect())
    }

    /// Serve `fallback` forever once the script runs out.
    pub fn with_fallback(mut self, fallback: ScriptedReply) -> Self {
        self.fallback = fallback;
        self
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.requests.len())
            .unwrap_or_default()
    }

    /// Message histories of every request, oldest first.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.state
            .lock()
            .map(|state| state.requests.clone())
            .unwrap_or_default()
    }

    /// Replies not yet served.
    pub fn remaining(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.replies.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletionProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> RemodelResult<String> {
        let reply = {
            let mut state = self.state.lock().map_err(|_| {
                RemodelError::Llm(LlmError::InvalidResponse {
                    provider: "scripted".to_string(),
                    reason: "script state poisoned".to_string(),
                })
            })?;
            state.requests.push(messages.to_vec());
            state
                .replies
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        };

        match reply {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Error(err) => Err(RemodelError::Llm(err)),
            ScriptedReply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }
}
