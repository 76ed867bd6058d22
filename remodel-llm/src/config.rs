//! Completion provider configuration

use remodel_core::{ConfigError, RemodelError, RemodelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Wire protocol a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat-completions API or anything compatible with it.
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => DEFAULT_OPENAI_BASE_URL,
            ProviderKind::Anthropic => DEFAULT_ANTHROPIC_BASE_URL,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-sonnet-latest",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" | "openai-compatible" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(ConfigError::ProviderNotSupported {
                provider: other.to_string(),
            }),
        }
    }
}

/// Connection and sampling settings for the completion provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub requests_per_minute: u32,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let kind = ProviderKind::OpenAi;
        Self {
            kind,
            base_url: kind.default_base_url().to_string(),
            api_key: None,
            model: kind.default_model().to_string(),
            requests_per_minute: 60,
            temperature: Some(0.2),
            max_tokens: None,
        }
    }
}

impl ProviderConfig {
    /// Load from `REMODEL_LLM_*` environment variables.
    ///
    /// `API_BASE_URL` and `API_KEY` are accepted when the prefixed variables
    /// are unset. An unknown `REMODEL_LLM_PROVIDER` is an error; anything
    /// else unparsable falls back to its default.
    pub fn from_env() -> RemodelResult<Self> {
        let kind = match std::env::var("REMODEL_LLM_PROVIDER") {
            Ok(raw) => raw.parse::<ProviderKind>().map_err(RemodelError::Config)?,
            Err(_) => ProviderKind::OpenAi,
        };

        let base_url = std::env::var("REMODEL_LLM_BASE_URL")
            .or_else(|_| std::env::var("API_BASE_URL"))
            .unwrap_or_else(|_| kind.default_base_url().to_string());
        let api_key = std::env::var("REMODEL_LLM_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .ok()
            .filter(|k| !k.is_empty());

        Ok(Self {
            kind,
            base_url,
            api_key,
            model: std::env::var("REMODEL_LLM_MODEL")
                .unwrap_or_else(|_| kind.default_model().to_string()),
            requests_per_minute: std::env::var("REMODEL_LLM_REQUESTS_PER_MINUTE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            temperature: std::env::var("REMODEL_LLM_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(Some(0.2)),
            max_tokens: std::env::var("REMODEL_LLM_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok()),
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> RemodelResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(RemodelError::Config(ConfigError::InvalidValue {
                field: "base_url".to_string(),
                value: self.base_url.clone(),
                reason: "must be an http(s) url".to_string(),
            }));
        }
        if self.model.trim().is_empty() {
            return Err(RemodelError::Config(ConfigError::MissingRequired {
                field: "model".to_string(),
            }));
        }
        if self.requests_per_minute == 0 {
            return Err(RemodelError::Config(ConfigError::InvalidValue {
                field: "requests_per_minute".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            }));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(RemodelError::Config(ConfigError::InvalidValue {
                    field: "temperature".to_string(),
                    value: t.to_string(),
                    reason: "must be between 0.0 and 2.0".to_string(),
                }));
            }
        }
        if self.kind == ProviderKind::Anthropic && self.api_key.is_none() {
            return Err(RemodelError::Config(ConfigError::MissingRequired {
                field: "api_key".to_string(),
            }));
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}
