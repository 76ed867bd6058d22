//! OpenAI-compatible provider implementation
//!
//! Works against api.openai.com and any server exposing the same
//! `chat/completions` endpoint (vLLM, OpenRouter, llama.cpp server).

pub mod client;
pub mod completion;
pub mod types;

pub use client::OpenAIClient;
pub use completion::OpenAICompletionProvider;
