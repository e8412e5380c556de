//! LLM Provider Abstraction Layer
//!
//! A common interface over the five built-in LLM providers (Gemini,
//! MiniMax, Groq, OpenRouter, OpenAI). Each provider speaks one of two wire
//! dialects (`dialects::google`, `dialects::chat_completions`); the
//! `LLMProvider` trait lets the router call any of them uniformly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod dialects;
pub mod gemini;
pub mod groq;
pub mod minimax;
pub mod openai;
pub mod openrouter;
pub mod router;

pub type Result<T> = std::result::Result<T, LLMError>;

#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("request timed out")]
    Timeout,

    #[error("failed to parse provider response: {0}")]
    ParseError(String),

    #[error("all providers exhausted, last error: {0}")]
    AllProvidersExhausted(String),
}

/// Message in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// What a concrete provider hands back before the router enriches it with
/// timing, provider name, and cost.
#[derive(Debug, Clone)]
pub struct ProviderOutput {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Normalized response handed back by the router. See Data Model: LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
    pub cost_usd: f64,
}

/// LLM Provider trait implemented by each of the five built-in providers.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn is_local(&self) -> bool;
    fn cost_per_1k_tokens(&self) -> f64;

    async fn generate(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ProviderOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_role() {
        assert_eq!(Message::user("hi").role, MessageRole::User);
        assert_eq!(Message::assistant("hi").role, MessageRole::Assistant);
        assert_eq!(Message::system("hi").role, MessageRole::System);
    }

    #[test]
    fn message_role_display() {
        assert_eq!(MessageRole::User.to_string(), "user");
        assert_eq!(MessageRole::Assistant.to_string(), "assistant");
        assert_eq!(MessageRole::System.to_string(), "system");
    }
}
