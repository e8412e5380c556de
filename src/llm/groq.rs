use super::{dialects, LLMProvider, Message, ProviderOutput, Result};
use crate::config::ProviderConfig;
use async_trait::async_trait;

pub struct GroqProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl GroqProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }
}

#[async_trait]
impl LLMProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_local(&self) -> bool {
        false
    }

    fn cost_per_1k_tokens(&self) -> f64 {
        self.config.cost_per_1k_tokens
    }

    async fn generate(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ProviderOutput> {
        dialects::chat_completions(
            &self.client,
            &self.config.base_url,
            &self.config.model,
            self.config.credential.unsecure(),
            messages,
            temperature,
            max_tokens,
            &[],
        )
        .await
    }
}
