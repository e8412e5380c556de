//! Telegram long-polling transport, gated to a single allowed handle.

use super::{ChatError, ChatTransport, IncomingMessage, Result};
use crate::secrets::SecretString;
use async_trait::async_trait;
use std::time::Duration;

const POLL_TIMEOUT_SECS: u64 = 25;
const HTTP_TIMEOUT: Duration = Duration::from_secs(35);

pub struct TelegramTransport {
    token: SecretString,
    allowed_handle: String,
    client: reqwest::Client,
    offset: i64,
}

impl TelegramTransport {
    pub fn new(token: SecretString, allowed_handle: impl Into<String>) -> Self {
        Self {
            token,
            allowed_handle: normalize_handle(&allowed_handle.into()),
            client: reqwest::Client::new(),
            offset: 0,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.token.unsecure())
    }
}

fn normalize_handle(handle: &str) -> String {
    handle.trim_start_matches('@').to_lowercase()
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(&self, text: &str) -> Result<()> {
        let chat_target = format!("@{}", self.allowed_handle);
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .timeout(HTTP_TIMEOUT)
            .json(&serde_json::json!({ "chat_id": chat_target, "text": text }))
            .send()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::Request(format!("telegram sendMessage: HTTP {}", response.status())));
        }
        Ok(())
    }

    async fn poll_updates(&mut self) -> Result<Vec<IncomingMessage>> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .timeout(HTTP_TIMEOUT)
            .query(&[
                ("timeout", POLL_TIMEOUT_SECS.to_string()),
                ("offset", self.offset.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::Request(format!("telegram getUpdates: HTTP {}", response.status())));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| ChatError::Request(e.to_string()))?;
        let updates = body.get("result").and_then(|v| v.as_array()).cloned().unwrap_or_default();

        let mut messages = Vec::new();
        for update in &updates {
            if let Some(update_id) = update.get("update_id").and_then(|v| v.as_i64()) {
                self.offset = self.offset.max(update_id + 1);
            }
            let Some(message) = update.get("message") else { continue };
            let Some(text) = message.get("text").and_then(|v| v.as_str()) else { continue };
            let handle = message
                .get("from")
                .and_then(|f| f.get("username"))
                .and_then(|v| v.as_str())
                .map(normalize_handle)
                .unwrap_or_default();

            if handle != self.allowed_handle {
                tracing::warn!(handle = %handle, "ignoring message from unauthorized handle");
                continue;
            }

            messages.push(IncomingMessage { from_handle: handle, text: text.to_string() });
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handle_strips_at_and_lowercases() {
        assert_eq!(normalize_handle("@MateBenyovszky"), "matebenyovszky");
        assert_eq!(normalize_handle("matebenyovszky"), "matebenyovszky");
    }
}
