//! The two concrete LLM wire dialects used by the router's providers.
//!
//! Every provider delegates to one of these two functions so the
//! request/response shape and error-status mapping lives in exactly one
//! place per dialect.

use super::{LLMError, Message, MessageRole, ProviderOutput, Result};
use serde_json::json;
use std::time::Duration;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);

fn map_status_error(status: reqwest::StatusCode, body: String) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::AuthenticationFailed(body),
        429 => LLMError::RateLimitExceeded,
        400 | 404 => LLMError::InvalidRequest(body),
        _ => LLMError::ProviderUnavailable(format!("HTTP {status}: {body}")),
    }
}

fn map_transport_error(err: reqwest::Error) -> LLMError {
    if err.is_timeout() {
        LLMError::Timeout
    } else if err.is_connect() {
        LLMError::ProviderUnavailable(err.to_string())
    } else {
        LLMError::NetworkError(err.to_string())
    }
}

/// Google-style generative-language endpoint:
/// `POST {base}/models/{model}:generateContent?key={credential}`.
pub async fn google(
    client: &reqwest::Client,
    base_url: &str,
    model: &str,
    credential: &str,
    messages: &[Message],
    temperature: f32,
    max_tokens: u32,
) -> Result<ProviderOutput> {
    let url = format!(
        "{}/models/{model}:generateContent?key={credential}",
        base_url.trim_end_matches('/')
    );

    let mut contents = Vec::new();
    let mut system_instruction = None;
    for msg in messages {
        if msg.role == MessageRole::System {
            system_instruction = Some(json!({ "parts": [{ "text": msg.content }] }));
            continue;
        }
        contents.push(json!({
            "role": if msg.role == MessageRole::Assistant { "model" } else { "user" },
            "parts": [{ "text": msg.content }],
        }));
    }

    let mut payload = serde_json::Map::new();
    payload.insert("contents".to_string(), json!(contents));
    payload.insert(
        "generationConfig".to_string(),
        json!({ "temperature": temperature, "maxOutputTokens": max_tokens }),
    );
    if let Some(sys) = system_instruction {
        payload.insert("systemInstruction".to_string(), sys);
    }

    let response = client
        .post(&url)
        .timeout(PROVIDER_TIMEOUT)
        .json(&payload)
        .send()
        .await
        .map_err(map_transport_error)?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(map_status_error(status, body));
    }

    let data: serde_json::Value = response
        .json()
        .await
        .map_err(|e| LLMError::ParseError(e.to_string()))?;

    let candidate = data
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| LLMError::ParseError("no candidates in response".to_string()))?;

    let parts = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| LLMError::ParseError("no content parts in candidate".to_string()))?;

    let mut content = String::new();
    for part in parts {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            content.push_str(text);
        }
    }

    let input_tokens = data
        .get("usageMetadata")
        .and_then(|u| u.get("promptTokenCount"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let output_tokens = data
        .get("usageMetadata")
        .and_then(|u| u.get("candidatesTokenCount"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    Ok(ProviderOutput { content, input_tokens, output_tokens })
}

/// OpenAI-compatible chat-completions endpoint: `POST {base}/chat/completions`.
/// `extra_headers` lets one provider (OpenRouter) attach attribution headers.
#[allow(clippy::too_many_arguments)]
pub async fn chat_completions(
    client: &reqwest::Client,
    base_url: &str,
    model: &str,
    credential: &str,
    messages: &[Message],
    temperature: f32,
    max_tokens: u32,
    extra_headers: &[(&str, &str)],
) -> Result<ProviderOutput> {
    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let api_messages: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
        .collect();

    let payload = json!({
        "model": model,
        "messages": api_messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
    });

    let mut request = client
        .post(&url)
        .timeout(PROVIDER_TIMEOUT)
        .bearer_auth(credential)
        .json(&payload);
    for (key, value) in extra_headers {
        request = request.header(*key, *value);
    }

    let response = request.send().await.map_err(map_transport_error)?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(map_status_error(status, body));
    }

    let data: serde_json::Value = response
        .json()
        .await
        .map_err(|e| LLMError::ParseError(e.to_string()))?;

    let content = data
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| LLMError::ParseError("no message content in response".to_string()))?
        .to_string();

    let input_tokens = data
        .get("usage")
        .and_then(|u| u.get("prompt_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let output_tokens = data
        .get("usage")
        .and_then(|u| u.get("completion_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    Ok(ProviderOutput { content, input_tokens, output_tokens })
}
