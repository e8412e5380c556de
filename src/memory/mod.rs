//! Memory port: the external key/value + document + skill store, addressed
//! by opaque identifiers. The port abstracts an implementation-defined
//! message set (named RPC tools) behind a small async trait so the engine,
//! evolver, and heartbeat never speak HTTP directly.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("memory service request failed: {0}")]
    Request(String),
    #[error("memory service not configured")]
    NotConfigured,
}

#[async_trait]
pub trait MemoryPort: Send + Sync {
    async fn write_memory(&self, key: &str, value: &str) -> Result<()>;
    async fn read_memory(&self, key: &str) -> Result<Option<String>>;
    async fn search_memory(&self, query: &str) -> Result<Vec<String>>;
    async fn delete_memory(&self, key: &str) -> Result<()>;

    async fn write_canvas(&self, slug: &str, content: &str) -> Result<()>;
    async fn read_canvas(&self, slug: &str) -> Result<Option<String>>;

    async fn list_skills(&self) -> Result<Vec<String>>;
    async fn create_skill(&self, tag: &str, text: &str) -> Result<()>;
    async fn update_skill(&self, tag: &str, text: &str) -> Result<()>;

    async fn update_persona(&self, system_prompt: &str) -> Result<()>;
}

/// No-op port used when the memory service is unconfigured, and in tests.
/// Every write silently succeeds; every read returns nothing, matching the
/// error-handling policy: "Memory write failure: swallow; log at warning;
/// never blocks the beat."
pub struct NullMemoryPort;

#[async_trait]
impl MemoryPort for NullMemoryPort {
    async fn write_memory(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }
    async fn read_memory(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }
    async fn search_memory(&self, _query: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn delete_memory(&self, _key: &str) -> Result<()> {
        Ok(())
    }
    async fn write_canvas(&self, _slug: &str, _content: &str) -> Result<()> {
        Ok(())
    }
    async fn read_canvas(&self, _slug: &str) -> Result<Option<String>> {
        Ok(None)
    }
    async fn list_skills(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn create_skill(&self, _tag: &str, _text: &str) -> Result<()> {
        Ok(())
    }
    async fn update_skill(&self, _tag: &str, _text: &str) -> Result<()> {
        Ok(())
    }
    async fn update_persona(&self, _system_prompt: &str) -> Result<()> {
        Ok(())
    }
}

/// HTTP-backed memory port. Endpoints are opaque per the spec's "implementation
/// defined message set"; this targets a small REST surface keyed by the
/// configured identifier and playbook id.
pub struct HttpMemoryPort {
    base_url: String,
    api_key: crate::secrets::SecretString,
    identifier: String,
    playbook_id: String,
    client: reqwest::Client,
}

const MEMORY_CALL_TIMEOUT: Duration = Duration::from_secs(30);

impl HttpMemoryPort {
    pub fn new(
        base_url: impl Into<String>,
        api_key: crate::secrets::SecretString,
        identifier: impl Into<String>,
        playbook_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            identifier: identifier.into(),
            playbook_id: playbook_id.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .timeout(MEMORY_CALL_TIMEOUT)
            .bearer_auth(self.api_key.unsecure())
            .json(&body)
            .send()
            .await
            .map_err(|e| MemoryError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(MemoryError::Request(format!("HTTP {status}: {text}")));
        }

        response
            .json()
            .await
            .map_err(|e| MemoryError::Request(e.to_string()))
    }
}

#[async_trait]
impl MemoryPort for HttpMemoryPort {
    async fn write_memory(&self, key: &str, value: &str) -> Result<()> {
        self.post(
            "memory/write",
            json!({ "identifier": self.identifier, "key": key, "value": value }),
        )
        .await?;
        Ok(())
    }

    async fn read_memory(&self, key: &str) -> Result<Option<String>> {
        let data = self
            .post("memory/read", json!({ "identifier": self.identifier, "key": key }))
            .await?;
        Ok(data.get("value").and_then(|v| v.as_str()).map(str::to_string))
    }

    async fn search_memory(&self, query: &str) -> Result<Vec<String>> {
        let data = self
            .post("memory/search", json!({ "identifier": self.identifier, "query": query }))
            .await?;
        Ok(data
            .get("results")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default())
    }

    async fn delete_memory(&self, key: &str) -> Result<()> {
        self.post("memory/delete", json!({ "identifier": self.identifier, "key": key }))
            .await?;
        Ok(())
    }

    async fn write_canvas(&self, slug: &str, content: &str) -> Result<()> {
        self.post(
            "canvas/write",
            json!({ "identifier": self.identifier, "slug": slug, "content": content }),
        )
        .await?;
        Ok(())
    }

    async fn read_canvas(&self, slug: &str) -> Result<Option<String>> {
        let data = self
            .post("canvas/read", json!({ "identifier": self.identifier, "slug": slug }))
            .await?;
        Ok(data.get("content").and_then(|v| v.as_str()).map(str::to_string))
    }

    async fn list_skills(&self) -> Result<Vec<String>> {
        let data = self.post("skills/list", json!({ "identifier": self.identifier })).await?;
        Ok(data
            .get("skills")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default())
    }

    async fn create_skill(&self, tag: &str, text: &str) -> Result<()> {
        self.post("skills/create", json!({ "identifier": self.identifier, "tag": tag, "text": text }))
            .await?;
        Ok(())
    }

    async fn update_skill(&self, tag: &str, text: &str) -> Result<()> {
        self.post("skills/update", json!({ "identifier": self.identifier, "tag": tag, "text": text }))
            .await?;
        Ok(())
    }

    async fn update_persona(&self, system_prompt: &str) -> Result<()> {
        self.post(
            "playbook/persona",
            json!({ "playbook_id": self.playbook_id, "system_prompt": system_prompt }),
        )
        .await?;
        Ok(())
    }
}
