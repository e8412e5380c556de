//! Environment-driven configuration.
//!
//! Every setting is read from the process environment in a single pass
//! (`Config::from_env`), returning non-fatal warnings instead of failing
//! the process when optional surfaces (providers, chat, repo) are unset —
//! the daemon is meant to run in a degraded-but-alive mode rather than
//! refuse to start.

use crate::secrets::SecretString;
use std::path::PathBuf;

/// Fixed descriptor for one of the five built-in LLM providers before its
/// credential is known to be present. Order here is the default priority
/// order (lower index = preferred) absent any `PRIMARY_PROVIDER` override.
struct ProviderTemplate {
    name: &'static str,
    env_key: &'static str,
    base_url_env: &'static str,
    default_base_url: &'static str,
    model_env: &'static str,
    default_model: &'static str,
    default_cost_per_1k: f64,
    is_local: bool,
}

const PROVIDER_TEMPLATES: &[ProviderTemplate] = &[
    ProviderTemplate {
        name: "gemini",
        env_key: "GEMINI_API_KEY",
        base_url_env: "GEMINI_BASE_URL",
        default_base_url: "https://generativelanguage.googleapis.com/v1beta",
        model_env: "GEMINI_MODEL",
        default_model: "gemini-3.1-pro",
        default_cost_per_1k: 0.00015,
        is_local: false,
    },
    ProviderTemplate {
        name: "minimax",
        env_key: "MINIMAX_API_KEY",
        base_url_env: "MINIMAX_BASE_URL",
        default_base_url: "https://api.minimaxi.chat/v1",
        model_env: "MINIMAX_MODEL",
        default_model: "MiniMax-M1",
        default_cost_per_1k: 0.0,
        is_local: false,
    },
    ProviderTemplate {
        name: "groq",
        env_key: "GROQ_API_KEY",
        base_url_env: "GROQ_BASE_URL",
        default_base_url: "https://api.groq.com/openai/v1",
        model_env: "GROQ_MODEL",
        default_model: "llama-3.3-70b-versatile",
        default_cost_per_1k: 0.0,
        is_local: false,
    },
    ProviderTemplate {
        name: "openrouter",
        env_key: "OPENROUTER_API_KEY",
        base_url_env: "OPENROUTER_BASE_URL",
        default_base_url: "https://openrouter.ai/api/v1",
        model_env: "OPENROUTER_MODEL",
        default_model: "meta-llama/llama-3.3-70b-instruct:free",
        default_cost_per_1k: 0.0,
        is_local: false,
    },
    ProviderTemplate {
        name: "openai",
        env_key: "OPENAI_API_KEY",
        base_url_env: "OPENAI_BASE_URL",
        default_base_url: "https://api.openai.com/v1",
        model_env: "OPENAI_MODEL",
        default_model: "gpt-4.1-mini",
        default_cost_per_1k: 0.0004,
        is_local: false,
    },
];

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub credential: SecretString,
    pub base_url: String,
    pub model: String,
    pub priority: u32,
    pub max_requests_per_minute: u32,
    pub cost_per_1k_tokens: f64,
    pub is_local: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chat_token: Option<SecretString>,
    pub chat_allowed_handle: String,

    pub repo_token: Option<SecretString>,
    pub repo_org: Option<String>,
    pub repo_name: Option<String>,

    pub memory_api_key: Option<SecretString>,
    pub memory_identifier: Option<String>,
    pub memory_playbook_id: Option<String>,

    pub search_api_key: Option<SecretString>,
    pub search_engine_id: Option<String>,

    pub heartbeat_interval_secs: u64,
    pub log_level: String,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

pub struct LoadedConfig {
    pub config: Config,
    pub providers: Vec<ProviderConfig>,
    pub warnings: Vec<String>,
}

impl Config {
    /// Load configuration from the environment in a single pass. Never
    /// fails; missing optional surfaces surface as warnings instead.
    pub fn from_env() -> LoadedConfig {
        let mut warnings = Vec::new();

        let chat_token = env_secret("CHAT_TOKEN");
        let chat_allowed_handle =
            std::env::var("CHAT_ALLOWED_HANDLE").unwrap_or_else(|_| "@matebenyovszky".to_string());

        let repo_token = env_secret("REPO_TOKEN");
        let repo_org = env_str("REPO_ORG");
        let repo_name = env_str("REPO_NAME");

        let memory_api_key = env_secret("MEMORY_API_KEY");
        let memory_identifier = env_str("MEMORY_IDENTIFIER");
        let memory_playbook_id = env_str("MEMORY_PLAYBOOK_ID");

        let search_api_key = env_secret("SEARCH_API_KEY");
        let search_engine_id = env_str("SEARCH_ENGINE_ID");

        let heartbeat_interval_secs = std::env::var("HEARTBEAT_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let data_dir = expand_path(&std::env::var("DATA_DIR").unwrap_or_else(|_| "/app/data".to_string()));
        let log_dir = expand_path(&std::env::var("LOG_DIR").unwrap_or_else(|_| "/app/logs".to_string()));

        let primary_provider =
            std::env::var("PRIMARY_PROVIDER").unwrap_or_else(|_| "openai".to_string());

        let mut providers = Vec::new();
        for (idx, tmpl) in PROVIDER_TEMPLATES.iter().enumerate() {
            let Some(credential) = env_secret(tmpl.env_key) else {
                continue;
            };
            let base_url = std::env::var(tmpl.base_url_env)
                .unwrap_or_else(|_| tmpl.default_base_url.to_string());
            let mut model =
                std::env::var(tmpl.model_env).unwrap_or_else(|_| tmpl.default_model.to_string());
            if tmpl.name == primary_provider {
                if let Ok(override_model) = std::env::var("PRIMARY_MODEL") {
                    model = override_model;
                }
            }
            providers.push(ProviderConfig {
                name: tmpl.name.to_string(),
                credential,
                base_url,
                model,
                priority: idx as u32 * 10,
                max_requests_per_minute: 60,
                cost_per_1k_tokens: tmpl.default_cost_per_1k,
                is_local: tmpl.is_local,
            });
        }
        // Move the configured primary to the front of priority order.
        if let Some(pos) = providers.iter().position(|p| p.name == primary_provider) {
            let primary = providers.remove(pos);
            providers.insert(0, primary);
            for (i, p) in providers.iter_mut().enumerate() {
                p.priority = i as u32 * 10;
            }
        }

        if providers.is_empty() {
            warnings.push("no LLM providers configured: no provider API keys set".to_string());
        }
        if chat_token.is_none() {
            warnings.push("no chat transport token set: chat transport disabled".to_string());
        }
        if repo_token.is_none() {
            warnings.push("no repo token set: self-evolution disabled".to_string());
        }

        let config = Config {
            chat_token,
            chat_allowed_handle,
            repo_token,
            repo_org,
            repo_name,
            memory_api_key,
            memory_identifier,
            memory_playbook_id,
            search_api_key,
            search_engine_id,
            heartbeat_interval_secs,
            log_level,
            data_dir,
            log_dir,
        };

        LoadedConfig {
            config,
            providers,
            warnings,
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_secret(key: &str) -> Option<SecretString> {
    env_str(key).map(SecretString::new)
}

fn expand_path(raw: &str) -> PathBuf {
    if let Some(stripped) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_path_handles_tilde() {
        let expanded = expand_path("~/cradle-data");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("cradle-data"));
        }
    }

    #[test]
    fn expand_path_leaves_absolute_paths_alone() {
        assert_eq!(expand_path("/app/data"), PathBuf::from("/app/data"));
    }
}
