//! Integration tests for environment-driven configuration loading.
//!
//! These tests mutate process environment variables, so they run serially
//! via a shared mutex to avoid interference between tests in this binary.

use cradle::config::Config;
use std::sync::Mutex;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const PROVIDER_KEYS: &[&str] = &[
    "OPENAI_API_KEY",
    "GEMINI_API_KEY",
    "MINIMAX_API_KEY",
    "GROQ_API_KEY",
    "OPENROUTER_API_KEY",
    "CHAT_TOKEN",
    "REPO_TOKEN",
    "REPO_ORG",
    "REPO_NAME",
    "PRIMARY_PROVIDER",
    "PRIMARY_MODEL",
    "HEARTBEAT_INTERVAL",
];

fn clear_env() {
    for key in PROVIDER_KEYS {
        std::env::remove_var(key);
    }
}

#[test]
fn no_providers_configured_yields_a_warning_not_a_failure() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let loaded = Config::from_env();
    assert!(loaded.providers.is_empty());
    assert!(loaded.warnings.iter().any(|w| w.contains("no LLM providers")));
    assert!(loaded.warnings.iter().any(|w| w.contains("chat transport")));
    assert!(loaded.warnings.iter().any(|w| w.contains("repo token")));
}

#[test]
fn primary_provider_override_reorders_priority() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("OPENAI_API_KEY", "sk-test");
    std::env::set_var("GEMINI_API_KEY", "gem-test");
    std::env::set_var("PRIMARY_PROVIDER", "gemini");

    let loaded = Config::from_env();
    assert_eq!(loaded.providers[0].name, "gemini");
    assert_eq!(loaded.providers[0].priority, 0);

    clear_env();
}

#[test]
fn heartbeat_interval_defaults_to_thirty_seconds() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let loaded = Config::from_env();
    assert_eq!(loaded.config.heartbeat_interval_secs, 30);
}
