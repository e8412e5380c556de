//! LLM Router
//!
//! Priority-ordered multi-provider failover with consecutive-failure
//! demotion. Provider attempts within one `complete()` call are serial and
//! follow priority order (lower `priority` value first); there is no retry
//! inside a single provider, only failover to the next one.

use super::{LLMError, LLMProvider, LLMResponse, Message, Result};
use crate::config::ProviderConfig;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEMOTION_THRESHOLD: u32 = 3;
const DEMOTION_COOLDOWN: Duration = Duration::from_secs(300);
const PROVIDER_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-provider health tracked only inside `complete()`. Resets on success.
#[derive(Debug, Clone, Copy, Default)]
struct ProviderHealth {
    consecutive_failures: u32,
    demoted_until: Option<Instant>,
}

impl ProviderHealth {
    fn is_demoted(&self, now: Instant) -> bool {
        self.demoted_until.is_some_and(|until| now < until)
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.demoted_until = None;
    }

    fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= DEMOTION_THRESHOLD {
            self.demoted_until = Some(now + DEMOTION_COOLDOWN);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    pub calls: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RouterStats {
    pub total_calls: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_usd: f64,
    pub per_provider: HashMap<String, ProviderStats>,
}

struct Entry {
    config: ProviderConfig,
    provider: Box<dyn LLMProvider>,
}

pub struct LLMRouter {
    entries: Vec<Entry>,
    health: Mutex<HashMap<String, ProviderHealth>>,
    stats: Mutex<RouterStats>,
}

impl LLMRouter {
    /// Build a router from already-ordered (by priority) provider configs
    /// paired with their concrete implementations.
    pub fn new(mut entries: Vec<(ProviderConfig, Box<dyn LLMProvider>)>) -> Self {
        entries.sort_by_key(|(config, _)| config.priority);
        let health = entries
            .iter()
            .map(|(config, _)| (config.name.clone(), ProviderHealth::default()))
            .collect();
        Self {
            entries: entries
                .into_iter()
                .map(|(config, provider)| Entry { config, provider })
                .collect(),
            health: Mutex::new(health),
            stats: Mutex::new(RouterStats::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of provider names in current attempt order (preferred first
    /// if supplied), regardless of demotion state. Exposed for P1.
    pub fn attempt_order(&self, preferred: Option<&str>) -> Vec<String> {
        self.ordered_entries(preferred)
            .iter()
            .map(|e| e.config.name.clone())
            .collect()
    }

    fn ordered_entries(&self, preferred: Option<&str>) -> Vec<&Entry> {
        let mut ordered: Vec<&Entry> = self.entries.iter().collect();
        if let Some(name) = preferred {
            if let Some(pos) = ordered.iter().position(|e| e.config.name == name) {
                let preferred_entry = ordered.remove(pos);
                ordered.insert(0, preferred_entry);
            }
        }
        ordered
    }

    /// `complete(prompt, system?, preferred?, temperature, max_tokens) -> response`.
    pub async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        preferred: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<LLMResponse> {
        if self.entries.is_empty() {
            return Err(LLMError::ProviderUnavailable(
                "no LLM providers configured".to_string(),
            ));
        }

        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(prompt));

        let ordered = self.ordered_entries(preferred);
        let mut last_error: Option<LLMError> = None;

        for entry in ordered {
            let now = Instant::now();
            {
                let health = self.health.lock().expect("router health lock poisoned");
                if health
                    .get(&entry.config.name)
                    .is_some_and(|h| h.is_demoted(now))
                {
                    continue;
                }
            }

            let started = Instant::now();
            let result = tokio::time::timeout(
                PROVIDER_CALL_TIMEOUT,
                entry.provider.generate(&messages, temperature, max_tokens),
            )
            .await;

            let outcome = match result {
                Ok(inner) => inner,
                Err(_) => Err(LLMError::Timeout),
            };

            match outcome {
                Ok(output) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    let cost_usd = ((output.input_tokens + output.output_tokens) as f64 / 1000.0)
                        * entry.config.cost_per_1k_tokens;

                    {
                        let mut health = self.health.lock().expect("router health lock poisoned");
                        health.entry(entry.config.name.clone()).or_default().record_success();
                    }
                    {
                        let mut stats = self.stats.lock().expect("router stats lock poisoned");
                        stats.total_calls += 1;
                        stats.total_input_tokens += output.input_tokens;
                        stats.total_output_tokens += output.output_tokens;
                        stats.total_cost_usd += cost_usd;
                        let provider_stats = stats.per_provider.entry(entry.config.name.clone()).or_default();
                        provider_stats.calls += 1;
                    }

                    tracing::info!(provider = %entry.config.name, latency_ms, "provider call succeeded");

                    return Ok(LLMResponse {
                        content: output.content,
                        provider: entry.config.name.clone(),
                        model: entry.config.model.clone(),
                        input_tokens: output.input_tokens,
                        output_tokens: output.output_tokens,
                        latency_ms,
                        cost_usd,
                    });
                }
                Err(err) => {
                    tracing::warn!(provider = %entry.config.name, error = %err, "provider call failed");
                    {
                        let mut health = self.health.lock().expect("router health lock poisoned");
                        health.entry(entry.config.name.clone()).or_default().record_failure(Instant::now());
                    }
                    {
                        let mut stats = self.stats.lock().expect("router stats lock poisoned");
                        stats.per_provider.entry(entry.config.name.clone()).or_default().errors += 1;
                    }
                    last_error = Some(err);
                }
            }
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "all providers demoted".to_string());
        tracing::error!(last_error = %last, "all LLM providers exhausted");
        Err(LLMError::AllProvidersExhausted(last))
    }

    pub fn stats(&self) -> RouterStats {
        self.stats.lock().expect("router stats lock poisoned").clone()
    }

    #[cfg(test)]
    fn health_of(&self, name: &str) -> Option<ProviderHealth> {
        self.health.lock().expect("router health lock poisoned").get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderOutput;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyProvider {
        name: &'static str,
        fail_times: Arc<AtomicU32>,
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn model(&self) -> &str {
            "mock-model"
        }
        fn is_local(&self) -> bool {
            false
        }
        fn cost_per_1k_tokens(&self) -> f64 {
            0.0
        }
        async fn generate(
            &self,
            _messages: &[Message],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<ProviderOutput> {
            if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(LLMError::ProviderUnavailable("flaked".to_string()))
            } else {
                Ok(ProviderOutput { content: "ok".to_string(), input_tokens: 1, output_tokens: 1 })
            }
        }
    }

    fn cfg(name: &str, priority: u32) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            credential: crate::secrets::SecretString::new("x"),
            base_url: "http://localhost".to_string(),
            model: "mock-model".to_string(),
            priority,
            max_requests_per_minute: 60,
            cost_per_1k_tokens: 0.0,
            is_local: false,
        }
    }

    #[tokio::test]
    async fn demotes_after_three_consecutive_failures() {
        let always_fail = Arc::new(AtomicU32::new(u32::MAX));
        let router = LLMRouter::new(vec![(
            cfg("flaky", 0),
            Box::new(FlakyProvider { name: "flaky", fail_times: always_fail }),
        )]);

        for _ in 0..3 {
            let _ = router.complete("hi", None, None, 0.7, 100).await;
        }

        let health = router.health_of("flaky").unwrap();
        assert_eq!(health.consecutive_failures, 3);
        assert!(health.is_demoted(Instant::now()));
    }

    #[tokio::test]
    async fn failover_reaches_second_provider() {
        let router = LLMRouter::new(vec![
            (
                cfg("first", 0),
                Box::new(FlakyProvider { name: "first", fail_times: Arc::new(AtomicU32::new(u32::MAX)) }),
            ),
            (
                cfg("second", 10),
                Box::new(FlakyProvider { name: "second", fail_times: Arc::new(AtomicU32::new(0)) }),
            ),
        ]);

        let response = router.complete("hi", None, None, 0.7, 100).await.unwrap();
        assert_eq!(response.provider, "second");
    }

    #[tokio::test]
    async fn preferred_provider_moved_to_front() {
        let router = LLMRouter::new(vec![
            (cfg("a", 0), Box::new(FlakyProvider { name: "a", fail_times: Arc::new(AtomicU32::new(0)) })),
            (cfg("b", 10), Box::new(FlakyProvider { name: "b", fail_times: Arc::new(AtomicU32::new(0)) })),
        ]);

        assert_eq!(router.attempt_order(Some("b")), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn all_providers_exhausted_surfaces_terminal_error() {
        let router = LLMRouter::new(vec![(
            cfg("only", 0),
            Box::new(FlakyProvider { name: "only", fail_times: Arc::new(AtomicU32::new(u32::MAX)) }),
        )]);

        let err = router.complete("hi", None, None, 0.7, 100).await.unwrap_err();
        assert!(matches!(err, LLMError::AllProvidersExhausted(_)));
    }
}
