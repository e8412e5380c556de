//! Integration tests for the LLM Router's failover behavior against real
//! HTTP mock servers (no live provider credentials required).

use cradle::config::ProviderConfig;
use cradle::llm::groq::GroqProvider;
use cradle::llm::router::LLMRouter;
use cradle::secrets::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cfg(name: &str, base_url: String, priority: u32) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        credential: SecretString::new("unused"),
        base_url,
        model: "llama-3.3-70b-versatile".to_string(),
        priority,
        max_requests_per_minute: 60,
        cost_per_1k_tokens: 0.0,
        is_local: true,
    }
}

#[tokio::test]
async fn failover_moves_to_next_provider_on_server_error() {
    let failing = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&failing)
        .await;

    let succeeding = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "hello from the working provider" } }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 3 }
        })))
        .mount(&succeeding)
        .await;

    let router = LLMRouter::new(vec![
        (
            cfg("primary", failing.uri(), 0),
            Box::new(GroqProvider::new(cfg("primary", failing.uri(), 0))),
        ),
        (
            cfg("secondary", succeeding.uri(), 10),
            Box::new(GroqProvider::new(cfg("secondary", succeeding.uri(), 10))),
        ),
    ]);

    let response = router.complete("hi", None, None, 0.7, 256).await.unwrap();
    assert_eq!(response.provider, "secondary");
    assert_eq!(response.content, "hello from the working provider");
    assert_eq!(response.input_tokens, 5);
    assert_eq!(response.output_tokens, 3);
}

#[tokio::test]
async fn preferred_provider_is_attempted_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "ok" } }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 1 }
        })))
        .mount(&server)
        .await;

    let router = LLMRouter::new(vec![
        (cfg("low-priority", server.uri(), 0), Box::new(GroqProvider::new(cfg("low-priority", server.uri(), 0)))),
        (cfg("preferred", server.uri(), 20), Box::new(GroqProvider::new(cfg("preferred", server.uri(), 20)))),
    ]);

    assert_eq!(router.attempt_order(Some("preferred")), vec!["preferred", "low-priority"]);
}
