use super::*;
use crate::config::OllamaConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, batch_size: u32) -> Config {
    let address = server.address();
    let mut config = Config::default();
    config.ollama = OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        model: "all-minilm:latest".to_string(),
        batch_size,
        ..OllamaConfig::default()
    };
    config.embedding.vector_size = 3;
    config
}

fn client_for(server: &MockServer, batch_size: u32) -> OllamaClient {
    OllamaClient::new(&config_for(server, batch_size))
        .expect("should create client")
        .with_retry_attempts(1)
}

async fn mount_embed(server: &MockServer, inputs: serde_json::Value, embeddings: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": inputs })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "all-minilm:latest",
            "embeddings": embeddings,
        })))
        .mount(server)
        .await;
}

#[test]
fn client_configuration() {
    let mut config = Config::default();
    config.ollama = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.expected_dimension, 384);
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    assert_eq!(TextEmbedder::name(&client), "test-model");
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&Config::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn dimension_is_probed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": [DIMENSION_PROBE_TEXT] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2, 0.3, 0.4]],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let dimensions = tokio::task::spawn_blocking(move || {
        let first = client.dimension().expect("should probe");
        let second = client.dimension().expect("should reuse cached value");
        (first, second)
    })
    .await
    .expect("blocking task should finish");

    assert_eq!(dimensions, (4, 4));
}

#[tokio::test(flavor = "multi_thread")]
async fn batches_respect_batch_size() {
    let server = MockServer::start().await;
    mount_embed(&server, json!([DIMENSION_PROBE_TEXT]), json!([[0.0, 0.0, 1.0]])).await;
    mount_embed(
        &server,
        json!(["house", "flat"]),
        json!([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
    )
    .await;
    mount_embed(&server, json!(["cottage"]), json!([[0.5, 0.5, 0.0]])).await;

    let client = client_for(&server, 2);
    let embeddings = tokio::task::spawn_blocking(move || {
        client.embed_batch(&["house".to_string(), "flat".to_string(), "cottage".to_string()])
    })
    .await
    .expect("blocking task should finish")
    .expect("should embed batch");

    assert_eq!(
        embeddings,
        vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.5, 0.5, 0.0]]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn inconsistent_dimensions_are_rejected() {
    let server = MockServer::start().await;
    mount_embed(&server, json!([DIMENSION_PROBE_TEXT]), json!([[0.0, 0.0, 1.0]])).await;
    mount_embed(&server, json!(["house"]), json!([[1.0, 0.0]])).await;

    let client = client_for(&server, 4);
    let result = tokio::task::spawn_blocking(move || client.embed("house"))
        .await
        .expect("blocking task should finish");

    match result {
        Err(SearchError::Embedding(message)) => assert!(message.contains("dimension mismatch")),
        other => panic!("expected embedding error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "model not found",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 4))
        .expect("should create client")
        .with_retry_attempts(3);
    let result = tokio::task::spawn_blocking(move || client.dimension())
        .await
        .expect("blocking task should finish");

    assert!(matches!(result, Err(SearchError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_requires_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": "all-minilm:latest", "size": 45_960_996 },
                { "name": "llama3:8b" },
            ],
        })))
        .mount(&server)
        .await;

    let healthy = client_for(&server, 4);
    let mut other_config = config_for(&server, 4);
    other_config.ollama.model = "nomic-embed-text:latest".to_string();
    let missing = OllamaClient::new(&other_config)
        .expect("should create client")
        .with_retry_attempts(1);

    let (healthy, missing) = tokio::task::spawn_blocking(move || {
        (healthy.health_check(), missing.health_check())
    })
    .await
    .expect("blocking task should finish");

    assert!(healthy.is_ok());
    assert!(missing.is_err());
}
