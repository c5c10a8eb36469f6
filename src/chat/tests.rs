use super::*;
use crate::data::{CellValue, Document};
use serde_json::json;
use std::collections::BTreeMap;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn result(score: f32, text: &str, price: i64) -> SearchResult {
    let mut metadata = BTreeMap::new();
    metadata.insert("price".to_string(), CellValue::Int(price));
    SearchResult {
        score,
        data: Document {
            id: 0,
            text: text.to_string(),
            metadata,
            source_file: None,
        },
    }
}

fn llm_config(server: &MockServer, api_key: Option<&str>) -> LlmConfig {
    LlmConfig {
        base_url: format!("{}/openai/v1", server.uri()),
        api_key: api_key.map(str::to_string),
        ..LlmConfig::default()
    }
}

async fn mount_completion(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "llama-3.1-8b-instant",
            "max_tokens": 1000,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
        })))
        .mount(server)
        .await;
}

#[test]
fn prompt_embeds_query_and_results() {
    let prompt = build_prompt(
        "two bed flat",
        &[result(0.91, "Two bed flat near the river", 210_000)],
    );

    assert!(prompt.contains(r#"the query: "two bed flat""#));
    assert!(prompt.contains("Two bed flat near the river"));
    assert!(prompt.contains("210000"));
    assert!(prompt.contains("7. IMPORTANT: Complete your response fully"));
    assert!(prompt.ends_with("Response:"));
}

#[test]
fn complete_sentences_are_kept() {
    assert_eq!(finish_response("  Here are your homes!  "), "Here are your homes!");
    assert_eq!(finish_response("He said \"welcome\""), "He said \"welcome\"");
}

#[test]
fn truncated_responses_get_follow_up_offer() {
    assert_eq!(
        finish_response("The first property has three"),
        "The first property has three\n\nWould you like me to provide more details about any of these properties?"
    );
}

#[test]
fn missing_api_key_yields_apology() {
    let agent = ConversationalAgent::new(&LlmConfig::default());
    let response = agent.make_conversational("garden flat", &[]);

    assert!(response.starts_with(
        "I apologize, but I encountered an issue while processing your request:"
    ));
    assert!(response.contains("GROQ_API_KEY"));
    assert!(response.ends_with("Please try again or contact support if the problem persists."));
}

#[tokio::test(flavor = "multi_thread")]
async fn summary_from_completion_endpoint() {
    let server = MockServer::start().await;
    mount_completion(&server, "  I found two lovely homes for you.  ").await;

    let agent = ConversationalAgent::new(&llm_config(&server, Some("test-key")));
    let response = tokio::task::spawn_blocking(move || {
        agent.make_conversational("garden flat", &[result(0.8, "Garden flat", 250_000)])
    })
    .await
    .expect("blocking task should finish");

    assert_eq!(response, "I found two lovely homes for you.");
}

#[tokio::test(flavor = "multi_thread")]
async fn cut_off_completion_is_extended() {
    let server = MockServer::start().await;
    mount_completion(&server, "The cottage on Mill Lane offers").await;

    let agent = ConversationalAgent::new(&llm_config(&server, Some("test-key")));
    let response = tokio::task::spawn_blocking(move || agent.make_conversational("cottage", &[]))
        .await
        .expect("blocking task should finish");

    assert!(response.starts_with("The cottage on Mill Lane offers\n\n"));
    assert!(response.ends_with("any of these properties?"));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_yield_apology() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let agent = ConversationalAgent::new(&llm_config(&server, Some("test-key")));
    let response = tokio::task::spawn_blocking(move || agent.make_conversational("flat", &[]))
        .await
        .expect("blocking task should finish");

    assert!(response.starts_with("I apologize"));
    assert!(response.contains("503"));
}
