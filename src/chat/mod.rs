// Conversational summaries of search results
// Sends results to an OpenAI-compatible chat completions endpoint

#[cfg(test)]
mod tests;

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::database::lancedb::SearchResult;

const FOLLOW_UP_OFFER: &str =
    "\n\nWould you like me to provide more details about any of these properties?";
const SENTENCE_ENDINGS: [char; 5] = ['.', '!', '?', '"', '\''];

#[derive(Debug, Clone)]
pub struct ConversationalAgent {
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ConversationalAgent {
    #[inline]
    pub fn new(config: &LlmConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key: config.api_key.clone(),
            agent,
        }
    }

    /// A friendly summary of `results`; failures become an apology naming the problem
    #[inline]
    pub fn make_conversational(&self, query: &str, results: &[SearchResult]) -> String {
        let prompt = build_prompt(query, results);

        match self.complete(&prompt) {
            Ok(response) => finish_response(&response),
            Err(e) => {
                warn!("Conversational summary failed: {:#}", e);
                format!(
                    "I apologize, but I encountered an issue while processing your request: {:#}. Please try again or contact support if the problem persists.",
                    e
                )
            }
        }
    }

    /// Send one user message and return the first choice's text
    #[inline]
    pub fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .context("No LLM API key configured (set GROQ_API_KEY)")?;

        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        debug!("Requesting chat completion from {}", self.endpoint);

        let response_text = self
            .agent
            .post(self.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .context("Chat completion request failed")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Chat response contained no message")
    }
}

/// Prompt asking for a warm, complete summary of the search results
#[inline]
pub fn build_prompt(query: &str, results: &[SearchResult]) -> String {
    let data = serde_json::to_string_pretty(results).unwrap_or_else(|_| String::from("[]"));

    format!(
        r#"You are a helpful real estate assistant. A user searched for properties with the query: "{query}"

Here are the search results:
{data}

Please provide a complete, friendly, conversational response that:
1. Acknowledges their search query warmly
2. Summarizes the key findings in an easy-to-understand way
3. Highlights the most relevant properties with specific details
4. Mentions important details like property type, location, price, and features
5. Uses a warm, professional tone
6. Provides actionable next steps or offers to help with more details
7. IMPORTANT: Complete your response fully - don't cut off mid-sentence

Make sure to finish your thoughts completely and end with a helpful closing statement.

Response:"#
    )
}

/// Trim the model output and offer more help when it stops mid-sentence
#[inline]
pub fn finish_response(raw: &str) -> String {
    let response = raw.trim();
    if response.ends_with(SENTENCE_ENDINGS) {
        response.to_string()
    } else {
        format!("{}{}", response, FOLLOW_UP_OFFER)
    }
}
