//! Minimal Anthropic messages API client shared by generation and judging.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Messages API endpoint.
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Input/output token counts reported by the API, kept per record for cost
/// accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// One completion request against the messages API.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub system: Option<&'a str>,
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

/// Completion text plus reported usage.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Anthropic messages API client.
///
/// Errors are returned as plain strings so callers can wrap them in the
/// collaborator-specific error variant (generation vs judge).
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl AnthropicClient {
    /// Create a client with the given API key.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// normal operation)
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            api_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Override the API endpoint (local proxies, tests).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Run a single-turn completion and return the concatenated text blocks.
    pub async fn complete(
        &self,
        request: &CompletionRequest<'_>,
    ) -> std::result::Result<Completion, String> {
        let body = MessagesRequest {
            model: request.model,
            max_tokens: request.max_tokens,
            system: request.system,
            temperature: request.temperature,
            messages: vec![ApiMessage {
                role: "user",
                content: request.prompt,
            }],
        };

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(format!("Anthropic API error {}: {}", status, body));
        }

        let result: MessagesResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))?;

        log::debug!(
            "Messages API call ({}) took {:?}",
            request.model,
            start.elapsed()
        );

        let text = result
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<String>();

        Ok(Completion {
            text,
            usage: result.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_deserializes_from_api_shape() {
        let usage: TokenUsage =
            serde_json::from_str(r#"{"input_tokens": 1200, "output_tokens": 150}"#).unwrap();
        assert_eq!(usage.input_tokens, 1200);
        assert_eq!(usage.output_tokens, 150);
    }

    #[test]
    fn test_response_concatenates_text_blocks() {
        let raw = r#"{
            "content": [
                {"type": "text", "text": "part one "},
                {"type": "tool_use"},
                {"type": "text", "text": "part two"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect();
        assert_eq!(text, "part one part two");
    }
}
