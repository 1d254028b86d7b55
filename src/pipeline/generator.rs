//! Citation-backed answer generation via the Anthropic messages API.

use async_trait::async_trait;

use crate::anthropic::{AnthropicClient, CompletionRequest, TokenUsage};
use crate::chunk::Chunk;
use crate::error::{RagEvalError, Result};
use crate::pipeline::prompts;

/// Generation seam: query plus evidence chunks in, cited answer out.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, query: &str, chunks: &[Chunk]) -> Result<GenerationResult>;
}

/// Output of one generation call.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub answer: String,
    pub model: String,
    pub prompt_version: String,
    pub usage: TokenUsage,
}

/// Anthropic-backed answer generator.
pub struct AnthropicGenerator {
    client: AnthropicClient,
    model: String,
    max_tokens: u32,
}

impl AnthropicGenerator {
    pub fn new(api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            client: AnthropicClient::new(api_key),
            model,
            max_tokens,
        }
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    async fn generate(&self, query: &str, chunks: &[Chunk]) -> Result<GenerationResult> {
        let prompt = prompts::build_user_prompt(query, chunks);

        let completion = self
            .client
            .complete(&CompletionRequest {
                model: &self.model,
                system: Some(prompts::SYSTEM_PROMPT),
                prompt: &prompt,
                max_tokens: self.max_tokens,
                temperature: None,
            })
            .await
            .map_err(RagEvalError::Generation)?;

        Ok(GenerationResult {
            answer: completion.text,
            model: self.model.clone(),
            prompt_version: prompts::PROMPT_VERSION.to_string(),
            usage: completion.usage,
        })
    }
}
