//! Cross-encoder reranking of retrieved chunks.
//!
//! After initial retrieval (bi-encoder similarity), a cross-encoder scores
//! each query-chunk pair jointly for more accurate relevance ranking. The
//! model runs behind an HTTP service; this client sends the pairs and
//! attaches the returned scores.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;

use crate::chunk::Chunk;
use crate::error::{RagEvalError, Result};

/// Reranking seam: reorder chunks by joint query-passage relevance.
///
/// Every returned chunk carries a `rerank_score`; the result is sorted by
/// score descending and truncated to `top_k`.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, chunks: Vec<Chunk>, top_k: usize) -> Result<Vec<Chunk>>;
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    passages: Vec<&'a str>,
}

#[derive(Deserialize)]
struct RerankResponse {
    scores: Vec<f64>,
}

/// HTTP client for the cross-encoder reranker service.
pub struct HttpReranker {
    client: Client,
    base_url: String,
    model: String,
}

impl HttpReranker {
    /// Create a reranker client for the given service URL and model.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// normal operation)
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, chunks: Vec<Chunk>, top_k: usize) -> Result<Vec<Chunk>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let request = RerankRequest {
            model: &self.model,
            query,
            passages: chunks.iter().map(|c| c.text.as_str()).collect(),
        };

        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagEvalError::Rerank(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(RagEvalError::Rerank(format!(
                "Reranker service error {}: {}",
                status, body
            )));
        }

        let result: RerankResponse = response
            .json()
            .await
            .map_err(|e| RagEvalError::Rerank(format!("Failed to parse response: {}", e)))?;

        if result.scores.len() != chunks.len() {
            return Err(RagEvalError::Rerank(format!(
                "Score count mismatch: {} scores for {} chunks",
                result.scores.len(),
                chunks.len()
            )));
        }

        Ok(apply_scores(chunks, &result.scores, top_k))
    }
}

/// Attach cross-encoder scores, sort descending, keep the top-k.
fn apply_scores(mut chunks: Vec<Chunk>, scores: &[f64], top_k: usize) -> Vec<Chunk> {
    for (chunk, score) in chunks.iter_mut().zip(scores) {
        chunk.rerank_score = Some(*score);
    }
    chunks.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(Ordering::Equal)
    });
    chunks.truncate(top_k);
    chunks
}
