//! Similarity search service client.
//!
//! The corpus index lives behind an HTTP service; this client posts a query
//! and gets back a ranked chunk list with embedding distances. Retrieval
//! deliberately over-fetches so the reranker has a genuine pool to work with.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::chunk::Chunk;
use crate::error::{RagEvalError, Result};

/// Retrieval seam: top-k chunks for a query, with optional metadata filter.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize, filter: Option<&Value>) -> Result<Vec<Chunk>>;
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    collection: &'a str,
    query: &'a str,
    k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    chunks: Vec<Chunk>,
}

/// HTTP client for the similarity search service.
pub struct HttpRetriever {
    client: Client,
    base_url: String,
    collection: String,
}

impl HttpRetriever {
    /// Create a retriever for the given service URL and collection.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// normal operation)
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self, query: &str, k: usize, filter: Option<&Value>) -> Result<Vec<Chunk>> {
        let request = QueryRequest {
            collection: &self.collection,
            query,
            k,
            filter,
        };

        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagEvalError::Search(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(RagEvalError::Search(format!(
                "Search service error {}: {}",
                status, body
            )));
        }

        let result: QueryResponse = response
            .json()
            .await
            .map_err(|e| RagEvalError::Search(format!("Failed to parse response: {}", e)))?;

        log::debug!(
            "Retrieved {} chunks for query ({} requested)",
            result.chunks.len(),
            k
        );

        Ok(result.chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriever_strips_trailing_slash() {
        let retriever = HttpRetriever::new("http://localhost:8900/", "debris_research");
        assert_eq!(retriever.base_url, "http://localhost:8900");
        assert_eq!(retriever.collection, "debris_research");
    }

    #[test]
    fn test_query_request_omits_empty_filter() {
        let request = QueryRequest {
            collection: "debris_research",
            query: "conjunction screening",
            k: 20,
            filter: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("filter"));
        assert!(json.contains("\"k\":20"));
    }
}
