//! RAG pipeline: retrieve, rerank (or pass through), generate, log.
//!
//! The retrieval index, the cross-encoder, and the answer model are external
//! collaborators behind the `Retriever`/`Reranker`/`Generator` seams; this
//! module owns the orchestration between them.

pub mod generator;
pub mod logger;
pub mod prompts;
pub mod reranker;
pub mod retriever;

pub use generator::{AnthropicGenerator, GenerationResult, Generator};
pub use reranker::{HttpReranker, Reranker};
pub use retriever::{HttpRetriever, Retriever};

use std::path::Path;
use std::time::Instant;

use crate::anthropic::TokenUsage;
use crate::chunk::Chunk;
use crate::error::Result;

/// Ephemeral output of one (query, mode) pipeline run.
///
/// Never persisted directly; folded into an evaluation record or a pipeline
/// log entry.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub answer: String,
    /// Full retrieval pool, pre-rerank.
    pub retrieved_chunks: Vec<Chunk>,
    /// Chunks actually shown to the generator.
    pub used_chunks: Vec<Chunk>,
    pub model: String,
    pub prompt_version: String,
    pub usage: TokenUsage,
    /// Wall time around the generation call, seconds, 2 decimals.
    pub elapsed_seconds: f64,
    pub use_reranker: bool,
}

/// Run the full pipeline for a single query.
///
/// Retrieves `n_retrieve` chunks, keeps the top `n_rerank` (by cross-encoder
/// score when `reranker` is given, otherwise by similarity order with
/// `rerank_score` explicitly cleared), generates an answer over them, and
/// optionally appends a pipeline log entry.
pub async fn run_query(
    retriever: &dyn Retriever,
    reranker: Option<&dyn Reranker>,
    generator: &dyn Generator,
    query: &str,
    n_retrieve: usize,
    n_rerank: usize,
    log_path: Option<&Path>,
) -> Result<PipelineResult> {
    let retrieved = retriever.retrieve(query, n_retrieve, None).await?;
    log::info!("Retrieved {} chunks", retrieved.len());

    let used = match reranker {
        Some(reranker) => {
            let reranked = reranker.rerank(query, retrieved.clone(), n_rerank).await?;
            log::info!("Reranked to top {} chunks", reranked.len());
            reranked
        }
        None => {
            // Null scores mark "reranking not applied", distinct from a
            // near-zero cross-encoder score.
            let mut head: Vec<Chunk> = retrieved.iter().take(n_rerank).cloned().collect();
            for chunk in &mut head {
                chunk.rerank_score = None;
            }
            log::info!(
                "Skipped reranking, using top {} by embedding distance",
                head.len()
            );
            head
        }
    };

    let start = Instant::now();
    let generation = generator.generate(query, &used).await?;
    let elapsed_seconds = round2(start.elapsed().as_secs_f64());
    log::info!(
        "Generated answer ({} tokens, {:.2}s)",
        generation.usage.output_tokens,
        elapsed_seconds
    );

    if let Some(path) = log_path {
        logger::log_query(query, &retrieved, &used, &generation, path)?;
        log::info!("Logged to {}", path.display());
    }

    Ok(PipelineResult {
        answer: generation.answer,
        retrieved_chunks: retrieved,
        used_chunks: used,
        model: generation.model,
        prompt_version: generation.prompt_version,
        usage: generation.usage,
        elapsed_seconds,
        use_reranker: reranker.is_some(),
    })
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
