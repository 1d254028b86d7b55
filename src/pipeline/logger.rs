//! Structured JSONL logging for single-query pipeline runs.
//!
//! Each run is one appended line: query, retrieved chunks (previews), the
//! chunks passed to the generator (full text), and the generation output with
//! model and prompt version.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::anthropic::TokenUsage;
use crate::chunk::{Chunk, ChunkPreview};
use crate::error::{RagEvalError, Result};
use crate::pipeline::generator::GenerationResult;

/// One complete pipeline run, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub timestamp: String,
    pub query: String,
    pub retrieval: RetrievalLog,
    pub reranking: RerankingLog,
    pub generation: GenerationLog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalLog {
    pub n_retrieved: usize,
    pub chunks: Vec<ChunkPreview>,
}

/// Keeps full text: these are the chunks the generator actually saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankingLog {
    pub n_reranked: usize,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationLog {
    pub answer: String,
    pub model: String,
    pub prompt_version: String,
    pub usage: TokenUsage,
}

/// Append a complete pipeline run to the JSONL log and return the entry.
pub fn log_query(
    query: &str,
    retrieved_chunks: &[Chunk],
    used_chunks: &[Chunk],
    generation: &GenerationResult,
    log_path: &Path,
) -> Result<QueryLogEntry> {
    let entry = QueryLogEntry {
        timestamp: Utc::now().to_rfc3339(),
        query: query.to_string(),
        retrieval: RetrievalLog {
            n_retrieved: retrieved_chunks.len(),
            chunks: retrieved_chunks.iter().map(Chunk::preview).collect(),
        },
        reranking: RerankingLog {
            n_reranked: used_chunks.len(),
            chunks: used_chunks.to_vec(),
        },
        generation: GenerationLog {
            answer: generation.answer.clone(),
            model: generation.model.clone(),
            prompt_version: generation.prompt_version.clone(),
            usage: generation.usage,
        },
    };

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let line = serde_json::to_string(&entry)
        .map_err(|e| RagEvalError::Parse(format!("Failed to serialize log entry: {}", e)))?;

    let mut file = OpenOptions::new().create(true).append(true).open(log_path)?;
    writeln!(file, "{}", line)?;
    file.flush()?;

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_chunk(chunk_id: &str) -> Chunk {
        Chunk {
            source_id: "uriot2021".to_string(),
            chunk_id: chunk_id.to_string(),
            section_title: "Dataset".to_string(),
            text: "Kelvins challenge data covers two years of CDMs.".to_string(),
            distance: Some(0.28),
            rerank_score: Some(4.1),
            year: Some(2021),
            authors: "Uriot et al.".to_string(),
        }
    }

    fn make_generation() -> GenerationResult {
        GenerationResult {
            answer: "The dataset covers two years (uriot2021, sec3_p1).".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            prompt_version: "v1.0".to_string(),
            usage: TokenUsage {
                input_tokens: 900,
                output_tokens: 120,
            },
        }
    }

    #[test]
    fn log_query_appends_one_line_per_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("rag_queries.jsonl");

        let retrieved = vec![make_chunk("sec3_p1"), make_chunk("sec3_p2")];
        let used = vec![make_chunk("sec3_p1")];
        let generation = make_generation();

        log_query("q1", &retrieved, &used, &generation, &path).unwrap();
        log_query("q2", &retrieved, &used, &generation, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let entry: QueryLogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry.query, "q1");
        assert_eq!(entry.retrieval.n_retrieved, 2);
        assert_eq!(entry.reranking.n_reranked, 1);
        // Retrieved chunks are previews; used chunks keep full text.
        assert_eq!(entry.reranking.chunks[0].text, used[0].text);
        assert_eq!(entry.generation.prompt_version, "v1.0");
    }
}
