//! Evaluation record shapes and JSONL persistence.
//!
//! One record per (query, mode) run, appended to the durable log and flushed
//! before the next query starts: a crash mid-batch loses at most the
//! in-flight record. Records are never mutated in place; the enrichment pass
//! writes its additions to a new stream.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::anthropic::TokenUsage;
use crate::chunk::ChunkPreview;
use crate::error::{RagEvalError, Result};
use crate::eval::judge::{CompletenessAssessment, JudgeTokens, QualityAssessment};
use crate::eval::query::{Category, EvalQuery};
use crate::pipeline::PipelineResult;

/// How many of the logged chunks count as "sent to the generator" for
/// judging and mechanical metrics.
pub const SENT_POOL: usize = 10;

/// The unit of persistence: query metadata, pipeline configuration and
/// output (chunks reduced to previews), judge verdicts, and mechanical
/// metrics. Score and metric fields are absent until the relevant pass has
/// run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRecord {
    pub timestamp: String,
    pub query_id: String,
    pub category: Category,
    #[serde(default)]
    pub sub_question: String,
    pub query: String,
    #[serde(default)]
    pub expected_sources: Vec<String>,
    #[serde(default)]
    pub notes: String,
    pub use_reranker: bool,
    pub model: String,
    pub prompt_version: String,
    pub answer: String,
    #[serde(default)]
    pub retrieved_chunks: Vec<ChunkPreview>,
    #[serde(default)]
    pub reranked_chunks: Vec<ChunkPreview>,
    #[serde(default)]
    pub generation_tokens: TokenUsage,
    #[serde(default)]
    pub elapsed_seconds: f64,

    // Quality judgment (first scoring pass).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groundedness_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groundedness_rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_tokens: Option<JudgeTokens>,

    // Enrichment pass: mechanical metrics + completeness judgment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_recall: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_utilization: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness_rationale: Option<String>,
}

impl EvalRecord {
    /// Fold query metadata and pipeline output into a fresh, unscored record.
    pub fn new(query: &EvalQuery, result: &PipelineResult) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            query_id: query.id.clone(),
            category: query.category,
            sub_question: query.sub_question.clone(),
            query: query.query.clone(),
            expected_sources: query.expected_sources.clone(),
            notes: query.notes.clone(),
            use_reranker: result.use_reranker,
            model: result.model.clone(),
            prompt_version: result.prompt_version.clone(),
            answer: result.answer.clone(),
            retrieved_chunks: result.retrieved_chunks.iter().map(|c| c.preview()).collect(),
            reranked_chunks: result.used_chunks.iter().map(|c| c.preview()).collect(),
            generation_tokens: result.usage,
            elapsed_seconds: result.elapsed_seconds,
            groundedness_score: None,
            groundedness_rationale: None,
            citation_score: None,
            citation_rationale: None,
            failure_tags: None,
            judge_model: None,
            judge_tokens: None,
            retrieval_recall: None,
            context_utilization: None,
            completeness_score: None,
            completeness_rationale: None,
        }
    }

    /// Merge a quality judgment into the record.
    pub fn apply_quality(&mut self, assessment: QualityAssessment) {
        self.groundedness_score = Some(assessment.verdict.groundedness_score);
        self.groundedness_rationale = Some(assessment.verdict.groundedness_rationale);
        self.citation_score = Some(assessment.verdict.citation_score);
        self.citation_rationale = Some(assessment.verdict.citation_rationale);
        self.failure_tags = Some(assessment.verdict.failure_tags);
        self.judge_model = Some(assessment.judge_model);
        self.judge_tokens = Some(assessment.judge_tokens);
    }

    /// Merge a completeness judgment into the record.
    pub fn apply_completeness(&mut self, assessment: &CompletenessAssessment) {
        self.completeness_score = Some(assessment.verdict.completeness_score);
        self.completeness_rationale = Some(assessment.verdict.completeness_rationale.clone());
    }

    /// The chunks that were actually shown to the generator: reranked when
    /// reranking ran and produced output, else the similarity-ordered head.
    pub fn sent_chunks(&self) -> &[ChunkPreview] {
        let pool = if self.use_reranker && !self.reranked_chunks.is_empty() {
            &self.reranked_chunks
        } else {
            &self.retrieved_chunks
        };
        &pool[..pool.len().min(SENT_POOL)]
    }

    /// True when the quality judge produced a usable (non-sentinel) score.
    pub fn is_scored(&self) -> bool {
        self.groundedness_score.unwrap_or(0) > 0
    }
}

/// Persisted in place of a full record when a collaborator call fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: String,
    pub query_id: String,
    pub query: String,
    pub use_reranker: bool,
    pub error: String,
    pub category: Category,
}

impl ErrorRecord {
    pub fn new(query: &EvalQuery, use_reranker: bool, error: &RagEvalError) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            query_id: query.id.clone(),
            query: query.query.clone(),
            use_reranker,
            error: error.to_string(),
            category: query.category,
        }
    }
}

/// One line of the evaluation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogLine {
    Record(Box<EvalRecord>),
    Error(ErrorRecord),
}

impl LogLine {
    pub fn as_record(&self) -> Option<&EvalRecord> {
        match self {
            LogLine::Record(record) => Some(record),
            LogLine::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LogLine::Error(_))
    }
}

/// Append one record as a JSON line, flushed before returning.
///
/// The file handle is opened per write and released immediately, so no
/// writable handle is held across slow collaborator calls.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let line = serde_json::to_string(value)
        .map_err(|e| RagEvalError::Parse(format!("Failed to serialize record: {}", e)))?;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    file.flush()?;

    Ok(())
}

/// Read an evaluation log back, skipping blank lines.
pub fn read_log(path: &Path) -> Result<Vec<LogLine>> {
    let raw = std::fs::read_to_string(path)?;

    let mut lines = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: LogLine = serde_json::from_str(line).map_err(|e| {
            RagEvalError::Parse(format!("Invalid record on line {}: {}", idx + 1, e))
        })?;
        lines.push(parsed);
    }

    Ok(lines)
}
