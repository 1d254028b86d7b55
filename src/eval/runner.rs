//! Evaluation run orchestrator.
//!
//! Drives the fixed query set through the pipeline in each requested mode,
//! scores each answer with the quality judge, and appends one record per
//! run to the durable log before the next query starts. A collaborator
//! failure becomes an error record and the batch continues; only the
//! in-flight record can ever be lost.

use std::path::PathBuf;

use crate::error::Result;
use crate::eval::judge::{self, JudgeOracle, QualityVerdict};
use crate::eval::query::EvalQuery;
use crate::eval::record::{append_jsonl, ErrorRecord, EvalRecord, LogLine};
use crate::pipeline::{self, Generator, Reranker, Retriever};

/// Pipeline configuration under evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Cross-encoder reranking between retrieval and generation.
    Rerank,
    /// Similarity order only.
    Baseline,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Rerank => "rerank",
            Mode::Baseline => "baseline",
        }
    }

    /// Build the mode schedule. Rerank runs before baseline so run numbering
    /// stays stable across invocations.
    pub fn schedule(rerank_only: bool, baseline_only: bool) -> Vec<Mode> {
        let mut modes = Vec::new();
        if !baseline_only {
            modes.push(Mode::Rerank);
        }
        if !rerank_only {
            modes.push(Mode::Baseline);
        }
        modes
    }
}

/// Orchestrator settings for one batch.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Durable JSONL log for this batch.
    pub output: PathBuf,
    /// Chunks to retrieve per query.
    pub n_retrieve: usize,
    /// Chunks kept for generation.
    pub n_rerank: usize,
}

/// Sequential batch runner over injected collaborator handles.
///
/// Collaborators are constructed once at startup and borrowed here, so an
/// expensive resource (the reranker model behind its service) is initialized
/// once and shared read-only across the whole batch.
pub struct EvalRunner<'a> {
    retriever: &'a dyn Retriever,
    reranker: &'a dyn Reranker,
    generator: &'a dyn Generator,
    /// `None` disables scoring for the batch.
    judge: Option<&'a dyn JudgeOracle>,
    options: RunOptions,
}

impl<'a> EvalRunner<'a> {
    pub fn new(
        retriever: &'a dyn Retriever,
        reranker: &'a dyn Reranker,
        generator: &'a dyn Generator,
        judge: Option<&'a dyn JudgeOracle>,
        options: RunOptions,
    ) -> Self {
        Self {
            retriever,
            reranker,
            generator,
            judge,
            options,
        }
    }

    /// Run every query in every mode, in order, appending each finished
    /// record before the next query begins. Returns all lines written.
    pub async fn run(&self, queries: &[EvalQuery], modes: &[Mode]) -> Result<Vec<LogLine>> {
        if let Some(parent) = self.options.output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let total = queries.len() * modes.len();
        let mut lines = Vec::with_capacity(total);
        let mut run_idx = 0;

        for mode in modes {
            let mode_label = match mode {
                Mode::Rerank => "WITH reranking",
                Mode::Baseline => "WITHOUT reranking (baseline)",
            };
            println!("\n{}", "=".repeat(50));
            println!("Running {} queries {}", queries.len(), mode_label);
            println!("{}\n", "=".repeat(50));

            for query in queries {
                run_idx += 1;
                print_progress(run_idx, total, &query.id, *mode, None);

                match self.run_one(query, *mode).await {
                    Ok(record) => {
                        if record.groundedness_score.is_some() {
                            print_progress(
                                run_idx,
                                total,
                                &query.id,
                                *mode,
                                Some(&QualityVerdict {
                                    groundedness_score: record.groundedness_score.unwrap_or(0),
                                    groundedness_rationale: String::new(),
                                    citation_score: record.citation_score.unwrap_or(0),
                                    citation_rationale: String::new(),
                                    failure_tags: record.failure_tags.clone().unwrap_or_default(),
                                }),
                            );
                        }
                        append_jsonl(&self.options.output, &record)?;
                        lines.push(LogLine::Record(Box::new(record)));
                    }
                    Err(e) => {
                        log::error!("Query {} ({}) failed: {}", query.id, mode.label(), e);
                        println!("  ERROR on {} ({}): {}", query.id, mode.label(), e);
                        let error_record = ErrorRecord::new(query, *mode == Mode::Rerank, &e);
                        append_jsonl(&self.options.output, &error_record)?;
                        lines.push(LogLine::Error(error_record));
                    }
                }
            }
        }

        Ok(lines)
    }

    /// One (query, mode) pair: retrieve, rerank or pass through, generate,
    /// score, merge.
    async fn run_one(&self, query: &EvalQuery, mode: Mode) -> Result<EvalRecord> {
        let reranker = match mode {
            Mode::Rerank => Some(self.reranker),
            Mode::Baseline => None,
        };

        let result = pipeline::run_query(
            self.retriever,
            reranker,
            self.generator,
            &query.query,
            self.options.n_retrieve,
            self.options.n_rerank,
            None,
        )
        .await?;

        let mut record = EvalRecord::new(query, &result);

        if let Some(oracle) = self.judge {
            // The judge must see exactly what the generator saw, never the
            // full retrieved pool.
            let judge_chunks = if result.used_chunks.is_empty() {
                &result.retrieved_chunks
            } else {
                &result.used_chunks
            };
            let assessment =
                judge::score_quality(oracle, &query.query, &result.answer, judge_chunks).await?;
            record.apply_quality(assessment);
        }

        Ok(record)
    }
}

/// Compact per-run progress line with live scores once available.
fn print_progress(idx: usize, total: usize, query_id: &str, mode: Mode, scores: Option<&QualityVerdict>) {
    let prefix = format!("[{}/{}] {} ({})", idx, total, query_id, mode.label());
    match scores {
        Some(verdict) => {
            let tag_str = if verdict.failure_tags.is_empty() {
                String::new()
            } else {
                format!(" | tags: {}", verdict.failure_tags.join(", "))
            };
            println!(
                "  {}: G={} C={}{}",
                prefix, verdict.groundedness_score, verdict.citation_score, tag_str
            );
        }
        None => println!("  {}: running...", prefix),
    }
}
