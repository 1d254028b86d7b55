//! Second scoring pass over an existing evaluation log.
//!
//! Reads a finished record log, adds mechanical metrics to every full record,
//! and (unless running dry) a completeness verdict per record. Output goes to
//! a new JSONL stream; the input log is never mutated, so the first pass
//! stays an immutable audit trail. Error lines pass through unchanged.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::eval::judge::{self, JudgeOracle, JudgeTokens};
use crate::eval::metrics;
use crate::eval::record::{append_jsonl, read_log, EvalRecord, LogLine};
use crate::eval::report::{self, EnrichedSummary};

/// Settings for one enrichment pass.
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Existing evaluation log to read.
    pub input: PathBuf,
    /// New record stream to write (truncated at start).
    pub output: PathBuf,
    /// Enriched summary JSON path.
    pub summary: PathBuf,
    /// Pause between judge calls to stay under external rate limits.
    pub delay: Duration,
}

/// Everything the pass produced: the enriched lines, the summary as written,
/// and the judge token total across all completeness calls.
pub struct EnrichOutcome {
    pub lines: Vec<LogLine>,
    pub summary: EnrichedSummary,
    pub judge_tokens: JudgeTokens,
}

fn fmt_metric(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "-".to_string())
}

/// Run the enrichment pass. With `oracle = None` only the mechanical metrics
/// are computed (the dry run); completeness scoring needs the judge.
pub async fn enrich_log(
    oracle: Option<&dyn JudgeOracle>,
    options: &EnrichOptions,
) -> Result<EnrichOutcome> {
    let lines = read_log(&options.input)?;
    log::info!(
        "Loaded {} records from {}",
        lines.len(),
        options.input.display()
    );

    if let Some(parent) = options.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Fresh derived stream: re-running the pass replaces it wholesale.
    std::fs::write(&options.output, "")?;

    let total = lines.len();
    let mut enriched = Vec::with_capacity(total);
    let mut judge_tokens = JudgeTokens::default();

    for (idx, line) in lines.into_iter().enumerate() {
        match line {
            LogLine::Error(error) => {
                append_jsonl(&options.output, &error)?;
                enriched.push(LogLine::Error(error));
            }
            LogLine::Record(mut record) => {
                enrich_record(oracle, &mut record, &mut judge_tokens).await;
                print_enrich_progress(idx + 1, total, &record);
                append_jsonl(&options.output, &record)?;
                enriched.push(LogLine::Record(record));

                if oracle.is_some() && idx + 1 < total && !options.delay.is_zero() {
                    tokio::time::sleep(options.delay).await;
                }
            }
        }
    }

    let records: Vec<&EvalRecord> = enriched.iter().filter_map(LogLine::as_record).collect();
    let mut summary = report::enriched_summary(&records);
    summary.source_file = Some(options.input.display().to_string());
    if let Some(oracle) = oracle {
        summary.judge_model = Some(oracle.model().to_string());
        summary.completeness_judge_tokens = Some(judge_tokens);
    }
    report::write_summary(&options.summary, &summary)?;

    Ok(EnrichOutcome {
        lines: enriched,
        summary,
        judge_tokens,
    })
}

/// Add mechanical metrics and, when the judge is available, a completeness
/// verdict to one record. A judge call failure leaves the score absent with
/// a diagnostic rationale; it never aborts the pass.
async fn enrich_record(
    oracle: Option<&dyn JudgeOracle>,
    record: &mut EvalRecord,
    judge_tokens: &mut JudgeTokens,
) {
    record.retrieval_recall = metrics::retrieval_recall(record);
    record.context_utilization = metrics::context_utilization(record);

    if let Some(oracle) = oracle {
        match judge::score_completeness(oracle, record).await {
            Ok(assessment) => {
                judge_tokens.input += assessment.judge_tokens.input;
                judge_tokens.output += assessment.judge_tokens.output;
                record.apply_completeness(&assessment);
            }
            Err(e) => {
                log::error!("Completeness scoring failed for {}: {}", record.query_id, e);
                record.completeness_score = None;
                record.completeness_rationale = Some(format!("Scoring error: {}", e));
            }
        }
    }
}

fn print_enrich_progress(idx: usize, total: usize, record: &EvalRecord) {
    let mode = if record.use_reranker { "rerank" } else { "baseline" };
    match record.completeness_score {
        Some(score) => println!(
            "  [{}/{}] {} {}: completeness={} ret_recall={} ctx_util={}",
            idx,
            total,
            record.query_id,
            mode,
            score,
            fmt_metric(record.retrieval_recall),
            fmt_metric(record.context_utilization)
        ),
        None => println!(
            "  [{}/{}] {} {}: ret_recall={} ctx_util={}",
            idx,
            total,
            record.query_id,
            mode,
            fmt_metric(record.retrieval_recall),
            fmt_metric(record.context_utilization)
        ),
    }
}
