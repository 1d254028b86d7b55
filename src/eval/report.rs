//! Aggregation and reporting over finished evaluation records.
//!
//! A pure, read-only pass: records are split by mode and category, sentinel
//! and unscored records are excluded from means (but kept in raw totals),
//! and mechanical metrics average over non-null values only. The signed
//! reranked-minus-baseline delta on groundedness and citation is the primary
//! regression signal.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{RagEvalError, Result};
use crate::eval::judge::JudgeTokens;
use crate::eval::query::Category;
use crate::eval::record::{EvalRecord, LogLine};

/// How many lowest-scoring records the failure-case shortlist keeps.
pub const WORST_N: usize = 5;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Records with a usable quality score: positive groundedness only. Parse
/// sentinels and unscored runs stay out of every mean.
fn scored<'a>(records: &[&'a EvalRecord]) -> Vec<&'a EvalRecord> {
    records.iter().copied().filter(|r| r.is_scored()).collect()
}

/// Mean groundedness and citation over the scored subset.
fn quality_means(records: &[&EvalRecord]) -> Option<(f64, f64)> {
    let scored = scored(records);
    let g: Vec<f64> = scored
        .iter()
        .map(|r| f64::from(r.groundedness_score.unwrap_or(0)))
        .collect();
    let c: Vec<f64> = scored
        .iter()
        .map(|r| f64::from(r.citation_score.unwrap_or(0)))
        .collect();
    Some((mean(&g)?, mean(&c)?))
}

fn per_category<'a>(records: &[&'a EvalRecord]) -> BTreeMap<Category, Vec<&'a EvalRecord>> {
    let mut by_category: BTreeMap<Category, Vec<&EvalRecord>> = BTreeMap::new();
    for record in records {
        by_category.entry(record.category).or_default().push(record);
    }
    by_category
}

/// Frequency histogram over every failure tag present in `records`, sorted
/// descending by count (ties alphabetical). The parse-failure tag counts
/// too: judge flakiness stays visible even though sentinels never enter the
/// score means.
pub fn failure_tag_histogram(records: &[&EvalRecord]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        if let Some(tags) = &record.failure_tags {
            for tag in tags {
                *counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }
    }
    let mut histogram: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(tag, n)| (tag.to_string(), n))
        .collect();
    histogram.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    histogram
}

/// Signed reranked-minus-baseline deltas, 2 decimals. `None` unless both
/// modes have scored records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RerankDelta {
    pub groundedness: f64,
    pub citation: f64,
}

pub fn rerank_delta(records: &[&EvalRecord]) -> Option<RerankDelta> {
    let rerank: Vec<&EvalRecord> = records.iter().copied().filter(|r| r.use_reranker).collect();
    let baseline: Vec<&EvalRecord> = records.iter().copied().filter(|r| !r.use_reranker).collect();

    let (rerank_g, rerank_c) = quality_means(&rerank)?;
    let (baseline_g, baseline_c) = quality_means(&baseline)?;

    Some(RerankDelta {
        groundedness: round2(rerank_g - baseline_g),
        citation: round2(rerank_c - baseline_c),
    })
}

/// The `n` lowest-scoring records across all modes, by groundedness plus
/// citation, for manual failure-case review.
pub fn worst_records<'a>(records: &[&'a EvalRecord], n: usize) -> Vec<&'a EvalRecord> {
    let mut candidates = scored(records);
    candidates.sort_by_key(|r| {
        u16::from(r.groundedness_score.unwrap_or(0)) + u16::from(r.citation_score.unwrap_or(0))
    });
    candidates.truncate(n);
    candidates
}

/// Per-mode averages written into the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct ModeAverages {
    pub n: usize,
    pub avg_groundedness: f64,
    pub avg_citation: f64,
}

fn mode_averages(records: &[&EvalRecord], use_reranker: bool) -> Option<ModeAverages> {
    let subset: Vec<&EvalRecord> = records
        .iter()
        .copied()
        .filter(|r| r.use_reranker == use_reranker && r.is_scored())
        .collect();
    let (g, c) = quality_means(&subset)?;
    Some(ModeAverages {
        n: subset.len(),
        avg_groundedness: round2(g),
        avg_citation: round2(c),
    })
}

/// Companion summary written once at batch end next to the record log.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_date: String,
    pub total_queries: usize,
    pub total_runs: usize,
    pub errors: usize,
    pub modes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank: Option<ModeAverages>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<ModeAverages>,
}

pub fn run_summary(lines: &[LogLine], total_queries: usize, mode_labels: &[&str]) -> RunSummary {
    let records: Vec<&EvalRecord> = lines.iter().filter_map(LogLine::as_record).collect();
    RunSummary {
        run_date: Utc::now().to_rfc3339(),
        total_queries,
        total_runs: lines.len(),
        errors: lines.iter().filter(|l| l.is_error()).count(),
        modes: mode_labels.iter().map(|s| s.to_string()).collect(),
        rerank: mode_averages(&records, true),
        baseline: mode_averages(&records, false),
    }
}

/// Per-category (or overall) statistics in the enriched summary.
///
/// Judge-score means exclude sentinels; mechanical-metric means exclude
/// nulls. Absent signals serialize as absent keys, never as zero.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryStats {
    pub n: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_groundedness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_citation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_completeness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_retrieval_recall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_retrieval_recall: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_context_utilization: Option<f64>,
}

fn category_stats(records: &[&EvalRecord]) -> CategoryStats {
    let scored = scored(records);
    let g: Vec<f64> = scored
        .iter()
        .map(|r| f64::from(r.groundedness_score.unwrap_or(0)))
        .collect();
    let c: Vec<f64> = scored
        .iter()
        .map(|r| f64::from(r.citation_score.unwrap_or(0)))
        .collect();
    let completeness: Vec<f64> = records
        .iter()
        .filter_map(|r| r.completeness_score)
        .filter(|&s| s > 0)
        .map(f64::from)
        .collect();
    let recall: Vec<f64> = records.iter().filter_map(|r| r.retrieval_recall).collect();
    let utilization: Vec<f64> = records
        .iter()
        .filter_map(|r| r.context_utilization)
        .collect();

    CategoryStats {
        n: records.len(),
        avg_groundedness: mean(&g).map(round2),
        avg_citation: mean(&c).map(round2),
        avg_completeness: mean(&completeness).map(round2),
        avg_retrieval_recall: mean(&recall).map(round2),
        n_retrieval_recall: (!recall.is_empty()).then_some(recall.len()),
        avg_context_utilization: mean(&utilization).map(round2),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeStats {
    pub n: usize,
    pub by_category: BTreeMap<String, CategoryStats>,
    pub overall: CategoryStats,
}

/// Rich per-mode, per-category summary produced by the enrichment pass.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedSummary {
    pub run_date: String,
    pub total_runs: usize,
    pub modes: BTreeMap<String, ModeStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completeness_judge_tokens: Option<JudgeTokens>,
}

pub fn enriched_summary(records: &[&EvalRecord]) -> EnrichedSummary {
    let mut modes = BTreeMap::new();

    for (label, use_reranker) in [("rerank", true), ("baseline", false)] {
        let subset: Vec<&EvalRecord> = records
            .iter()
            .copied()
            .filter(|r| r.use_reranker == use_reranker)
            .collect();
        if subset.is_empty() {
            continue;
        }

        let by_category = per_category(&subset)
            .into_iter()
            .map(|(category, records)| (category.to_string(), category_stats(&records)))
            .collect();

        modes.insert(
            label.to_string(),
            ModeStats {
                n: subset.len(),
                by_category,
                overall: category_stats(&subset),
            },
        );
    }

    EnrichedSummary {
        run_date: Utc::now().to_rfc3339(),
        total_runs: records.len(),
        modes,
        source_file: None,
        judge_model: None,
        completeness_judge_tokens: None,
    }
}

/// Write a summary object as pretty-printed JSON, creating parent dirs.
pub fn write_summary<T: Serialize>(path: &Path, summary: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| RagEvalError::Parse(format!("Failed to serialize summary: {}", e)))?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Human-readable end-of-batch summary, printed regardless of how many
/// individual queries failed.
pub fn print_summary(lines: &[LogLine]) {
    let records: Vec<&EvalRecord> = lines.iter().filter_map(LogLine::as_record).collect();
    if records.is_empty() {
        println!("\nNo records to summarize.");
        return;
    }

    println!("\n{}", "=".repeat(70));
    println!("EVALUATION SUMMARY");
    println!("{}", "=".repeat(70));

    for (label, use_reranker) in [("With Reranking", true), ("Baseline (No Reranking)", false)] {
        let subset: Vec<&EvalRecord> = records
            .iter()
            .copied()
            .filter(|r| r.use_reranker == use_reranker)
            .collect();
        if subset.is_empty() {
            continue;
        }

        let Some((avg_g, avg_c)) = quality_means(&subset) else {
            println!("\n{}: {} queries run, no scores available", label, subset.len());
            continue;
        };

        println!("\n--- {} ---", label);
        println!("  Queries scored: {}", scored(&subset).len());
        println!("  Avg Groundedness: {:.2} / 4.00", avg_g);
        println!("  Avg Citation Correctness: {:.2} / 4.00", avg_c);

        let tags = failure_tag_histogram(&subset);
        if tags.is_empty() {
            println!("  Failure tags: none");
        } else {
            println!("  Failure tags:");
            for (tag, count) in &tags {
                println!("    {}: {}", tag, count);
            }
        }

        println!("  By category:");
        for (category, members) in per_category(&scored(&subset)) {
            if let Some((cat_g, cat_c)) = quality_means(&members) {
                println!(
                    "    {}: G={:.2} C={:.2} (n={})",
                    category,
                    cat_g,
                    cat_c,
                    members.len()
                );
            }
        }
    }

    let rerank: Vec<&EvalRecord> = records.iter().copied().filter(|r| r.use_reranker).collect();
    let baseline: Vec<&EvalRecord> = records.iter().copied().filter(|r| !r.use_reranker).collect();
    if let (Some((rerank_g, rerank_c)), Some((baseline_g, baseline_c))) =
        (quality_means(&rerank), quality_means(&baseline))
    {
        println!("\n--- Reranking Impact ---");
        println!(
            "  Groundedness:  {:.2} -> {:.2} (delta = {:+.2})",
            baseline_g,
            rerank_g,
            rerank_g - baseline_g
        );
        println!(
            "  Citation:      {:.2} -> {:.2} (delta = {:+.2})",
            baseline_c,
            rerank_c,
            rerank_c - baseline_c
        );
    }

    let worst = worst_records(&records, WORST_N);
    if !worst.is_empty() {
        println!("\n--- Lowest-Scoring Queries (candidates for failure case analysis) ---");
        for record in worst {
            let mode = if record.use_reranker { "rerank" } else { "baseline" };
            let tags = record
                .failure_tags
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(|t| t.join(", "))
                .unwrap_or_else(|| "none".to_string());
            println!(
                "  {} ({}): G={} C={} | {}",
                record.query_id,
                mode,
                record.groundedness_score.unwrap_or(0),
                record.citation_score.unwrap_or(0),
                tags
            );
            let query_head: String = record.query.chars().take(80).collect();
            println!("    Query: {}...", query_head);
        }
    }
    println!("{}", "=".repeat(70));
}

fn fmt_opt(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "-".to_string())
}

/// Formatted table for the enriched summary (all five metrics).
pub fn print_enriched_summary(summary: &EnrichedSummary) {
    println!("\n{}", "=".repeat(80));
    println!("EVALUATION SUMMARY (4 metrics)");
    println!("{}", "=".repeat(80));

    for mode_label in ["rerank", "baseline"] {
        let Some(mode) = summary.modes.get(mode_label) else {
            continue;
        };

        println!("\n{} (n={}):", mode_label.to_uppercase(), mode.n);
        println!(
            "{:<12} {:>3} {:>7} {:>8} {:>8} {:>10} {:>8}",
            "Category", "n", "Ground", "Citation", "Complete", "Ret.Recall", "Ctx.Util"
        );
        println!("{:-<65}", "");

        for (category, stats) in &mode.by_category {
            println!(
                "{:<12} {:>3} {:>7} {:>8} {:>8} {:>10} {:>8}",
                category,
                stats.n,
                fmt_opt(stats.avg_groundedness),
                fmt_opt(stats.avg_citation),
                fmt_opt(stats.avg_completeness),
                fmt_opt(stats.avg_retrieval_recall),
                fmt_opt(stats.avg_context_utilization)
            );
        }

        println!("{:-<65}", "");
        let overall = &mode.overall;
        println!(
            "{:<12} {:>3} {:>7} {:>8} {:>8} {:>10} {:>8}",
            "OVERALL",
            mode.n,
            fmt_opt(overall.avg_groundedness),
            fmt_opt(overall.avg_citation),
            fmt_opt(overall.avg_completeness),
            fmt_opt(overall.avg_retrieval_recall),
            fmt_opt(overall.avg_context_utilization)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::judge::PARSE_FAILURE_TAG;
    use crate::eval::record::ErrorRecord;

    fn make_record(
        id: &str,
        category: Category,
        use_reranker: bool,
        groundedness: u8,
        citation: u8,
    ) -> EvalRecord {
        EvalRecord {
            timestamp: String::new(),
            query_id: id.to_string(),
            category,
            sub_question: String::new(),
            query: format!("question {}", id),
            expected_sources: Vec::new(),
            notes: String::new(),
            use_reranker,
            model: String::new(),
            prompt_version: String::new(),
            answer: String::new(),
            retrieved_chunks: Vec::new(),
            reranked_chunks: Vec::new(),
            generation_tokens: Default::default(),
            elapsed_seconds: 0.0,
            groundedness_score: Some(groundedness),
            groundedness_rationale: None,
            citation_score: Some(citation),
            citation_rationale: None,
            failure_tags: Some(Vec::new()),
            judge_model: None,
            judge_tokens: None,
            retrieval_recall: None,
            context_utilization: None,
            completeness_score: None,
            completeness_rationale: None,
        }
    }

    #[test]
    fn duplicated_record_leaves_means_unchanged() {
        let record = make_record("D-01", Category::Direct, true, 3, 2);
        let duplicated: Vec<EvalRecord> = std::iter::repeat(record).take(7).collect();
        let refs: Vec<&EvalRecord> = duplicated.iter().collect();

        let (g, c) = quality_means(&refs).unwrap();
        assert_eq!(g, 3.0);
        assert_eq!(c, 2.0);
    }

    #[test]
    fn sentinel_records_are_excluded_from_means_but_counted() {
        let mut records = vec![
            make_record("D-01", Category::Direct, true, 4, 4),
            make_record("D-02", Category::Direct, true, 2, 2),
        ];
        let mut sentinel = make_record("D-03", Category::Direct, true, 0, 0);
        sentinel.failure_tags = Some(vec![PARSE_FAILURE_TAG.to_string()]);
        records.push(sentinel);

        let refs: Vec<&EvalRecord> = records.iter().collect();
        let (g, c) = quality_means(&refs).unwrap();
        assert_eq!(g, 3.0);
        assert_eq!(c, 3.0);

        // The sentinel stays visible in raw totals and the tag histogram.
        let stats = category_stats(&refs);
        assert_eq!(stats.n, 3);
        assert_eq!(stats.avg_groundedness, Some(3.0));
        let tags = failure_tag_histogram(&refs);
        assert_eq!(tags, vec![(PARSE_FAILURE_TAG.to_string(), 1)]);
    }

    #[test]
    fn delta_matches_independent_mean_computation() {
        // 3 reranked and 3 baseline scored records with known scores.
        let records = vec![
            make_record("D-01", Category::Direct, true, 4, 4),
            make_record("D-02", Category::Direct, true, 3, 4),
            make_record("S-01", Category::Synthesis, true, 4, 3),
            make_record("D-01", Category::Direct, false, 3, 3),
            make_record("D-02", Category::Direct, false, 2, 3),
            make_record("S-01", Category::Synthesis, false, 3, 2),
        ];
        let refs: Vec<&EvalRecord> = records.iter().collect();

        let delta = rerank_delta(&refs).unwrap();
        // mean(4,3,4) - mean(3,2,3) = 3.6667 - 2.6667, to 2 decimals.
        assert_eq!(delta.groundedness, 1.0);
        // mean(4,4,3) - mean(3,3,2) = 3.6667 - 2.6667.
        assert_eq!(delta.citation, 1.0);
    }

    #[test]
    fn delta_is_none_without_both_modes() {
        let records = vec![
            make_record("D-01", Category::Direct, true, 4, 4),
            make_record("D-02", Category::Direct, true, 3, 3),
        ];
        let refs: Vec<&EvalRecord> = records.iter().collect();
        assert_eq!(rerank_delta(&refs), None);
    }

    #[test]
    fn histogram_sorts_by_count_descending() {
        let mut records = vec![
            make_record("D-01", Category::Direct, true, 2, 2),
            make_record("D-02", Category::Direct, true, 2, 2),
            make_record("D-03", Category::Direct, true, 3, 3),
        ];
        records[0].failure_tags = Some(vec![
            "MISSING_CITATION".to_string(),
            "HALLUCINATED_CLAIM".to_string(),
        ]);
        records[1].failure_tags = Some(vec!["MISSING_CITATION".to_string()]);
        records[2].failure_tags = Some(vec!["MISSED_EVIDENCE".to_string()]);

        let refs: Vec<&EvalRecord> = records.iter().collect();
        let tags = failure_tag_histogram(&refs);
        assert_eq!(tags[0], ("MISSING_CITATION".to_string(), 2));
        // Ties break alphabetically for stable output.
        assert_eq!(tags[1].1, 1);
        assert_eq!(tags[1].0, "HALLUCINATED_CLAIM");
        assert_eq!(tags[2].0, "MISSED_EVIDENCE");
    }

    #[test]
    fn worst_records_picks_lowest_score_sums() {
        let records = vec![
            make_record("D-01", Category::Direct, true, 4, 4),
            make_record("D-02", Category::Direct, false, 1, 2),
            make_record("D-03", Category::Direct, true, 2, 2),
            make_record("D-04", Category::Direct, false, 0, 0),
        ];
        let refs: Vec<&EvalRecord> = records.iter().collect();

        let worst = worst_records(&refs, 2);
        assert_eq!(worst.len(), 2);
        assert_eq!(worst[0].query_id, "D-02");
        assert_eq!(worst[1].query_id, "D-03");
        // The unscored sentinel never makes the shortlist.
        assert!(worst.iter().all(|r| r.query_id != "D-04"));
    }

    #[test]
    fn run_summary_counts_errors_and_modes() {
        let lines = vec![
            LogLine::Record(Box::new(make_record("D-01", Category::Direct, true, 4, 3))),
            LogLine::Error(ErrorRecord {
                timestamp: String::new(),
                query_id: "D-02".to_string(),
                query: String::new(),
                use_reranker: true,
                error: "search error".to_string(),
                category: Category::Direct,
            }),
            LogLine::Record(Box::new(make_record("D-01", Category::Direct, false, 2, 2))),
        ];

        let summary = run_summary(&lines, 2, &["rerank", "baseline"]);
        assert_eq!(summary.total_runs, 3);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.modes, vec!["rerank", "baseline"]);
        let rerank = summary.rerank.unwrap();
        assert_eq!(rerank.n, 1);
        assert_eq!(rerank.avg_groundedness, 4.0);
        assert_eq!(summary.baseline.unwrap().avg_citation, 2.0);
    }

    #[test]
    fn enriched_summary_partitions_by_mode_and_category() {
        let mut records = vec![
            make_record("D-01", Category::Direct, true, 4, 4),
            make_record("S-01", Category::Synthesis, true, 3, 3),
            make_record("D-01", Category::Direct, false, 2, 3),
        ];
        records[0].retrieval_recall = Some(1.0);
        records[0].context_utilization = Some(0.5);
        records[0].completeness_score = Some(4);
        // Edge case with no ground truth: null recall must not drag the mean.
        records[1].retrieval_recall = None;
        records[1].context_utilization = Some(0.3);
        records[1].completeness_score = Some(2);

        let refs: Vec<&EvalRecord> = records.iter().collect();
        let summary = enriched_summary(&refs);

        assert_eq!(summary.total_runs, 3);
        let rerank = &summary.modes["rerank"];
        assert_eq!(rerank.n, 2);
        assert_eq!(rerank.by_category.len(), 2);
        assert_eq!(rerank.by_category["direct"].n, 1);
        assert_eq!(rerank.overall.avg_groundedness, Some(3.5));
        // Recall mean over the single non-null value only.
        assert_eq!(rerank.overall.avg_retrieval_recall, Some(1.0));
        assert_eq!(rerank.overall.n_retrieval_recall, Some(1));
        assert_eq!(rerank.overall.avg_context_utilization, Some(0.4));
        assert_eq!(rerank.overall.avg_completeness, Some(3.0));

        let baseline = &summary.modes["baseline"];
        assert_eq!(baseline.n, 1);
        assert_eq!(baseline.overall.avg_retrieval_recall, None);
        assert_eq!(baseline.overall.avg_completeness, None);
    }

    #[test]
    fn summary_json_round_trips_to_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("eval_results.summary.json");

        let lines = vec![LogLine::Record(Box::new(make_record(
            "D-01",
            Category::Direct,
            true,
            4,
            3,
        )))];
        let summary = run_summary(&lines, 1, &["rerank"]);
        write_summary(&path, &summary).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["total_runs"], 1);
        assert_eq!(parsed["rerank"]["avg_groundedness"], 4.0);
        // Baseline never ran, so the key is absent rather than null.
        assert!(parsed.get("baseline").is_none());
    }
}
