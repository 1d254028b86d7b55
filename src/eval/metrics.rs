//! Mechanical (non-LLM) metrics computed from completed evaluation records.
//!
//! Both metrics distinguish "no signal" (`None`) from "signal present and
//! bad" (`0.0`): a query with no expected sources has no recall to measure,
//! and a run that sent nothing to the generator has no utilization.

use regex::Regex;
use std::collections::HashSet;

use crate::eval::record::EvalRecord;

/// Inline citation grammar: a word token ending in a four-digit year (the
/// author-year source id), a comma, optional whitespace, and a `sec`-prefixed
/// section-chunk token. Example: `(acciarini2021, sec2.1_p3)`.
///
/// This is the one wire-level text format the mechanical metrics depend on;
/// a generator emitting differently-punctuated citations will undercount
/// context utilization.
pub const CITATION_PATTERN: &str = r"\((\w+\d{4}),\s*(sec[\w.]+)\)";

/// Retrieved pool considered for recall.
pub const RECALL_POOL: usize = 20;

/// Extract every cited `(source_id, chunk_id)` pair from an answer.
pub fn extract_citations(answer: &str) -> HashSet<(String, String)> {
    let citation = Regex::new(CITATION_PATTERN).expect("Invalid citation pattern");
    citation
        .captures_iter(answer)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect()
}

/// Fraction of expected sources present among the top-20 retrieved chunks.
///
/// Duplicate chunks of one source collapse into a set. Returns `None` when
/// no expected sources are defined: absence of ground truth is distinct from
/// a total miss.
pub fn retrieval_recall(record: &EvalRecord) -> Option<f64> {
    if record.expected_sources.is_empty() {
        return None;
    }

    let retrieved: HashSet<&str> = record
        .retrieved_chunks
        .iter()
        .take(RECALL_POOL)
        .map(|c| c.source_id.as_str())
        .collect();

    let hits = record
        .expected_sources
        .iter()
        .filter(|s| retrieved.contains(s.as_str()))
        .count();

    Some(round4(hits as f64 / record.expected_sources.len() as f64))
}

/// Fraction of the chunks sent to the generator that the answer actually
/// cites, by exact `(source_id, chunk_id)` match.
///
/// Measures precision of use, not recall of citation: only sent chunks enter
/// the denominator. Returns `None` when nothing was sent.
pub fn context_utilization(record: &EvalRecord) -> Option<f64> {
    let sent = record.sent_chunks();
    if sent.is_empty() {
        return None;
    }

    let cited = extract_citations(&record.answer);
    let n_exact = sent
        .iter()
        .filter(|c| cited.contains(&(c.source_id.clone(), c.chunk_id.clone())))
        .count();

    Some(round4(n_exact as f64 / sent.len() as f64))
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
