//! LLM-as-judge scoring protocol.
//!
//! Two independent judgments: a quality verdict (groundedness + citation
//! correctness, each 1-4) and a completeness verdict (1-4). The oracle
//! returns free text; parsing is tolerant of markdown fences, and a reply
//! that does not match the schema yields a sentinel verdict (score 0,
//! diagnostic rationale, reserved tag) instead of an error, so judge
//! flakiness never aborts a batch. Every judgment is stamped with the judge
//! model and reported token counts.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::anthropic::{AnthropicClient, CompletionRequest, TokenUsage};
use crate::chunk::{truncate_preview, Chunk, ChunkPreview, JUDGE_PREVIEW_CAP};
use crate::error::{RagEvalError, Result};
use crate::eval::record::EvalRecord;

/// Allowed failure tags the quality judge may assign.
pub const FAILURE_TAGS: [&str; 8] = [
    "HALLUCINATED_CLAIM",
    "FABRICATED_CITATION",
    "MISSING_CITATION",
    "WRONG_FORMAT",
    "MISSED_EVIDENCE",
    "FALSE_REFUSAL",
    "OVER_EXTRAPOLATION",
    "CONTRADICTS_SOURCE",
];

/// Reserved tag marking a judge reply that did not parse.
pub const PARSE_FAILURE_TAG: &str = "JUDGE_PARSE_ERROR";

const QUALITY_MAX_TOKENS: u32 = 500;
const COMPLETENESS_MAX_TOKENS: u32 = 300;
/// How much of an unparseable reply is kept in the diagnostic rationale.
const PARSE_ERROR_PREFIX_CHARS: usize = 200;

/// Raw oracle reply plus reported usage.
#[derive(Debug, Clone)]
pub struct JudgeResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// Judge seam: prompt in, raw text out.
#[async_trait]
pub trait JudgeOracle: Send + Sync {
    async fn judge(&self, prompt: &str, max_tokens: u32) -> Result<JudgeResponse>;

    /// Model identifier stamped on every verdict.
    fn model(&self) -> &str;
}

/// Anthropic-backed judge oracle. Runs at temperature 0.
pub struct AnthropicJudge {
    client: AnthropicClient,
    model: String,
}

impl AnthropicJudge {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: AnthropicClient::new(api_key),
            model,
        }
    }
}

#[async_trait]
impl JudgeOracle for AnthropicJudge {
    async fn judge(&self, prompt: &str, max_tokens: u32) -> Result<JudgeResponse> {
        let completion = self
            .client
            .complete(&CompletionRequest {
                model: &self.model,
                system: None,
                prompt,
                max_tokens,
                temperature: Some(0.0),
            })
            .await
            .map_err(RagEvalError::Judge)?;

        Ok(JudgeResponse {
            text: completion.text,
            usage: completion.usage,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Judge token counts as persisted in records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeTokens {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
}

impl From<TokenUsage> for JudgeTokens {
    fn from(usage: TokenUsage) -> Self {
        Self {
            input: usage.input_tokens,
            output: usage.output_tokens,
        }
    }
}

/// Structured output of one quality judgment.
///
/// Scores are 1-4, or 0 when the reply could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub groundedness_score: u8,
    pub groundedness_rationale: String,
    pub citation_score: u8,
    pub citation_rationale: String,
    #[serde(default)]
    pub failure_tags: Vec<String>,
}

/// Structured output of one completeness judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessVerdict {
    pub completeness_score: u8,
    pub completeness_rationale: String,
}

/// Quality verdict plus cost-accounting stamps.
#[derive(Debug, Clone)]
pub struct QualityAssessment {
    pub verdict: QualityVerdict,
    pub judge_model: String,
    pub judge_tokens: JudgeTokens,
}

/// Completeness verdict plus cost-accounting stamps.
#[derive(Debug, Clone)]
pub struct CompletenessAssessment {
    pub verdict: CompletenessVerdict,
    pub judge_tokens: JudgeTokens,
}

/// Format full-text chunks for the quality judge, identity headers first so
/// citation format can be validated against what the generator saw.
fn format_chunks_for_scoring(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut header = format!(
                "[Chunk {}] ({}, {})",
                i + 1,
                chunk.source_id,
                chunk.chunk_id
            );
            if !chunk.section_title.is_empty() {
                header.push_str(&format!(" | Section: {}", chunk.section_title));
            }
            format!(
                "{}\n{}",
                header,
                truncate_preview(&chunk.text, JUDGE_PREVIEW_CAP)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format logged chunk previews for the completeness judge.
fn format_previews_for_judge(chunks: &[ChunkPreview]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[{}] ({}, {}) | Section: {}\n{}",
                i + 1,
                chunk.source_id,
                chunk.chunk_id,
                chunk.section_title,
                truncate_preview(&chunk.text_preview, JUDGE_PREVIEW_CAP)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the quality-judgment prompt: rubric, allowed tags, evidence, answer.
pub fn build_quality_prompt(query: &str, chunks: &[Chunk], answer: &str) -> String {
    format!(
        r#"You are an expert evaluator for a Retrieval-Augmented Generation (RAG) system
focused on ML failure modes in space debris tracking and collision avoidance.

You will be given:
1. A user QUERY
2. The RETRIEVED CHUNKS that were provided as context to the RAG system
3. The RAG system's ANSWER (which should cite chunks using (source_id, chunk_id) format)

Score the answer on two dimensions using the rubric below.

## Groundedness (1-4)
How well is the answer supported by the retrieved chunks?
- 4: Every claim is directly supported by retrieved chunk content. Uncertainty is stated when evidence is weak or absent.
- 3: Most claims are supported. Minor unsupported nuance or slight extrapolation beyond chunk content.
- 2: Some claims are supported, but key claims lack grounding or are extrapolated significantly.
- 1: Major claims are hallucinated or contradicted by the retrieved chunks.

## Citation Correctness (1-4)
Do the citations accurately point to chunks that support the associated claims?
- 4: All citations use correct (source_id, chunk_id) format AND each cited chunk actually supports the claim it's attached to.
- 3: Most citations are correct. Minor issues: a citation is slightly off-target, or one claim is missing a citation.
- 2: Multiple citation errors: wrong chunk_ids, citations that don't support their claims, or many uncited claims.
- 1: Citations are fabricated, use wrong format, or systematically fail to match claim content.

## Special cases
- If the answer correctly states that evidence is insufficient or not found in the corpus, and the retrieved chunks genuinely lack relevant content, score Groundedness as 4 (this is correct trust behavior).
- If the answer refuses to answer when evidence IS present in the chunks, score Groundedness as 1.

Respond with ONLY a JSON object in this exact format (no markdown, no backticks):
{{
  "groundedness_score": <1-4>,
  "groundedness_rationale": "<1-2 sentence explanation>",
  "citation_score": <1-4>,
  "citation_rationale": "<1-2 sentence explanation>",
  "failure_tags": ["<tag1>", "<tag2>"]
}}

Valid failure tags (use any that apply, or empty list if none):
- HALLUCINATED_CLAIM: answer contains claims not in the retrieved chunks
- FABRICATED_CITATION: citation points to a chunk that doesn't exist or doesn't support the claim
- MISSING_CITATION: a significant claim lacks any citation
- WRONG_FORMAT: citations don't use (source_id, chunk_id) format
- MISSED_EVIDENCE: retrieved chunks contain relevant info the answer ignores
- FALSE_REFUSAL: answer says evidence is missing when it's present in chunks
- OVER_EXTRAPOLATION: answer goes significantly beyond what chunks support
- CONTRADICTS_SOURCE: answer contradicts information in the retrieved chunks

---

QUERY:
{query}

RETRIEVED CHUNKS:
{chunks}

ANSWER:
{answer}
"#,
        query = query,
        chunks = format_chunks_for_scoring(chunks),
        answer = answer,
    )
}

/// Build the completeness-judgment prompt over the chunks the generator saw.
pub fn build_completeness_prompt(query: &str, chunks: &[ChunkPreview], answer: &str) -> String {
    format!(
        r#"You are evaluating the COMPLETENESS of a RAG system's answer.

QUERY: {query}

RETRIEVED CHUNKS SENT TO GENERATOR (top {n_chunks}):
{chunks_text}

SYSTEM'S ANSWER:
{answer}

COMPLETENESS RUBRIC (1-4):
- 4: Covers all aspects of the question using the full range of relevant retrieved evidence
- 3: Mostly complete; minor gaps in coverage or over-reliance on a single source when multiple relevant sources were available
- 2: Partial; misses a major aspect of the question or ignores clearly relevant retrieved chunks
- 1: Superficial or off-target despite relevant evidence being available

IMPORTANT SCORING RULES:
- Score based on what the RETRIEVED CHUNKS could support, not what the full corpus might contain.
- If the answer explicitly says "I cannot answer this" or "evidence is missing", check whether the retrieved chunks actually support a better answer. If they do, penalize. If they genuinely don't contain relevant info, a well-structured acknowledgment of limitations can still score 3-4.
- If the query asks about multiple aspects/sources and the answer only addresses some using a subset of relevant retrieved chunks, score 2-3.
- For out-of-scope queries where retrieved chunks are genuinely irrelevant, score based on how well the answer characterizes what the corpus does contain.

Respond with ONLY a JSON object (no markdown, no backticks):
{{"completeness_score": <1-4>, "completeness_rationale": "<2-3 sentences>"}}"#,
        query = query,
        n_chunks = chunks.len(),
        chunks_text = format_previews_for_judge(chunks),
        answer = answer,
    )
}

/// Strip an optional markdown code fence around the reply.
fn strip_fences(raw: &str) -> String {
    let open = Regex::new(r"^```(?:json)?\s*").expect("Invalid fence pattern");
    let close = Regex::new(r"\s*```$").expect("Invalid fence pattern");
    let cleaned = open.replace(raw.trim(), "");
    close.replace(&cleaned, "").into_owned()
}

fn char_prefix(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

/// Parse a quality reply, synthesizing the sentinel verdict on any failure.
///
/// A reply that parses but carries a score outside 1-4 counts as a failure,
/// so stored scores are always 0 or 1-4.
pub fn parse_quality_verdict(raw: &str) -> QualityVerdict {
    let cleaned = strip_fences(raw);
    match serde_json::from_str::<QualityVerdict>(&cleaned) {
        Ok(verdict)
            if (1..=4).contains(&verdict.groundedness_score)
                && (1..=4).contains(&verdict.citation_score) =>
        {
            verdict
        }
        _ => QualityVerdict {
            groundedness_score: 0,
            groundedness_rationale: format!(
                "PARSE_ERROR: {}",
                char_prefix(raw.trim(), PARSE_ERROR_PREFIX_CHARS)
            ),
            citation_score: 0,
            citation_rationale: "PARSE_ERROR".to_string(),
            failure_tags: vec![PARSE_FAILURE_TAG.to_string()],
        },
    }
}

/// Parse a completeness reply, synthesizing the sentinel verdict on failure.
pub fn parse_completeness_verdict(raw: &str) -> CompletenessVerdict {
    let cleaned = strip_fences(raw);
    match serde_json::from_str::<CompletenessVerdict>(&cleaned) {
        Ok(verdict) if (1..=4).contains(&verdict.completeness_score) => verdict,
        _ => CompletenessVerdict {
            completeness_score: 0,
            completeness_rationale: format!(
                "PARSE_ERROR: {}",
                char_prefix(raw.trim(), PARSE_ERROR_PREFIX_CHARS)
            ),
        },
    }
}

/// Run the quality judgment for one answer over the chunks the generator saw.
pub async fn score_quality(
    oracle: &dyn JudgeOracle,
    query: &str,
    answer: &str,
    chunks: &[Chunk],
) -> Result<QualityAssessment> {
    let prompt = build_quality_prompt(query, chunks, answer);
    let response = oracle.judge(&prompt, QUALITY_MAX_TOKENS).await?;
    let verdict = parse_quality_verdict(&response.text);

    if verdict.groundedness_score == 0 {
        log::warn!("Judge reply did not parse; recorded sentinel verdict");
    }

    Ok(QualityAssessment {
        verdict,
        judge_model: oracle.model().to_string(),
        judge_tokens: response.usage.into(),
    })
}

/// Run the completeness judgment for one logged record.
pub async fn score_completeness(
    oracle: &dyn JudgeOracle,
    record: &EvalRecord,
) -> Result<CompletenessAssessment> {
    let sent = record.sent_chunks();
    let prompt = build_completeness_prompt(&record.query, sent, &record.answer);
    let response = oracle.judge(&prompt, COMPLETENESS_MAX_TOKENS).await?;
    let verdict = parse_completeness_verdict(&response.text);

    Ok(CompletenessAssessment {
        verdict,
        judge_tokens: response.usage.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_QUALITY: &str = r#"{
        "groundedness_score": 3,
        "groundedness_rationale": "Most claims supported.",
        "citation_score": 2,
        "citation_rationale": "Two uncited claims.",
        "failure_tags": ["MISSING_CITATION"]
    }"#;

    #[test]
    fn parses_bare_json_reply() {
        let verdict = parse_quality_verdict(VALID_QUALITY);
        assert_eq!(verdict.groundedness_score, 3);
        assert_eq!(verdict.citation_score, 2);
        assert_eq!(verdict.failure_tags, vec!["MISSING_CITATION"]);
    }

    #[test]
    fn parses_reply_wrapped_in_json_fence() {
        let fenced = format!("```json\n{}\n```", VALID_QUALITY);
        let verdict = parse_quality_verdict(&fenced);
        assert_eq!(verdict.groundedness_score, 3);
        assert!(verdict
            .failure_tags
            .iter()
            .all(|t| t != PARSE_FAILURE_TAG));
    }

    #[test]
    fn parses_reply_wrapped_in_anonymous_fence() {
        let fenced = format!("```\n{}\n```", VALID_QUALITY);
        let verdict = parse_quality_verdict(&fenced);
        assert_eq!(verdict.citation_score, 2);
    }

    #[test]
    fn unparseable_reply_yields_sentinel_with_diagnostic() {
        let raw = "I think the answer deserves a 3 because it is mostly grounded.";
        let verdict = parse_quality_verdict(raw);
        assert_eq!(verdict.groundedness_score, 0);
        assert_eq!(verdict.citation_score, 0);
        assert!(verdict.groundedness_rationale.starts_with("PARSE_ERROR: I think"));
        assert_eq!(verdict.failure_tags, vec![PARSE_FAILURE_TAG]);
    }

    #[test]
    fn sentinel_rationale_is_capped() {
        let raw = "x".repeat(5000);
        let verdict = parse_quality_verdict(&raw);
        // "PARSE_ERROR: " prefix plus at most 200 chars of the reply.
        assert!(verdict.groundedness_rationale.chars().count() <= 213);
    }

    #[test]
    fn out_of_range_score_counts_as_parse_failure() {
        let raw = r#"{
            "groundedness_score": 7,
            "groundedness_rationale": "off the scale",
            "citation_score": 4,
            "citation_rationale": "fine",
            "failure_tags": []
        }"#;
        let verdict = parse_quality_verdict(raw);
        assert_eq!(verdict.groundedness_score, 0);
        assert_eq!(verdict.failure_tags, vec![PARSE_FAILURE_TAG]);
    }

    #[test]
    fn completeness_parses_and_falls_back() {
        let ok = parse_completeness_verdict(
            r#"{"completeness_score": 4, "completeness_rationale": "Covers all aspects."}"#,
        );
        assert_eq!(ok.completeness_score, 4);

        let bad = parse_completeness_verdict("no json here");
        assert_eq!(bad.completeness_score, 0);
        assert!(bad.completeness_rationale.starts_with("PARSE_ERROR:"));
    }

    #[test]
    fn quality_prompt_embeds_rubric_evidence_and_answer() {
        let chunk = Chunk {
            source_id: "acciarini2021".to_string(),
            chunk_id: "sec2.1_p3".to_string(),
            section_title: "Methods".to_string(),
            text: "t".repeat(600),
            distance: None,
            rerank_score: Some(3.2),
            year: Some(2021),
            authors: String::new(),
        };
        let prompt = build_quality_prompt("What failed?", &[chunk], "Nothing failed.");
        assert!(prompt.contains("[Chunk 1] (acciarini2021, sec2.1_p3) | Section: Methods"));
        assert!(prompt.contains("## Groundedness (1-4)"));
        assert!(prompt.contains("FALSE_REFUSAL"));
        assert!(prompt.contains("ANSWER:\nNothing failed."));
        // Judge-facing chunk text is capped at 500 chars.
        assert!(!prompt.contains(&"t".repeat(501)));
        assert!(prompt.contains(&"t".repeat(500)));
    }

    #[test]
    fn completeness_prompt_counts_sent_chunks() {
        let previews = vec![
            ChunkPreview {
                source_id: "uriot2021".to_string(),
                chunk_id: "sec3_p1".to_string(),
                section_title: "Dataset".to_string(),
                text_preview: "Kelvins challenge data.".to_string(),
                distance: Some(0.2),
                rerank_score: None,
            };
            3
        ];
        let prompt = build_completeness_prompt("How big is the dataset?", &previews, "Big.");
        assert!(prompt.contains("(top 3):"));
        assert!(prompt.contains("[1] (uriot2021, sec3_p1) | Section: Dataset"));
    }

    #[test]
    fn judge_tokens_from_api_usage() {
        let tokens: JudgeTokens = TokenUsage {
            input_tokens: 1500,
            output_tokens: 90,
        }
        .into();
        assert_eq!(tokens.input, 1500);
        assert_eq!(tokens.output, 90);
    }
}
