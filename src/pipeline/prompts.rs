//! Citation-enforcing prompt templates for answer generation.
//!
//! The prompts hold the generator to the evidence: every claim cited in
//! `(source_id, chunk_id)` format, no invented citations, explicit statements
//! when evidence is missing or conflicting.

use crate::chunk::Chunk;

/// Version string logged with every generation for prompt drift tracking.
pub const PROMPT_VERSION: &str = "v1.0";

/// System prompt for the answer generator.
pub const SYSTEM_PROMPT: &str = "\
You are a research assistant for a domain expert studying ML failure modes \
in space debris tracking and collision avoidance. Your role is to answer \
questions using ONLY the provided evidence chunks.

RULES:
1. Every factual claim MUST include an inline citation in the format \
(source_id, chunk_id), e.g. (acciarini2021, sec2.1_p3).
2. Only cite chunks that are provided in the EVIDENCE section below. \
Do NOT invent or fabricate citations.
3. If the evidence is insufficient to answer the question, say so explicitly. \
State what information is missing and what sources might help.
4. If evidence from different sources conflicts, note the disagreement and \
cite both sides.
5. Do not speculate beyond what the evidence supports.
6. End your response with a REFERENCES section listing each cited source \
once, formatted as: source_id - Title (Year).";

/// Build the user message: numbered evidence block followed by the question.
pub fn build_user_prompt(query: &str, chunks: &[Chunk]) -> String {
    let evidence_parts: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let section = if chunk.section_title.is_empty() {
                "N/A"
            } else {
                &chunk.section_title
            };
            let year = chunk
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            let authors = if chunk.authors.is_empty() {
                "N/A"
            } else {
                &chunk.authors
            };
            format!(
                "[{}] ({}, {}) | Section: {} | Year: {} | Authors: {}\n{}",
                i + 1,
                chunk.source_id,
                chunk.chunk_id,
                section,
                year,
                authors,
                chunk.text
            )
        })
        .collect();

    format!(
        "EVIDENCE:\n{}\n\nQUESTION:\n{}\n\nAnswer the question using the evidence above. \
Cite every claim using (source_id, chunk_id) format. If the evidence is insufficient, say so.",
        evidence_parts.join("\n\n"),
        query
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk() -> Chunk {
        Chunk {
            source_id: "acciarini2021".to_string(),
            chunk_id: "sec2.1_p3".to_string(),
            section_title: "Uncertainty Quantification".to_string(),
            text: "Conjunction screening relies on covariance propagation.".to_string(),
            distance: Some(0.31),
            rerank_score: None,
            year: Some(2021),
            authors: "Acciarini et al.".to_string(),
        }
    }

    #[test]
    fn user_prompt_contains_citation_headers() {
        let prompt = build_user_prompt("What drives covariance growth?", &[make_chunk()]);
        assert!(prompt.contains("[1] (acciarini2021, sec2.1_p3)"));
        assert!(prompt.contains("Section: Uncertainty Quantification"));
        assert!(prompt.contains("Year: 2021"));
        assert!(prompt.contains("QUESTION:\nWhat drives covariance growth?"));
    }

    #[test]
    fn user_prompt_uses_placeholders_for_missing_metadata() {
        let chunk = Chunk {
            section_title: String::new(),
            year: None,
            authors: String::new(),
            ..make_chunk()
        };
        let prompt = build_user_prompt("q", &[chunk]);
        assert!(prompt.contains("Section: N/A | Year: N/A | Authors: N/A"));
    }

    #[test]
    fn system_prompt_enforces_citation_format() {
        assert!(SYSTEM_PROMPT.contains("(source_id, chunk_id)"));
        assert!(SYSTEM_PROMPT.contains("Do NOT invent or fabricate citations"));
    }
}
