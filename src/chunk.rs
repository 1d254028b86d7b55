//! Evidence chunk types and preview normalization for logging and judging.

use serde::{Deserialize, Serialize};

/// Preview cap for chunks written to evaluation records.
pub const RECORD_PREVIEW_CAP: usize = 200;
/// Preview cap for chunk text rendered into judge prompts.
pub const JUDGE_PREVIEW_CAP: usize = 500;

const ELLIPSIS: &str = "...";

/// A retrieved or reranked unit of evidence.
///
/// Identity is `(source_id, chunk_id)` and never changes across pipeline
/// stages; only the scores and ordering do. `distance` comes from the
/// similarity search (lower = more similar); `rerank_score` is present only
/// after cross-encoder reranking (higher = more relevant) and is `None` when
/// reranking was skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub source_id: String,
    pub chunk_id: String,
    #[serde(default)]
    pub section_title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub rerank_score: Option<f64>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub authors: String,
}

impl Chunk {
    /// Citation identity pair for this chunk.
    pub fn identity(&self) -> (&str, &str) {
        (&self.source_id, &self.chunk_id)
    }

    /// Reduce to the minimal serializable form kept in evaluation records.
    pub fn preview(&self) -> ChunkPreview {
        ChunkPreview {
            source_id: self.source_id.clone(),
            chunk_id: self.chunk_id.clone(),
            section_title: self.section_title.clone(),
            text_preview: truncate_preview(&self.text, RECORD_PREVIEW_CAP),
            distance: self.distance,
            rerank_score: self.rerank_score,
        }
    }
}

/// Minimal chunk form persisted in evaluation records.
///
/// Keeps identity, section, scores, and a capped text preview so log files
/// stay small while remaining verifiable by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPreview {
    pub source_id: String,
    pub chunk_id: String,
    #[serde(default)]
    pub section_title: String,
    #[serde(default)]
    pub text_preview: String,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub rerank_score: Option<f64>,
}

/// Truncate `text` to `cap` characters, appending an ellipsis marker.
///
/// Pure and idempotent: text at or under the cap passes through unchanged
/// (no ellipsis), and re-truncating an already-truncated preview is a no-op.
/// Operates on char boundaries, never byte offsets.
pub fn truncate_preview(text: &str, cap: usize) -> String {
    let len = text.chars().count();
    if len <= cap {
        return text.to_string();
    }
    // Already-normalized input: cap chars plus the marker we appended.
    if text.ends_with(ELLIPSIS) && len <= cap + ELLIPSIS.len() {
        return text.to_string();
    }
    let truncated: String = text.chars().take(cap).collect();
    format!("{}{}", truncated, ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(text: &str) -> Chunk {
        Chunk {
            source_id: "acciarini2021".to_string(),
            chunk_id: "sec2.1_p3".to_string(),
            section_title: "Methods".to_string(),
            text: text.to_string(),
            distance: Some(0.42),
            rerank_score: None,
            year: Some(2021),
            authors: "Acciarini et al.".to_string(),
        }
    }

    #[test]
    fn short_text_passes_through_without_ellipsis() {
        let preview = truncate_preview("short text", RECORD_PREVIEW_CAP);
        assert_eq!(preview, "short text");
    }

    #[test]
    fn long_text_is_capped_with_ellipsis() {
        let text = "x".repeat(300);
        let preview = truncate_preview(&text, RECORD_PREVIEW_CAP);
        assert_eq!(preview.chars().count(), RECORD_PREVIEW_CAP + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn truncation_is_idempotent() {
        let text = "y".repeat(500);
        let once = truncate_preview(&text, RECORD_PREVIEW_CAP);
        let twice = truncate_preview(&once, RECORD_PREVIEW_CAP);
        assert_eq!(once, twice);
    }

    #[test]
    fn exact_cap_length_is_unchanged() {
        let text = "z".repeat(RECORD_PREVIEW_CAP);
        assert_eq!(truncate_preview(&text, RECORD_PREVIEW_CAP), text);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // Multibyte chars must not be split mid-scalar.
        let text = "é".repeat(250);
        let preview = truncate_preview(&text, RECORD_PREVIEW_CAP);
        assert_eq!(preview.chars().count(), RECORD_PREVIEW_CAP + 3);
        assert!(preview.starts_with('é'));
    }

    #[test]
    fn preview_keeps_identity_and_scores() {
        let chunk = make_chunk(&"a".repeat(250));
        let preview = chunk.preview();
        assert_eq!(preview.source_id, "acciarini2021");
        assert_eq!(preview.chunk_id, "sec2.1_p3");
        assert_eq!(preview.distance, Some(0.42));
        assert_eq!(preview.rerank_score, None);
        assert_eq!(preview.text_preview.chars().count(), RECORD_PREVIEW_CAP + 3);
    }

    #[test]
    fn preview_of_normalized_text_is_unchanged() {
        let chunk = make_chunk(&"a".repeat(250));
        let first = chunk.preview();
        let renormalized = Chunk {
            text: first.text_preview.clone(),
            ..make_chunk("")
        };
        assert_eq!(renormalized.preview().text_preview, first.text_preview);
    }
}
