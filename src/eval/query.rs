//! Evaluation query set: fixed test cases with known-relevant sources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{RagEvalError, Result};

/// Query category for per-category reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Answerable from a single source.
    Direct,
    /// Requires combining evidence across sources.
    Synthesis,
    /// Out-of-corpus or trick questions probing refusal behavior.
    EdgeCase,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Direct => "direct",
            Category::Synthesis => "synthesis",
            Category::EdgeCase => "edge_case",
        };
        write!(f, "{}", label)
    }
}

/// Single evaluation query, stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalQuery {
    /// Unique ID, stable across runs (used for filtering and resume).
    pub id: String,
    pub category: Category,
    /// Which aspect of the research question this case probes.
    #[serde(default)]
    pub sub_question: String,
    /// The literal question text sent to the pipeline.
    pub query: String,
    /// Sources known a priori to be relevant; may be empty for edge cases.
    #[serde(default)]
    pub expected_sources: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

/// The queries file is either a bare array or an object wrapping the array
/// under "queries" (with a sibling metadata object we ignore).
#[derive(Deserialize)]
#[serde(untagged)]
enum QueryFile {
    Wrapped { queries: Vec<EvalQuery> },
    Bare(Vec<EvalQuery>),
}

/// Load evaluation queries from a JSON file.
pub fn load_queries(path: &Path) -> Result<Vec<EvalQuery>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        RagEvalError::Config(format!(
            "Failed to read queries file {}: {}",
            path.display(),
            e
        ))
    })?;

    let parsed: QueryFile = serde_json::from_str(&raw)
        .map_err(|e| RagEvalError::Parse(format!("Invalid queries JSON: {}", e)))?;

    let queries = match parsed {
        QueryFile::Wrapped { queries } => queries,
        QueryFile::Bare(queries) => queries,
    };

    log::info!("Loaded {} evaluation queries from {}", queries.len(), path.display());
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BARE: &str = r#"[
        {
            "id": "D-01",
            "category": "direct",
            "sub_question": "failure modes",
            "query": "What are the main failure modes?",
            "expected_sources": ["acciarini2021"],
            "notes": ""
        }
    ]"#;

    const WRAPPED: &str = r#"{
        "metadata": {"version": 2, "author": "eval"},
        "queries": [
            {"id": "S-01", "category": "synthesis", "query": "Compare approaches."},
            {"id": "E-01", "category": "edge_case", "query": "Who won the 2030 world cup?"}
        ]
    }"#;

    fn write_queries(content: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queries.json");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_bare_array() {
        let (_dir, path) = write_queries(BARE);
        let queries = load_queries(&path).unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].id, "D-01");
        assert_eq!(queries[0].category, Category::Direct);
        assert_eq!(queries[0].expected_sources, vec!["acciarini2021"]);
    }

    #[test]
    fn loads_wrapped_object_ignoring_metadata() {
        let (_dir, path) = write_queries(WRAPPED);
        let queries = load_queries(&path).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].category, Category::Synthesis);
        assert_eq!(queries[1].category, Category::EdgeCase);
        // Optional fields default to empty.
        assert!(queries[1].expected_sources.is_empty());
        assert!(queries[1].sub_question.is_empty());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_queries(Path::new("does/not/exist.json")).unwrap_err();
        assert!(matches!(err, RagEvalError::Config(_)));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let (_dir, path) = write_queries("{not json");
        let err = load_queries(&path).unwrap_err();
        assert!(matches!(err, RagEvalError::Parse(_)));
    }

    #[test]
    fn category_display_matches_wire_format() {
        assert_eq!(Category::Direct.to_string(), "direct");
        assert_eq!(Category::EdgeCase.to_string(), "edge_case");
        let json = serde_json::to_string(&Category::EdgeCase).unwrap();
        assert_eq!(json, "\"edge_case\"");
    }
}
