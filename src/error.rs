use thiserror::Error;

/// Main error type for rageval
#[derive(Error, Debug)]
pub enum RagEvalError {
    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Similarity search service errors
    #[error("Search error: {0}")]
    Search(String),

    /// Reranker service errors
    #[error("Rerank error: {0}")]
    Rerank(String),

    /// Answer generation API errors
    #[error("Generation error: {0}")]
    Generation(String),

    /// Judge API errors
    #[error("Judge error: {0}")]
    Judge(String),

    /// Parse errors (records, query files, collaborator payloads)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using RagEvalError
pub type Result<T> = std::result::Result<T, RagEvalError>;
