use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub search: SearchConfig,
    pub reranker: RerankerConfig,
    pub generation: GenerationConfig,
    pub judge: JudgeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Similarity search service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Base URL of the similarity search service.
    pub url: String,
    /// Collection to query within the service.
    pub collection: String,
}

/// Cross-encoder reranker service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RerankerConfig {
    /// Base URL of the reranker service.
    pub url: String,
    #[serde(default = "default_reranker_model")]
    pub model: String,
}

/// Answer generation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// LLM-as-judge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Pause between judge calls in the enrichment pass (rate limiting).
    #[serde(default = "default_judge_delay_ms")]
    pub delay_ms: u64,
}

/// Pipeline tuning configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Chunks to retrieve (over-retrieve so the reranker has a real pool).
    #[serde(default = "default_n_retrieve")]
    pub n_retrieve: usize,
    /// Chunks kept after reranking and sent to the generator.
    #[serde(default = "default_n_rerank")]
    pub n_rerank: usize,
    /// JSONL log for single-query pipeline runs.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            n_retrieve: default_n_retrieve(),
            n_rerank: default_n_rerank(),
            log_path: default_log_path(),
        }
    }
}

fn default_reranker_model() -> String {
    "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string()
}

fn default_generation_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_judge_model() -> String {
    "claude-opus-4-1".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_judge_delay_ms() -> u64 {
    500
}

fn default_n_retrieve() -> usize {
    20
}

fn default_n_rerank() -> usize {
    10
}

fn default_log_path() -> PathBuf {
    PathBuf::from("logs/rag_queries.jsonl")
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RAGEVAL_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RAGEVAL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str).context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.search.url.trim().is_empty() {
            anyhow::bail!("search.url must not be empty");
        }

        if self.search.collection.trim().is_empty() {
            anyhow::bail!("search.collection must not be empty");
        }

        if self.reranker.url.trim().is_empty() {
            anyhow::bail!("reranker.url must not be empty");
        }

        if self.pipeline.n_rerank == 0 {
            anyhow::bail!("pipeline.n_rerank must be greater than 0");
        }

        if self.pipeline.n_retrieve < self.pipeline.n_rerank {
            anyhow::bail!(
                "pipeline.n_retrieve must be at least pipeline.n_rerank ({} < {})",
                self.pipeline.n_retrieve,
                self.pipeline.n_rerank
            );
        }

        if self.generation.max_tokens == 0 {
            anyhow::bail!("generation.max_tokens must be greater than 0");
        }

        // Credentials must exist before any record is written.
        // Check both environment variable and .env file (dotenv already loaded in Config::load)
        for env_name in [&self.generation.api_key_env, &self.judge.api_key_env] {
            std::env::var(env_name).with_context(|| {
                format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable with your Anthropic API key.",
                    env_name
                )
            })?;
        }

        Ok(())
    }
}
