//! Single-query CLI: run one question through retrieve -> rerank -> generate
//! and print the cited answer.

use clap::Parser;
use rageval::pipeline::{self, AnthropicGenerator, HttpReranker, HttpRetriever, Reranker};
use rageval::Config;

/// Answer one research question with inline citations.
#[derive(Parser, Debug)]
#[command(name = "rageval")]
struct Args {
    /// The question to answer.
    query: String,

    /// Skip cross-encoder reranking (similarity order only).
    #[arg(long)]
    no_rerank: bool,

    /// Skip the pipeline query log.
    #[arg(long)]
    no_log: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let retriever = HttpRetriever::new(
        config.search.url.clone(),
        config.search.collection.clone(),
    );
    let reranker = HttpReranker::new(config.reranker.url.clone(), config.reranker.model.clone());

    let api_key = std::env::var(&config.generation.api_key_env)?;
    let generator = AnthropicGenerator::new(
        api_key,
        config.generation.model.clone(),
        config.generation.max_tokens,
    );

    let log_path = (!args.no_log).then(|| config.pipeline.log_path.clone());

    let result = pipeline::run_query(
        &retriever,
        (!args.no_rerank).then_some(&reranker as &dyn Reranker),
        &generator,
        &args.query,
        config.pipeline.n_retrieve,
        config.pipeline.n_rerank,
        log_path.as_deref(),
    )
    .await?;

    println!("\n{}\n", result.answer);

    println!("SOURCES USED ({} chunks):", result.used_chunks.len());
    for (i, chunk) in result.used_chunks.iter().enumerate() {
        let distance = chunk
            .distance
            .map(|d| format!("dist={:.4}", d))
            .unwrap_or_else(|| "dist=?".to_string());
        let rerank = chunk
            .rerank_score
            .map(|s| format!(" | rerank={:.4}", s))
            .unwrap_or_default();
        println!(
            "  [{}] ({}, {}) {}{}",
            i + 1,
            chunk.source_id,
            chunk.chunk_id,
            distance,
            rerank
        );
    }

    println!(
        "\n[{} | prompt {} | {:.2}s | {} in / {} out tokens]",
        result.model,
        result.prompt_version,
        result.elapsed_seconds,
        result.usage.input_tokens,
        result.usage.output_tokens
    );

    Ok(())
}
