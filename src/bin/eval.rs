//! Evaluation CLI: run the fixed query set through the pipeline in each mode,
//! score with the judge, persist JSONL records, and print the summary.

use clap::Parser;
use rageval::eval::judge::AnthropicJudge;
use rageval::eval::{load_queries, report, EvalRunner, JudgeOracle, Mode, RunOptions};
use rageval::pipeline::{AnthropicGenerator, HttpReranker, HttpRetriever};
use rageval::Config;
use std::path::PathBuf;

/// Run the RAG evaluation suite.
#[derive(Parser, Debug)]
#[command(name = "eval")]
struct Args {
    /// Path to evaluation queries JSON.
    #[arg(long, default_value = "eval_queries.json")]
    queries: PathBuf,

    /// Output JSONL path.
    #[arg(long, default_value = "logs/eval_results.jsonl")]
    output: PathBuf,

    /// Only run with reranking (skip baseline).
    #[arg(long)]
    rerank_only: bool,

    /// Only run without reranking (skip reranked).
    #[arg(long)]
    baseline_only: bool,

    /// Only run queries whose ID starts with this prefix (e.g. "D-").
    #[arg(long)]
    filter: Option<String>,

    /// Skip judge scoring (useful for testing the pipeline only).
    #[arg(long)]
    no_score: bool,

    /// Override the judge model from config.
    #[arg(long)]
    judge_model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.rerank_only && args.baseline_only {
        anyhow::bail!("--rerank-only and --baseline-only are mutually exclusive");
    }

    let config = Config::load()?;

    let mut queries = load_queries(&args.queries)?;
    if let Some(prefix) = &args.filter {
        queries.retain(|q| q.id.starts_with(prefix.as_str()));
        println!(
            "Filtered to {} queries matching prefix '{}'",
            queries.len(),
            prefix
        );
    }
    if queries.is_empty() {
        anyhow::bail!("No queries to run. Check your --filter setting.");
    }

    let modes = Mode::schedule(args.rerank_only, args.baseline_only);
    println!(
        "\nPlanned: {} queries x {} mode(s) = {} total runs",
        queries.len(),
        modes.len(),
        queries.len() * modes.len()
    );

    let judge_model = args
        .judge_model
        .unwrap_or_else(|| config.judge.model.clone());
    if !args.no_score {
        println!("Judge model: {}", judge_model);
    }

    let retriever = HttpRetriever::new(
        config.search.url.clone(),
        config.search.collection.clone(),
    );
    let reranker = HttpReranker::new(config.reranker.url.clone(), config.reranker.model.clone());

    let generation_key = std::env::var(&config.generation.api_key_env)?;
    let generator = AnthropicGenerator::new(
        generation_key,
        config.generation.model.clone(),
        config.generation.max_tokens,
    );

    let judge_key = std::env::var(&config.judge.api_key_env)?;
    let judge = AnthropicJudge::new(judge_key, judge_model);

    let runner = EvalRunner::new(
        &retriever,
        &reranker,
        &generator,
        (!args.no_score).then_some(&judge as &dyn JudgeOracle),
        RunOptions {
            output: args.output.clone(),
            n_retrieve: config.pipeline.n_retrieve,
            n_rerank: config.pipeline.n_rerank,
        },
    );

    let lines = runner.run(&queries, &modes).await?;

    report::print_summary(&lines);

    println!("\nResults saved to: {}", args.output.display());
    println!("Total records: {}", lines.len());

    let mode_labels: Vec<&str> = modes.iter().map(Mode::label).collect();
    let summary = report::run_summary(&lines, queries.len(), &mode_labels);
    let summary_path = args.output.with_extension("summary.json");
    report::write_summary(&summary_path, &summary)?;
    println!("Summary saved to: {}", summary_path.display());

    Ok(())
}
