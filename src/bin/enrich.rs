//! Enrichment CLI: add completeness verdicts and mechanical metrics to an
//! existing evaluation log, writing a new record stream and a rich summary.

use clap::Parser;
use rageval::eval::enrich::{enrich_log, EnrichOptions};
use rageval::eval::judge::AnthropicJudge;
use rageval::eval::{report, JudgeOracle};
use rageval::Config;
use std::path::PathBuf;
use std::time::Duration;

/// Add completeness scores and mechanical metrics to eval results.
#[derive(Parser, Debug)]
#[command(name = "enrich")]
struct Args {
    /// Path to existing eval results JSONL.
    #[arg(long, default_value = "logs/eval_results.jsonl")]
    input: PathBuf,

    /// Path for the enriched output JSONL.
    #[arg(long, default_value = "logs/eval_results_v2.jsonl")]
    output: PathBuf,

    /// Path for the summary JSON (default: <output>.summary.json).
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Compute mechanical metrics only, skip judge calls.
    #[arg(long)]
    dry_run: bool,

    /// Override the judge model from config.
    #[arg(long)]
    judge_model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let summary_path = args
        .summary
        .clone()
        .unwrap_or_else(|| args.output.with_extension("summary.json"));

    let judge = if args.dry_run {
        None
    } else {
        let api_key = std::env::var(&config.judge.api_key_env)?;
        let model = args
            .judge_model
            .unwrap_or_else(|| config.judge.model.clone());
        println!("Judge model: {}", model);
        Some(AnthropicJudge::new(api_key, model))
    };

    let options = EnrichOptions {
        input: args.input,
        output: args.output.clone(),
        summary: summary_path.clone(),
        delay: Duration::from_millis(config.judge.delay_ms),
    };

    let outcome = enrich_log(
        judge.as_ref().map(|j| j as &dyn JudgeOracle),
        &options,
    )
    .await?;

    println!(
        "\nWrote {} enriched records to {}",
        outcome.lines.len(),
        args.output.display()
    );
    println!("Wrote summary to {}", summary_path.display());
    if !args.dry_run {
        println!(
            "Completeness judge tokens: {} in / {} out",
            outcome.judge_tokens.input, outcome.judge_tokens.output
        );
    }

    report::print_enriched_summary(&outcome.summary);

    Ok(())
}
