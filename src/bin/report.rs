//! Reporting CLI: recompute aggregate statistics from an existing evaluation
//! log without rerunning the pipeline or the judge.

use clap::Parser;
use rageval::eval::record::read_log;
use rageval::eval::report;
use rageval::eval::EvalRecord;
use std::collections::HashSet;
use std::path::PathBuf;

/// Print summary statistics from an evaluation results log.
#[derive(Parser, Debug)]
#[command(name = "report")]
struct Args {
    /// Path to an evaluation results JSONL (first pass or enriched).
    #[arg(long, default_value = "logs/eval_results.jsonl")]
    input: PathBuf,

    /// Also write a summary JSON next to the input.
    #[arg(long)]
    write_summary: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let lines = read_log(&args.input)?;
    if lines.is_empty() {
        anyhow::bail!("No records in {}", args.input.display());
    }

    println!(
        "Loaded {} records from {}",
        lines.len(),
        args.input.display()
    );
    report::print_summary(&lines);

    let records: Vec<&EvalRecord> = lines.iter().filter_map(|l| l.as_record()).collect();
    let enriched = records
        .iter()
        .any(|r| r.retrieval_recall.is_some() || r.completeness_score.is_some());
    if enriched {
        report::print_enriched_summary(&report::enriched_summary(&records));
    }

    if args.write_summary {
        let path = args.input.with_extension("summary.json");
        if enriched {
            let mut summary = report::enriched_summary(&records);
            summary.source_file = Some(args.input.display().to_string());
            report::write_summary(&path, &summary)?;
        } else {
            let n_queries = records
                .iter()
                .map(|r| r.query_id.as_str())
                .collect::<HashSet<_>>()
                .len();
            let mut labels = Vec::new();
            if records.iter().any(|r| r.use_reranker) {
                labels.push("rerank");
            }
            if records.iter().any(|r| !r.use_reranker) {
                labels.push("baseline");
            }
            let summary = report::run_summary(&lines, n_queries, &labels);
            report::write_summary(&path, &summary)?;
        }
        println!("Summary saved to: {}", path.display());
    }

    Ok(())
}
