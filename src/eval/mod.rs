//! Evaluation harness: query set, judge protocol, mechanical metrics,
//! batch orchestration, enrichment, and reporting.

pub mod enrich;
pub mod judge;
pub mod metrics;
pub mod query;
pub mod record;
pub mod report;
pub mod runner;

pub use judge::{JudgeOracle, QualityVerdict};
pub use metrics::{context_utilization, extract_citations, retrieval_recall};
pub use query::{load_queries, Category, EvalQuery};
pub use record::{EvalRecord, ErrorRecord, LogLine};
pub use runner::{EvalRunner, Mode, RunOptions};
