pub mod anthropic;
pub mod chunk;
pub mod config;
pub mod error;
pub mod eval;
pub mod pipeline;

pub use config::Config;
pub use error::{RagEvalError, Result};
pub use eval::{EvalRecord, EvalRunner, LogLine, Mode};
