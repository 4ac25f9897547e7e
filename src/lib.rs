//! RAG Judge - side-by-side evaluation of two RAG pipelines.
//!
//! Each benchmark question is sent to two retrieval-augmented-generation
//! pipelines. Their answers are scored by an LLM judge on five weighted
//! criteria, and the outcome is assembled into one [`EvaluationRecord`] that
//! a [`ReportSink`] can persist.
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_judge::{
//!     config::Config,
//!     evaluation::Orchestrator,
//!     question::QuestionSet,
//!     report::{FileReportSink, ReportSink},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     config.validate()?;
//!
//!     let questions = QuestionSet::load(&config.questions_path)?;
//!     let orchestrator = Orchestrator::from_config(&config, questions, true)?;
//!
//!     // Pipeline and judge failures end up inside the record
//!     let record = orchestrator.evaluate(1, true).await?;
//!
//!     let sink = FileReportSink::new(&config.output_dir);
//!     let paths = sink.export(record)?;
//!     println!("{}", paths.markdown.display());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **RetryPolicy**: bounded exponential backoff for transient remote failures
//! - **PipelineAdapter**: one RAG system behind `retrieve_and_generate`
//! - **JudgeClient**: scoring prompt and response parsing over any `CompletionProvider`
//! - **ScoringAggregator**: validation and weighted composite of five criteria
//! - **Orchestrator**: runs both pipelines and the judge for one question

pub mod config;
pub mod error;
pub mod evaluation;
pub mod judge;
pub mod llm;
pub mod pipeline;
pub mod presenter;
pub mod question;
pub mod report;
pub mod retry;
pub mod scoring;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use error::{EvalError, Result};
pub use evaluation::{EvaluationRecord, Orchestrator, SlotOutcome};
pub use judge::JudgeClient;
pub use llm::CompletionProvider;
pub use pipeline::{Chunk, PipelineAdapter, PipelineError, PipelineResult};
pub use question::{Question, QuestionSet};
pub use report::{Comparison, FileReportSink, ReportSink};
pub use retry::RetryPolicy;
pub use scoring::{Criterion, CriterionScore, JudgeVerdict, ScoringAggregator};
