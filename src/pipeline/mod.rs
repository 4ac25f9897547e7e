//! RAG pipelines under comparison.
//!
//! The evaluator only depends on [`PipelineAdapter`]. Two concrete adapters
//! ship with the crate:
//! - [`RetrieveGeneratePipeline`]: a retrieval service followed by an LLM
//!   generation call
//! - [`FileSearchPipeline`]: Gemini with the File Search tool, where
//!   retrieval and generation happen in one request

mod file_search;
mod retrieve_generate;

pub use file_search::FileSearchPipeline;
pub use retrieve_generate::{HttpRetriever, RetrieveGeneratePipeline, Retriever};

use crate::error::EvalError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A retrieved unit of source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Document or file the chunk came from.
    #[serde(default)]
    pub source_id: String,
    /// Relevance score reported by the retriever, when it reports one.
    #[serde(default)]
    pub score: Option<f64>,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>, score: Option<f64>) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            score,
        }
    }

    /// Length in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Output of one pipeline for one question.
///
/// An empty `retrieved_chunks` is a retrieval miss, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub pipeline_name: String,
    pub answer_text: String,
    pub retrieved_chunks: Vec<Chunk>,
    pub latency_ms: u64,
}

impl PipelineResult {
    /// Whether the pipeline produced anything worth judging.
    pub fn has_answer(&self) -> bool {
        !self.answer_text.trim().is_empty()
    }
}

/// The step of a pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Retrieval,
    Generation,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Retrieval => write!(f, "retrieval"),
            PipelineStage::Generation => write!(f, "generation"),
        }
    }
}

/// Failure of a pipeline adapter.
///
/// A generation failure keeps whatever was retrieved before it.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    pub source: EvalError,
    pub retrieved_chunks: Vec<Chunk>,
    pub latency_ms: u64,
}

impl PipelineError {
    pub fn retrieval(source: EvalError, latency_ms: u64) -> Self {
        Self {
            stage: PipelineStage::Retrieval,
            source,
            retrieved_chunks: Vec::new(),
            latency_ms,
        }
    }

    pub fn generation(source: EvalError, retrieved_chunks: Vec<Chunk>, latency_ms: u64) -> Self {
        Self {
            stage: PipelineStage::Generation,
            source,
            retrieved_chunks,
            latency_ms,
        }
    }
}

impl From<PipelineError> for EvalError {
    fn from(err: PipelineError) -> Self {
        EvalError::Pipeline {
            stage: err.stage,
            cause: err.source.to_string(),
        }
    }
}

/// A RAG system that can answer a benchmark question.
#[async_trait]
pub trait PipelineAdapter: Send + Sync {
    /// Stable name used as the key in evaluation records.
    fn name(&self) -> &str;

    async fn retrieve_and_generate(
        &self,
        question: &str,
    ) -> std::result::Result<PipelineResult, PipelineError>;
}
