//! Stub collaborators shared by unit tests.

use crate::error::{EvalError, Result};
use crate::llm::CompletionProvider;
use crate::pipeline::{Chunk, PipelineAdapter, PipelineError, PipelineResult, PipelineStage};
use crate::scoring::Criterion;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Judge-shaped JSON with the given scores in [`Criterion::ALL`] order.
pub fn verdict_json(scores: [i64; 5]) -> String {
    let mut object = serde_json::Map::new();
    for (criterion, score) in Criterion::ALL.iter().zip(scores) {
        object.insert(
            criterion.id().to_string(),
            serde_json::json!({"score": score, "justification": format!("{} looks {}", criterion, score)}),
        );
    }
    object.insert(
        "overall_assessment".to_string(),
        serde_json::json!("Solid answer."),
    );
    serde_json::Value::Object(object).to_string()
}

/// Completion provider replaying scripted responses.
///
/// Once the script runs out, `fallback` is returned (or a permanent error
/// if there is none).
pub struct StubProvider {
    script: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubProvider {
    pub fn always(response: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn scripted(script: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    fn model(&self) -> &str {
        "stub-judge"
    }

    fn temperature(&self) -> f32 {
        0.0
    }

    async fn complete(&self, _system: Option<&str>, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(user.to_string());

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| EvalError::PermanentRemote("script exhausted".to_string()))
    }
}

type Outcome = Box<dyn Fn(&str) -> std::result::Result<PipelineResult, PipelineError> + Send + Sync>;

/// Pipeline adapter with a fixed outcome.
pub struct StubPipeline {
    name: String,
    outcome: Outcome,
    calls: AtomicUsize,
}

impl StubPipeline {
    pub fn answering(name: &str, answer: &str, chunks: Vec<Chunk>) -> Self {
        let pipeline_name = name.to_string();
        let answer = answer.to_string();
        Self {
            name: name.to_string(),
            outcome: Box::new(move |_question| {
                Ok(PipelineResult {
                    pipeline_name: pipeline_name.clone(),
                    answer_text: answer.clone(),
                    retrieved_chunks: chunks.clone(),
                    latency_ms: 42,
                })
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str, stage: PipelineStage, chunks: Vec<Chunk>) -> Self {
        Self {
            name: name.to_string(),
            outcome: Box::new(move |_question| {
                let source = EvalError::RetryExhausted {
                    attempts: 3,
                    last: Box::new(EvalError::TransientRemote("HTTP 503: overloaded".to_string())),
                };
                Err(match stage {
                    PipelineStage::Retrieval => PipelineError::retrieval(source, 10),
                    PipelineStage::Generation => PipelineError::generation(source, chunks.clone(), 10),
                })
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineAdapter for StubPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve_and_generate(
        &self,
        question: &str,
    ) -> std::result::Result<PipelineResult, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.outcome)(question)
    }
}

pub fn sample_chunks() -> Vec<Chunk> {
    vec![
        Chunk::new(
            "Art. 5, LIV: no one shall be deprived of liberty or property without due process of law.",
            "constituicao.pdf",
            Some(0.91),
        ),
        Chunk::new(
            "Due process has a procedural and a substantive dimension.",
            "manual_direito.pdf",
            Some(0.84),
        ),
    ]
}
