//! Evaluation orchestrator.
//!
//! Drives one question through both pipelines, optionally scores each answer
//! with the judge, and assembles an [`EvaluationRecord`]. Every pipeline or
//! judge failure stays inside its own slot of the record; only a
//! configuration problem (unknown question, judge requested but not
//! configured) aborts, and it does so before any remote call.
//!
//! The orchestrator does no file or console I/O. Records are handed to a
//! [`ReportSink`](crate::report::ReportSink) by the caller.

use crate::config::{Config, EvaluationConfig};
use crate::error::{ErrorKind, EvalError, Result};
use crate::judge::JudgeClient;
use crate::llm::provider_from_config;
use crate::pipeline::{
    Chunk, FileSearchPipeline, PipelineAdapter, PipelineError, PipelineResult, PipelineStage,
    RetrieveGeneratePipeline,
};
use crate::question::{Question, QuestionSet};
use crate::retry::RetryPolicy;
use crate::scoring::{JudgeVerdict, ScoringAggregator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Error summary kept in a degraded slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EvalError> for Failure {
    fn from(err: &EvalError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Why a slot has a result but no verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscoredReason {
    JudgeDisabled,
    EmptyAnswer,
}

/// Terminal state of one pipeline slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotOutcome {
    Scored {
        result: PipelineResult,
        verdict: JudgeVerdict,
    },
    Unscored {
        result: PipelineResult,
        reason: UnscoredReason,
    },
    JudgeFailed {
        result: PipelineResult,
        failure: Failure,
    },
    PipelineFailed {
        stage: PipelineStage,
        partial_chunks: Vec<Chunk>,
        latency_ms: u64,
        failure: Failure,
    },
}

impl SlotOutcome {
    pub fn result(&self) -> Option<&PipelineResult> {
        match self {
            SlotOutcome::Scored { result, .. }
            | SlotOutcome::Unscored { result, .. }
            | SlotOutcome::JudgeFailed { result, .. } => Some(result),
            SlotOutcome::PipelineFailed { .. } => None,
        }
    }

    pub fn verdict(&self) -> Option<&JudgeVerdict> {
        match self {
            SlotOutcome::Scored { verdict, .. } => Some(verdict),
            _ => None,
        }
    }

    /// Chunks retrieved for this slot, including those kept from a failed
    /// generation stage.
    pub fn chunks(&self) -> &[Chunk] {
        match self {
            SlotOutcome::PipelineFailed { partial_chunks, .. } => partial_chunks,
            other => other
                .result()
                .map(|r| r.retrieved_chunks.as_slice())
                .unwrap_or_default(),
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            SlotOutcome::JudgeFailed { failure, .. }
            | SlotOutcome::PipelineFailed { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// Whether the pipeline or the judge failed for this slot.
    pub fn is_degraded(&self) -> bool {
        self.failure().is_some()
    }

    fn pipeline_failed(err: PipelineError) -> Self {
        SlotOutcome::PipelineFailed {
            stage: err.stage,
            failure: Failure::from(&err.source),
            partial_chunks: err.retrieved_chunks,
            latency_ms: err.latency_ms,
        }
    }
}

/// Everything produced for one question. Never modified after assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: Question,
    /// Pipeline names in slot order (A, then B).
    pub pipelines: Vec<String>,
    pub results: BTreeMap<String, SlotOutcome>,
    pub created_at: DateTime<Utc>,
    pub judge_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_model: Option<String>,
}

impl EvaluationRecord {
    pub fn slot(&self, pipeline: &str) -> Option<&SlotOutcome> {
        self.results.get(pipeline)
    }

    /// Slots in A, B order.
    pub fn slots(&self) -> impl Iterator<Item = (&str, &SlotOutcome)> {
        self.pipelines
            .iter()
            .filter_map(|name| self.results.get(name).map(|slot| (name.as_str(), slot)))
    }

    pub fn is_degraded(&self) -> bool {
        self.results.values().any(SlotOutcome::is_degraded)
    }
}

/// Per-slot progress. Each step awaits at most one remote boundary.
enum SlotState<'a> {
    Init,
    Ran(std::result::Result<PipelineResult, PipelineError>),
    Judging(PipelineResult, &'a JudgeClient),
    Done(SlotOutcome),
}

/// Runs questions through two pipelines and the judge.
pub struct Orchestrator {
    pipeline_a: Arc<dyn PipelineAdapter>,
    pipeline_b: Arc<dyn PipelineAdapter>,
    judge: Option<JudgeClient>,
    questions: QuestionSet,
    schedule: EvaluationConfig,
}

impl Orchestrator {
    /// Pipelines must have distinct names, since names key the record.
    pub fn new(
        pipeline_a: Arc<dyn PipelineAdapter>,
        pipeline_b: Arc<dyn PipelineAdapter>,
        judge: Option<JudgeClient>,
        questions: QuestionSet,
    ) -> Result<Self> {
        if pipeline_a.name() == pipeline_b.name() {
            return Err(EvalError::Configuration(format!(
                "Both pipelines are named '{}'",
                pipeline_a.name()
            )));
        }

        Ok(Self {
            pipeline_a,
            pipeline_b,
            judge,
            questions,
            schedule: EvaluationConfig::default(),
        })
    }

    pub fn with_schedule(mut self, schedule: EvaluationConfig) -> Self {
        self.schedule = schedule;
        self
    }

    /// Wire the configured pipelines and, if `with_judge`, the judge.
    pub fn from_config(config: &Config, questions: QuestionSet, with_judge: bool) -> Result<Self> {
        config.validate_pipelines()?;
        let retry = RetryPolicy::from_config(&config.retry);

        let manual =
            RetrieveGeneratePipeline::from_config(&config.pipelines.manual, retry.clone())?;
        let file_search =
            FileSearchPipeline::from_config(&config.pipelines.file_search, retry.clone())?;

        let judge = if with_judge {
            config.validate_judge()?;
            let aggregator = ScoringAggregator::new(questions.weights)?;
            Some(
                JudgeClient::new(provider_from_config(&config.judge)?, retry, aggregator)
                    .with_max_context_chunks(config.evaluation.max_context_chunks),
            )
        } else {
            None
        };

        Ok(Self::new(Arc::new(manual), Arc::new(file_search), judge, questions)?
            .with_schedule(config.evaluation.clone()))
    }

    pub fn questions(&self) -> &QuestionSet {
        &self.questions
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    /// Evaluate the question with the given id.
    pub async fn evaluate(&self, question_id: u32, judge_enabled: bool) -> Result<EvaluationRecord> {
        let question = self.questions.find(question_id)?;
        self.evaluate_question(question, judge_enabled).await
    }

    /// Evaluate one question.
    ///
    /// Errors only for configuration problems, before any pipeline runs.
    pub async fn evaluate_question(
        &self,
        question: &Question,
        judge_enabled: bool,
    ) -> Result<EvaluationRecord> {
        let judge = match (judge_enabled, &self.judge) {
            (true, None) => {
                return Err(EvalError::Configuration(
                    "Judge scoring requested but no judge is configured".to_string(),
                ));
            }
            (true, Some(judge)) => Some(judge),
            (false, _) => None,
        };

        info!(
            question_id = question.id,
            category = %question.category,
            judge_enabled,
            concurrent = self.schedule.concurrent,
            "evaluating question"
        );

        let (slot_a, slot_b) = if self.schedule.concurrent {
            tokio::join!(
                self.run_slot(self.pipeline_a.as_ref(), question, judge),
                self.run_slot(self.pipeline_b.as_ref(), question, judge),
            )
        } else {
            let slot_a = self.run_slot(self.pipeline_a.as_ref(), question, judge).await;
            if self.schedule.pause_between_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.schedule.pause_between_ms)).await;
            }
            let slot_b = self.run_slot(self.pipeline_b.as_ref(), question, judge).await;
            (slot_a, slot_b)
        };

        let name_a = self.pipeline_a.name().to_string();
        let name_b = self.pipeline_b.name().to_string();
        let mut results = BTreeMap::new();
        results.insert(name_a.clone(), slot_a);
        results.insert(name_b.clone(), slot_b);

        let record = EvaluationRecord {
            question: question.clone(),
            pipelines: vec![name_a, name_b],
            results,
            created_at: Utc::now(),
            judge_enabled,
            judge_model: judge.map(|j| j.model().to_string()),
        };

        info!(
            question_id = question.id,
            degraded = record.is_degraded(),
            "evaluation assembled"
        );
        Ok(record)
    }

    async fn run_slot(
        &self,
        pipeline: &dyn PipelineAdapter,
        question: &Question,
        judge: Option<&JudgeClient>,
    ) -> SlotOutcome {
        let name = pipeline.name();
        let mut state = SlotState::Init;

        loop {
            state = match state {
                SlotState::Init => {
                    info!(pipeline = name, question_id = question.id, "running pipeline");
                    SlotState::Ran(pipeline.retrieve_and_generate(&question.text).await)
                }
                SlotState::Ran(Err(err)) => {
                    warn!(
                        pipeline = name,
                        stage = %err.stage,
                        error = %err.source,
                        partial_chunks = err.retrieved_chunks.len(),
                        "pipeline failed"
                    );
                    SlotState::Done(SlotOutcome::pipeline_failed(err))
                }
                SlotState::Ran(Ok(result)) => match judge {
                    None => SlotState::Done(SlotOutcome::Unscored {
                        result,
                        reason: UnscoredReason::JudgeDisabled,
                    }),
                    Some(_) if !result.has_answer() => {
                        warn!(pipeline = name, "empty answer, skipping judge");
                        SlotState::Done(SlotOutcome::Unscored {
                            result,
                            reason: UnscoredReason::EmptyAnswer,
                        })
                    }
                    Some(judge) => SlotState::Judging(result, judge),
                },
                SlotState::Judging(result, judge) => match judge.score(question, &result).await {
                    Ok(verdict) => SlotState::Done(SlotOutcome::Scored { result, verdict }),
                    Err(err) => {
                        warn!(pipeline = name, error = %err, "judge failed");
                        SlotState::Done(SlotOutcome::JudgeFailed {
                            result,
                            failure: Failure::from(&err),
                        })
                    }
                },
                SlotState::Done(outcome) => return outcome,
            };
        }
    }
}
