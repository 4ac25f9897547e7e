//! LLM-as-judge scoring of pipeline answers.
//!
//! The client only knows how to build the scoring prompt and read the
//! five-criterion response; talking to a particular provider is delegated to
//! a [`CompletionProvider`].

use crate::error::{EvalError, Result};
use crate::llm::{CompletionProvider, Prompts};
use crate::pipeline::PipelineResult;
use crate::question::Question;
use crate::retry::RetryPolicy;
use crate::scoring::{Criterion, CriterionScore, JudgeAudit, JudgeVerdict, ScoringAggregator};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// Separator between chunks in the judge prompt.
pub const CHUNK_SEPARATOR: &str = "\n\n--- CHUNK SEPARATOR ---\n\n";

/// Scores pipeline answers with a judge model.
pub struct JudgeClient {
    provider: Arc<dyn CompletionProvider>,
    retry: RetryPolicy,
    aggregator: ScoringAggregator,
    max_context_chunks: usize,
}

impl JudgeClient {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        retry: RetryPolicy,
        aggregator: ScoringAggregator,
    ) -> Self {
        Self {
            provider,
            retry,
            aggregator,
            max_context_chunks: 5,
        }
    }

    pub fn with_max_context_chunks(mut self, max_context_chunks: usize) -> Self {
        self.max_context_chunks = max_context_chunks;
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Context block shown to the judge: the first `max_context_chunks`
    /// chunk texts joined by [`CHUNK_SEPARATOR`].
    pub fn context_for(&self, result: &PipelineResult) -> String {
        let texts: Vec<&str> = result
            .retrieved_chunks
            .iter()
            .take(self.max_context_chunks)
            .map(|c| c.text.as_str())
            .collect();

        if texts.is_empty() {
            "(no context retrieved)".to_string()
        } else {
            texts.join(CHUNK_SEPARATOR)
        }
    }

    pub fn build_prompt(&self, question: &Question, result: &PipelineResult) -> String {
        let chunk_count = result.retrieved_chunks.len().min(self.max_context_chunks);
        let chunk_count = chunk_count.to_string();
        let context = self.context_for(result);

        Prompts::render(
            Prompts::judge_scoring(),
            &[
                ("question", question.text.as_str()),
                ("chunk_count", chunk_count.as_str()),
                ("context", context.as_str()),
                ("answer", result.answer_text.as_str()),
            ],
        )
    }

    /// Score one pipeline answer.
    ///
    /// Transient provider failures are retried; a response that is not a
    /// valid five-criterion verdict is an error, never a default score.
    pub async fn score(&self, question: &Question, result: &PipelineResult) -> Result<JudgeVerdict> {
        let system = Prompts::judge_system();
        let prompt = self.build_prompt(question, result);

        info!(
            pipeline = %result.pipeline_name,
            question_id = question.id,
            model = self.provider.model(),
            prompt_chars = prompt.len(),
            "judging answer"
        );

        let response = self
            .retry
            .execute("judge", || self.provider.complete(Some(system), &prompt))
            .await?;

        debug!(pipeline = %result.pipeline_name, response = %response, "judge response");

        let parsed = parse_judge_response(&response)?;
        let mut verdict = self.aggregator.aggregate(parsed.scores)?;
        verdict.overall_assessment = parsed.overall_assessment;
        verdict.audit = Some(JudgeAudit {
            model: self.provider.model().to_string(),
            temperature: self.provider.temperature(),
            prompt_sha256: prompt_digest(system, &prompt),
        });

        info!(
            pipeline = %result.pipeline_name,
            composite = verdict.composite_score,
            "judge verdict"
        );

        Ok(verdict)
    }
}

/// SHA-256 over the system prompt and user prompt, hex encoded.
pub fn prompt_digest(system: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system.as_bytes());
    hasher.update(b"\n\n");
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Criterion scores read from a judge response, not yet validated.
#[derive(Debug)]
pub struct ParsedJudgeResponse {
    pub scores: Vec<CriterionScore>,
    pub overall_assessment: Option<String>,
}

/// Read the judge's JSON.
///
/// Structural problems (not JSON, not an object, non-integer scores) are
/// [`EvalError::JudgeParse`]. Missing criteria and out-of-range values are
/// left for the aggregator to reject as [`EvalError::InvalidVerdict`].
pub fn parse_judge_response(response: &str) -> Result<ParsedJudgeResponse> {
    let json_str = extract_json(response);

    let value: Value = serde_json::from_str(&json_str).map_err(|e| {
        EvalError::JudgeParse(format!("{}. Response: {}", e, truncate(response, 500)))
    })?;

    let object = value.as_object().ok_or_else(|| {
        EvalError::JudgeParse(format!(
            "expected a JSON object, got: {}",
            truncate(response, 500)
        ))
    })?;

    let mut scores = Vec::new();
    for (key, entry) in object {
        let Some(criterion) = Criterion::from_id(key) else {
            continue;
        };

        let (score_value, justification) = match entry {
            Value::Object(fields) => {
                let score = fields.get("score").ok_or_else(|| {
                    EvalError::JudgeParse(format!("{} has no score", criterion))
                })?;
                let justification = fields
                    .get("justification")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                (score, justification)
            }
            bare => (bare, String::new()),
        };

        scores.push(CriterionScore::new(
            criterion,
            parse_score(criterion, score_value)?,
            justification,
        ));
    }

    if scores.is_empty() {
        return Err(EvalError::JudgeParse(format!(
            "no criterion scores in response: {}",
            truncate(response, 500)
        )));
    }

    let overall_assessment = object
        .get("overall_assessment")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ParsedJudgeResponse {
        scores,
        overall_assessment,
    })
}

fn parse_score(criterion: Criterion, value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| {
        EvalError::JudgeParse(format!("{} score is not an integer: {}", criterion, value))
    })
}

/// Extract JSON from response.
fn extract_json(response: &str) -> String {
    let response = response.trim();

    if response.starts_with("```json") {
        if let Some(end) = response.rfind("```") {
            let start = "```json".len();
            if end > start {
                return response[start..end].trim().to_string();
            }
        }
    }

    if response.starts_with("```") {
        if let Some(end) = response.rfind("```") {
            let start = response.find('\n').map(|n| n + 1).unwrap_or(3);
            if end > start {
                return response[start..end].trim().to_string();
            }
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end > start {
                return response[start..=end].to_string();
            }
        }
    }

    response.to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
