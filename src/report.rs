//! Side-by-side comparison of the two slots of a record, and report export.
//!
//! A [`ReportSink`] takes ownership of a finished [`EvaluationRecord`];
//! [`FileReportSink`] writes it as a JSON dump plus a Markdown report.

use crate::error::{EvalError, Result};
use crate::evaluation::{EvaluationRecord, SlotOutcome};
use crate::pipeline::Chunk;
use crate::scoring::{Criterion, JudgeVerdict};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Which slot did better on a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    A,
    B,
    Tie,
}

impl Winner {
    fn of(score_a: i64, score_b: i64) -> Self {
        match score_a.cmp(&score_b) {
            std::cmp::Ordering::Greater => Winner::A,
            std::cmp::Ordering::Less => Winner::B,
            std::cmp::Ordering::Equal => Winner::Tie,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionComparison {
    pub criterion: Criterion,
    pub score_a: i64,
    pub score_b: i64,
    /// `score_b - score_a`.
    pub difference: i64,
    pub winner: Winner,
}

/// Size of the context a slot would show the judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChunkStats {
    pub count: usize,
    pub total_chars: usize,
    /// Integer average; zero when there are no chunks.
    pub avg_chars: usize,
}

impl ChunkStats {
    pub fn from_chunks(chunks: &[Chunk], limit: usize) -> Self {
        let considered = &chunks[..chunks.len().min(limit)];
        let count = considered.len();
        let total_chars: usize = considered.iter().map(Chunk::char_len).sum();
        Self {
            count,
            total_chars,
            avg_chars: total_chars / count.max(1),
        }
    }
}

/// Derived comparison between slot A and slot B of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub pipeline_a: String,
    pub pipeline_b: String,
    /// Empty unless both slots were scored.
    pub criteria: Vec<CriterionComparison>,
    pub wins_a: usize,
    pub wins_b: usize,
    pub ties: usize,
    pub composite_a: Option<f64>,
    pub composite_b: Option<f64>,
    /// `composite_b - composite_a`, when both are present.
    pub composite_difference: Option<f64>,
    pub chunks_a: ChunkStats,
    pub chunks_b: ChunkStats,
    pub chunk_count_difference: i64,
    pub char_difference: i64,
    /// Both slots sent the judge the same number of chunks.
    pub consistent_chunks: bool,
}

impl Comparison {
    /// `None` if the record does not have two slots.
    pub fn from_record(record: &EvaluationRecord, max_context_chunks: usize) -> Option<Self> {
        let mut slots = record.slots();
        let (name_a, slot_a) = slots.next()?;
        let (name_b, slot_b) = slots.next()?;

        let verdict_a = slot_a.verdict();
        let verdict_b = slot_b.verdict();

        let criteria = match (verdict_a, verdict_b) {
            (Some(a), Some(b)) => compare_criteria(a, b),
            _ => Vec::new(),
        };
        let count = |w: Winner| criteria.iter().filter(|c| c.winner == w).count();

        let composite_a = verdict_a.map(|v| v.composite_score);
        let composite_b = verdict_b.map(|v| v.composite_score);
        let composite_difference = composite_a.zip(composite_b).map(|(a, b)| b - a);

        let chunks_a = ChunkStats::from_chunks(slot_a.chunks(), max_context_chunks);
        let chunks_b = ChunkStats::from_chunks(slot_b.chunks(), max_context_chunks);
        let chunk_count_difference = chunks_b.count as i64 - chunks_a.count as i64;

        Some(Self {
            pipeline_a: name_a.to_string(),
            pipeline_b: name_b.to_string(),
            wins_a: count(Winner::A),
            wins_b: count(Winner::B),
            ties: count(Winner::Tie),
            criteria,
            composite_a,
            composite_b,
            composite_difference,
            chunks_a,
            chunks_b,
            chunk_count_difference,
            char_difference: chunks_b.total_chars as i64 - chunks_a.total_chars as i64,
            consistent_chunks: chunk_count_difference == 0,
        })
    }

    /// Name of the slot with more criterion wins, `None` on a tie.
    pub fn overall_winner(&self) -> Option<&str> {
        match self.wins_a.cmp(&self.wins_b) {
            std::cmp::Ordering::Greater => Some(&self.pipeline_a),
            std::cmp::Ordering::Less => Some(&self.pipeline_b),
            std::cmp::Ordering::Equal => None,
        }
    }
}

fn compare_criteria(a: &JudgeVerdict, b: &JudgeVerdict) -> Vec<CriterionComparison> {
    Criterion::ALL
        .iter()
        .filter_map(|&criterion| {
            let score_a = a.score(criterion)?;
            let score_b = b.score(criterion)?;
            Some(CriterionComparison {
                criterion,
                score_a,
                score_b,
                difference: score_b - score_a,
                winner: Winner::of(score_a, score_b),
            })
        })
        .collect()
}

/// Paths written by a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedReport {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Receives finished records for rendering or persistence.
pub trait ReportSink {
    fn export(&self, record: EvaluationRecord) -> Result<ExportedReport>;
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    #[serde(flatten)]
    record: &'a EvaluationRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    comparison: Option<&'a Comparison>,
}

/// Writes `evaluation_q{id}_{timestamp}.json` and `.md` into a directory.
#[derive(Debug, Clone)]
pub struct FileReportSink {
    output_dir: PathBuf,
    max_context_chunks: usize,
}

impl FileReportSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_context_chunks: 5,
        }
    }

    pub fn with_max_context_chunks(mut self, max_context_chunks: usize) -> Self {
        self.max_context_chunks = max_context_chunks;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn base_name(record: &EvaluationRecord) -> String {
        format!(
            "evaluation_q{}_{}",
            record.question.id,
            record.created_at.format("%Y%m%d_%H%M%S_%3f")
        )
    }

    /// JSON and Markdown paths that do not clash with an earlier report.
    fn free_paths(&self, base: &str) -> (PathBuf, PathBuf) {
        let mut suffix = 0u32;
        loop {
            let stem = if suffix == 0 {
                base.to_string()
            } else {
                format!("{}_{}", base, suffix)
            };
            let json = self.output_dir.join(format!("{}.json", stem));
            let markdown = self.output_dir.join(format!("{}.md", stem));
            if !json.exists() && !markdown.exists() {
                return (json, markdown);
            }
            suffix += 1;
        }
    }
}

impl ReportSink for FileReportSink {
    fn export(&self, record: EvaluationRecord) -> Result<ExportedReport> {
        if !self.output_dir.exists() {
            fs::create_dir_all(&self.output_dir).map_err(|e| EvalError::io(&self.output_dir, e))?;
        }

        let comparison = Comparison::from_record(&record, self.max_context_chunks);
        let (json_path, markdown_path) = self.free_paths(&Self::base_name(&record));

        let document = ReportDocument {
            record: &record,
            comparison: comparison.as_ref(),
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| EvalError::Serialization(e.to_string()))?;
        fs::write(&json_path, json).map_err(|e| EvalError::io(&json_path, e))?;

        let markdown = render_markdown(&record, comparison.as_ref());
        fs::write(&markdown_path, markdown).map_err(|e| EvalError::io(&markdown_path, e))?;

        info!(
            json = %json_path.display(),
            markdown = %markdown_path.display(),
            "report saved"
        );

        Ok(ExportedReport {
            json: json_path,
            markdown: markdown_path,
        })
    }
}

/// Human-readable Markdown report for one record.
pub fn render_markdown(record: &EvaluationRecord, comparison: Option<&Comparison>) -> String {
    let mut lines = vec![
        format!("# Evaluation: Question {}", record.question.id),
        String::new(),
        format!(
            "**Date:** {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        String::new(),
        format!("**Category:** {}", record.question.category),
        String::new(),
    ];
    if let Some(model) = &record.judge_model {
        lines.push(format!("**Judge model:** {}", model));
        lines.push(String::new());
    }

    lines.push("## Question".to_string());
    lines.push(String::new());
    lines.push(record.question.text.clone());
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(String::new());

    for (name, slot) in record.slots() {
        render_slot(&mut lines, name, slot);
    }

    if let Some(comparison) = comparison {
        render_comparison(&mut lines, comparison);
    }

    lines.push("---".to_string());
    lines.push(String::new());
    lines.push(format!(
        "*Report generated at {}*",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    lines.push(String::new());

    lines.join("\n")
}

fn render_slot(lines: &mut Vec<String>, name: &str, slot: &SlotOutcome) {
    lines.push(format!("## {}", name));
    lines.push(String::new());

    match slot {
        SlotOutcome::PipelineFailed {
            stage,
            partial_chunks,
            latency_ms,
            failure,
        } => {
            lines.push(format!("**Failed at {} stage** after {} ms", stage, latency_ms));
            lines.push(String::new());
            lines.push(format!("`{:?}`: {}", failure.kind, failure.message));
            lines.push(String::new());
            lines.push(format!("**Chunks retrieved before failure:** {}", partial_chunks.len()));
            lines.push(String::new());
        }
        SlotOutcome::Scored { result, .. }
        | SlotOutcome::Unscored { result, .. }
        | SlotOutcome::JudgeFailed { result, .. } => {
            lines.push(format!("**Latency:** {:.2}s", result.latency_ms as f64 / 1000.0));
            lines.push(String::new());
            lines.push(format!("**Chunks retrieved:** {}", result.retrieved_chunks.len()));
            lines.push(String::new());
            lines.push("### Answer".to_string());
            lines.push(String::new());
            lines.push(if result.has_answer() {
                result.answer_text.clone()
            } else {
                "N/A".to_string()
            });
            lines.push(String::new());
        }
    }

    match slot {
        SlotOutcome::Scored { verdict, .. } => render_verdict(lines, verdict),
        SlotOutcome::Unscored { reason, .. } => {
            lines.push(format!("*Not scored: {:?}*", reason));
            lines.push(String::new());
        }
        SlotOutcome::JudgeFailed { failure, .. } => {
            lines.push(format!("**Judge failed** (`{:?}`): {}", failure.kind, failure.message));
            lines.push(String::new());
        }
        SlotOutcome::PipelineFailed { .. } => {}
    }

    lines.push("---".to_string());
    lines.push(String::new());
}

fn render_verdict(lines: &mut Vec<String>, verdict: &JudgeVerdict) {
    lines.push("### Judge Evaluation".to_string());
    lines.push(String::new());
    lines.push("| Criterion | Score | Justification |".to_string());
    lines.push("|-----------|-------|---------------|".to_string());
    for entry in &verdict.scores {
        lines.push(format!(
            "| {} | {}/5 | {} |",
            entry.criterion.label(),
            entry.score,
            escape_cell(&entry.justification)
        ));
    }
    lines.push(String::new());
    lines.push(format!("**Composite score:** {:.2}", verdict.composite_score));
    lines.push(String::new());
    if let Some(overall) = &verdict.overall_assessment {
        lines.push(format!("**Overall assessment:** {}", overall));
        lines.push(String::new());
    }
    if let Some(audit) = &verdict.audit {
        lines.push(format!(
            "<sub>judge `{}` at temperature {}, prompt sha256 `{}`</sub>",
            audit.model, audit.temperature, audit.prompt_sha256
        ));
        lines.push(String::new());
    }
}

fn render_comparison(lines: &mut Vec<String>, comparison: &Comparison) {
    let a = &comparison.pipeline_a;
    let b = &comparison.pipeline_b;

    if !comparison.criteria.is_empty() {
        lines.push("## Score Comparison".to_string());
        lines.push(String::new());
        lines.push(format!("| Criterion | {} | {} | Difference |", a, b));
        lines.push("|-----------|---|---|------------|".to_string());
        for c in &comparison.criteria {
            lines.push(format!(
                "| {} | {}/5 | {}/5 | {:+} |",
                c.criterion.label(),
                c.score_a,
                c.score_b,
                c.difference
            ));
        }
        if let (Some(ca), Some(cb), Some(diff)) = (
            comparison.composite_a,
            comparison.composite_b,
            comparison.composite_difference,
        ) {
            lines.push(format!("| **Composite** | {:.2} | {:.2} | {:+.2} |", ca, cb, diff));
        }
        lines.push(String::new());

        lines.push("### Winner by Criterion".to_string());
        lines.push(String::new());
        for c in &comparison.criteria {
            let winner = match c.winner {
                Winner::A => a.as_str(),
                Winner::B => b.as_str(),
                Winner::Tie => "tie",
            };
            lines.push(format!("- **{}:** {}", c.criterion.label(), winner));
        }
        lines.push(String::new());
        lines.push(format!(
            "**Summary:** {} ({}) | {} ({}) | ties ({})",
            a, comparison.wins_a, b, comparison.wins_b, comparison.ties
        ));
        lines.push(String::new());
    }

    lines.push("## Chunk Analysis".to_string());
    lines.push(String::new());
    lines.push(format!("| Metric | {} | {} |", a, b));
    lines.push("|--------|---|---|".to_string());
    lines.push(format!(
        "| Chunks sent | {} | {} |",
        comparison.chunks_a.count, comparison.chunks_b.count
    ));
    lines.push(format!(
        "| Total characters | {} | {} |",
        comparison.chunks_a.total_chars, comparison.chunks_b.total_chars
    ));
    lines.push(format!(
        "| Average chars/chunk | {} | {} |",
        comparison.chunks_a.avg_chars, comparison.chunks_b.avg_chars
    ));
    lines.push(String::new());
    lines.push(format!(
        "**Character difference:** {:+} ({})",
        comparison.char_difference,
        if comparison.consistent_chunks {
            "consistent chunk count"
        } else {
            "inconsistent chunk count"
        }
    ));
    lines.push(String::new());
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
