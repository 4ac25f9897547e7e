//! Console views of questions and evaluation records.

use crate::evaluation::{EvaluationRecord, SlotOutcome};
use crate::question::QuestionSet;
use crate::report::{Comparison, Winner};
use std::fmt;

const RULE_WIDTH: usize = 80;
const PREVIEW_CHARS: usize = 200;

fn rule(f: &mut fmt::Formatter<'_>, ch: char) -> fmt::Result {
    writeln!(f, "{}", ch.to_string().repeat(RULE_WIDTH))
}

/// Numbered list of the available questions.
pub struct QuestionList<'a>(pub &'a QuestionSet);

impl fmt::Display for QuestionList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = self.0;
        if set.dataset.is_empty() {
            writeln!(f, "{} questions", set.len())?;
        } else {
            writeln!(f, "{} ({} questions)", set.dataset, set.len())?;
        }
        rule(f, '-')?;
        for q in &set.questions {
            writeln!(f, "{:>4}  [{}] {}", q.id, q.category, q.text)?;
        }
        Ok(())
    }
}

/// Full console summary of one record: answers, verdicts, comparison.
pub struct RecordSummary<'a> {
    pub record: &'a EvaluationRecord,
    pub comparison: Option<&'a Comparison>,
}

impl<'a> RecordSummary<'a> {
    pub fn new(record: &'a EvaluationRecord, comparison: Option<&'a Comparison>) -> Self {
        Self { record, comparison }
    }
}

impl fmt::Display for RecordSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let question = &self.record.question;
        rule(f, '=')?;
        writeln!(f, "QUESTION {}", question.id)?;
        rule(f, '=')?;
        writeln!(f, "Category: {}", question.category)?;
        writeln!(f, "Question: {}", question.text)?;
        rule(f, '=')?;

        for (name, slot) in self.record.slots() {
            writeln!(f)?;
            writeln!(f, "{}", name.to_uppercase())?;
            rule(f, '-')?;
            write_slot(f, slot)?;
        }

        if let Some(comparison) = self.comparison {
            write_comparison(f, comparison)?;
        }
        Ok(())
    }
}

fn write_slot(f: &mut fmt::Formatter<'_>, slot: &SlotOutcome) -> fmt::Result {
    if let SlotOutcome::PipelineFailed {
        stage,
        partial_chunks,
        failure,
        ..
    } = slot
    {
        writeln!(f, "FAILED at {} stage: {}", stage, failure.message)?;
        return writeln!(f, "Chunks retrieved before failure: {}", partial_chunks.len());
    }

    if let Some(result) = slot.result() {
        writeln!(
            f,
            "Answered in {:.2}s, {} chunks retrieved",
            result.latency_ms as f64 / 1000.0,
            result.retrieved_chunks.len()
        )?;
        writeln!(f)?;
        writeln!(f, "Answer:")?;
        writeln!(f, "{}", result.answer_text.trim())?;
        writeln!(f)?;
        for (i, chunk) in result.retrieved_chunks.iter().enumerate().take(5) {
            let preview: String = chunk
                .text
                .chars()
                .take(PREVIEW_CHARS)
                .map(|c| if c == '\n' { ' ' } else { c })
                .collect();
            writeln!(f, "  Chunk {} ({} chars): {}", i + 1, chunk.char_len(), preview)?;
        }
    }

    match slot {
        SlotOutcome::Scored { verdict, .. } => {
            writeln!(f)?;
            writeln!(f, "Judge verdict (composite {:.2}):", verdict.composite_score)?;
            for entry in &verdict.scores {
                writeln!(
                    f,
                    "  - {}: {}/5 - {}",
                    entry.criterion, entry.score, entry.justification
                )?;
            }
            if let Some(overall) = &verdict.overall_assessment {
                writeln!(f, "  Overall: {}", overall)?;
            }
        }
        SlotOutcome::JudgeFailed { failure, .. } => {
            writeln!(f, "Judge failed: {}", failure.message)?;
        }
        _ => {}
    }
    Ok(())
}

fn write_comparison(f: &mut fmt::Formatter<'_>, c: &Comparison) -> fmt::Result {
    writeln!(f)?;
    rule(f, '=')?;
    writeln!(f, "SCORE COMPARISON")?;
    rule(f, '=')?;

    if c.criteria.is_empty() {
        writeln!(f, "(both slots need a verdict to compare scores)")?;
    } else {
        writeln!(
            f,
            "{:<25} {:<16} {:<16} {}",
            "Criterion", c.pipeline_a, c.pipeline_b, "Difference"
        )?;
        rule(f, '-')?;
        for row in &c.criteria {
            let marker = match row.winner {
                Winner::A => "<",
                Winner::B => ">",
                Winner::Tie => "=",
            };
            writeln!(
                f,
                "{:<25} {:<16} {:<16} {:+} {}",
                row.criterion.id(),
                format!("{}/5", row.score_a),
                format!("{}/5", row.score_b),
                row.difference,
                marker
            )?;
        }
        if let (Some(a), Some(b)) = (c.composite_a, c.composite_b) {
            writeln!(
                f,
                "{:<25} {:<16} {:<16} {:+.2}",
                "composite",
                format!("{:.2}", a),
                format!("{:.2}", b),
                b - a
            )?;
        }
        writeln!(
            f,
            "Wins: {} {} | {} {} | ties {}",
            c.pipeline_a, c.wins_a, c.pipeline_b, c.wins_b, c.ties
        )?;
    }

    writeln!(f)?;
    writeln!(
        f,
        "Chunks sent to judge: {} {} ({} chars, avg {}) | {} {} ({} chars, avg {})",
        c.pipeline_a,
        c.chunks_a.count,
        c.chunks_a.total_chars,
        c.chunks_a.avg_chars,
        c.pipeline_b,
        c.chunks_b.count,
        c.chunks_b.total_chars,
        c.chunks_b.avg_chars
    )?;
    writeln!(
        f,
        "Difference: {:+} chunks, {:+} chars ({})",
        c.chunk_count_difference,
        c.char_difference,
        if c.consistent_chunks {
            "consistent"
        } else {
            "inconsistent"
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::evaluation::{Failure, UnscoredReason};
    use crate::pipeline::{PipelineResult, PipelineStage};
    use crate::question::Question;
    use crate::test_support::sample_chunks;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record() -> EvaluationRecord {
        let mut results = BTreeMap::new();
        results.insert(
            "manual_rag".to_string(),
            SlotOutcome::PipelineFailed {
                stage: PipelineStage::Retrieval,
                partial_chunks: Vec::new(),
                latency_ms: 15,
                failure: Failure {
                    kind: ErrorKind::PermanentRemote,
                    message: "HTTP 401: bad token".to_string(),
                },
            },
        );
        results.insert(
            "file_search_rag".to_string(),
            SlotOutcome::Unscored {
                result: PipelineResult {
                    pipeline_name: "file_search_rag".to_string(),
                    answer_text: "Due process is a constitutional guarantee.".to_string(),
                    retrieved_chunks: sample_chunks(),
                    latency_ms: 2340,
                },
                reason: UnscoredReason::JudgeDisabled,
            },
        );
        EvaluationRecord {
            question: Question::new(1, "principles", "What is due process?"),
            pipelines: vec!["manual_rag".to_string(), "file_search_rag".to_string()],
            results,
            created_at: Utc::now(),
            judge_enabled: false,
            judge_model: None,
        }
    }

    #[test]
    fn test_question_list() {
        let set = QuestionSet::new(
            "direito",
            vec![
                Question::new(1, "principles", "What is due process?"),
                Question::new(12, "rights", "What does habeas corpus protect?"),
            ],
        )
        .unwrap();

        let text = QuestionList(&set).to_string();
        assert!(text.starts_with("direito (2 questions)"));
        assert!(text.contains("  12  [rights] What does habeas corpus protect?"));
    }

    #[test]
    fn test_summary_shows_failure_and_answer_in_slot_order() {
        let rec = record();
        let comparison = Comparison::from_record(&rec, 5);
        let text = RecordSummary::new(&rec, comparison.as_ref()).to_string();

        let manual = text.find("MANUAL_RAG").unwrap();
        let file_search = text.find("FILE_SEARCH_RAG").unwrap();
        assert!(manual < file_search);
        assert!(text.contains("FAILED at retrieval stage: HTTP 401: bad token"));
        assert!(text.contains("Answered in 2.34s, 2 chunks retrieved"));
        assert!(text.contains("(both slots need a verdict to compare scores)"));
        assert!(text.contains("Difference: +2 chunks"));
    }
}
