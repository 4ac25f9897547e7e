//! Judge criteria, weights, and composite scoring.
//!
//! Aggregation is pure: the composite score is always recomputed here from
//! the five per-criterion scores and never taken from the judge's output.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Lowest accepted criterion score.
pub const MIN_SCORE: i64 = 1;
/// Highest accepted criterion score.
pub const MAX_SCORE: i64 = 5;

/// One of the five fixed scoring axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    FactualConsistency,
    InstructionFollowing,
    DomainKnowledge,
    ContextPrecision,
    #[serde(alias = "context_recall")]
    ContextCoverage,
}

impl Criterion {
    /// All criteria, in report order.
    pub const ALL: [Criterion; 5] = [
        Criterion::FactualConsistency,
        Criterion::InstructionFollowing,
        Criterion::DomainKnowledge,
        Criterion::ContextPrecision,
        Criterion::ContextCoverage,
    ];

    /// Wire identifier used in judge responses.
    pub fn id(self) -> &'static str {
        match self {
            Criterion::FactualConsistency => "factual_consistency",
            Criterion::InstructionFollowing => "instruction_following",
            Criterion::DomainKnowledge => "domain_knowledge",
            Criterion::ContextPrecision => "context_precision",
            Criterion::ContextCoverage => "context_coverage",
        }
    }

    /// Human-readable name for reports.
    pub fn label(self) -> &'static str {
        match self {
            Criterion::FactualConsistency => "Factual consistency",
            Criterion::InstructionFollowing => "Instruction following",
            Criterion::DomainKnowledge => "Domain knowledge",
            Criterion::ContextPrecision => "Context precision",
            Criterion::ContextCoverage => "Context coverage",
        }
    }

    /// Parse a wire identifier. `context_recall` is the older name for
    /// context coverage.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "context_recall" => Some(Criterion::ContextCoverage),
            _ => Self::ALL.into_iter().find(|c| c.id() == id),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Criterion weights in integer percentage points.
///
/// Integer points keep the sum exactly 100, so the composite is computed
/// without accumulated float error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionWeights {
    pub factual_consistency: u32,
    pub instruction_following: u32,
    pub domain_knowledge: u32,
    pub context_precision: u32,
    #[serde(alias = "context_recall")]
    pub context_coverage: u32,
}

impl Default for CriterionWeights {
    fn default() -> Self {
        Self::standard()
    }
}

impl CriterionWeights {
    /// 0.25 / 0.15 / 0.20 / 0.20 / 0.20.
    pub const fn standard() -> Self {
        Self {
            factual_consistency: 25,
            instruction_following: 15,
            domain_knowledge: 20,
            context_precision: 20,
            context_coverage: 20,
        }
    }

    /// Weight in percentage points.
    pub fn points(&self, criterion: Criterion) -> u32 {
        match criterion {
            Criterion::FactualConsistency => self.factual_consistency,
            Criterion::InstructionFollowing => self.instruction_following,
            Criterion::DomainKnowledge => self.domain_knowledge,
            Criterion::ContextPrecision => self.context_precision,
            Criterion::ContextCoverage => self.context_coverage,
        }
    }

    /// Weight as a fraction of 1.
    pub fn fraction(&self, criterion: Criterion) -> f64 {
        f64::from(self.points(criterion)) / 100.0
    }

    pub fn total_points(&self) -> u64 {
        Criterion::ALL
            .iter()
            .map(|c| u64::from(self.points(*c)))
            .sum()
    }

    /// Each weight is at most 100 points and together they sum to exactly 100.
    pub fn validate(&self) -> Result<()> {
        if let Some(c) = Criterion::ALL.iter().find(|c| self.points(**c) > 100) {
            return Err(EvalError::Configuration(format!(
                "Weight for {} is {} points, above 100",
                c,
                self.points(*c)
            )));
        }

        let total = self.total_points();
        if total != 100 {
            return Err(EvalError::Configuration(format!(
                "Criterion weights must sum to 100 points, got {}",
                total
            )));
        }
        Ok(())
    }
}

/// One judge verdict on one criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: Criterion,
    pub score: i64,
    pub justification: String,
}

impl CriterionScore {
    pub fn new(criterion: Criterion, score: i64, justification: impl Into<String>) -> Self {
        Self {
            criterion,
            score,
            justification: justification.into(),
        }
    }
}

/// Where a verdict came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeAudit {
    pub model: String,
    pub temperature: f32,
    /// SHA-256 of the exact prompt sent to the judge, hex encoded.
    pub prompt_sha256: String,
}

/// Five validated criterion scores plus their weighted composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// One entry per criterion, in [`Criterion::ALL`] order.
    pub scores: Vec<CriterionScore>,
    pub composite_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_assessment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<JudgeAudit>,
}

impl JudgeVerdict {
    pub fn score(&self, criterion: Criterion) -> Option<i64> {
        self.scores
            .iter()
            .find(|s| s.criterion == criterion)
            .map(|s| s.score)
    }

    pub fn entry(&self, criterion: Criterion) -> Option<&CriterionScore> {
        self.scores.iter().find(|s| s.criterion == criterion)
    }
}

/// Validates criterion scores and computes composites with fixed weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringAggregator {
    weights: CriterionWeights,
}

impl ScoringAggregator {
    pub fn new(weights: CriterionWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &CriterionWeights {
        &self.weights
    }

    /// Build a verdict from exactly five distinct criterion scores in
    /// `[MIN_SCORE, MAX_SCORE]`.
    ///
    /// Out-of-range scores are rejected, never clamped.
    pub fn aggregate(&self, scores: Vec<CriterionScore>) -> Result<JudgeVerdict> {
        if scores.len() != Criterion::ALL.len() {
            let present: BTreeSet<Criterion> = scores.iter().map(|s| s.criterion).collect();
            let missing: Vec<&str> = Criterion::ALL
                .iter()
                .filter(|c| !present.contains(c))
                .map(|c| c.id())
                .collect();
            return Err(EvalError::InvalidVerdict(format!(
                "expected {} criterion scores, got {} (missing: [{}])",
                Criterion::ALL.len(),
                scores.len(),
                missing.join(", ")
            )));
        }

        let mut seen = BTreeSet::new();
        for entry in &scores {
            if !seen.insert(entry.criterion) {
                return Err(EvalError::InvalidVerdict(format!(
                    "duplicate score for {}",
                    entry.criterion
                )));
            }
            if !(MIN_SCORE..=MAX_SCORE).contains(&entry.score) {
                return Err(EvalError::InvalidVerdict(format!(
                    "{} score {} is outside {}..={}",
                    entry.criterion, entry.score, MIN_SCORE, MAX_SCORE
                )));
            }
        }

        let mut scores = scores;
        scores.sort_by_key(|s| s.criterion);

        let weighted_points: i64 = scores
            .iter()
            .map(|s| s.score * i64::from(self.weights.points(s.criterion)))
            .sum();

        Ok(JudgeVerdict {
            scores,
            composite_score: weighted_points as f64 / 100.0,
            overall_assessment: None,
            audit: None,
        })
    }
}

/// Aggregate with the standard weights.
pub fn aggregate(scores: Vec<CriterionScore>) -> Result<JudgeVerdict> {
    ScoringAggregator::default().aggregate(scores)
}
