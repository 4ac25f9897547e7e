//! Benchmark questions and the file they are loaded from.
//!
//! Supported formats (chosen by extension, JSON otherwise):
//! - JSON
//! - YAML (`.yaml` / `.yml`)
//!
//! ```json
//! {
//!   "dataset": "direito_constitucional",
//!   "questions": [
//!     {"id": 1, "category": "principles", "question": "What is due process?"}
//!   ],
//!   "weights": {
//!     "factual_consistency": 25, "instruction_following": 15,
//!     "domain_knowledge": 20, "context_precision": 20, "context_coverage": 20
//!   }
//! }
//! ```

use crate::error::{EvalError, Result};
use crate::scoring::CriterionWeights;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A single benchmark question. Never mutated after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Unique, stable across runs.
    pub id: u32,
    pub category: String,
    /// Prompt sent to both pipelines.
    #[serde(alias = "question")]
    pub text: String,
    /// Hint metadata; not used for scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_topics: Option<Vec<String>>,
}

impl Question {
    pub fn new(id: u32, category: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            category: category.into(),
            text: text.into(),
            expected_topics: None,
        }
    }
}

/// Ordered questions plus the criterion weights to score them with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    #[serde(default)]
    pub dataset: String,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub weights: CriterionWeights,
}

impl QuestionSet {
    pub fn new(dataset: impl Into<String>, questions: Vec<Question>) -> Result<Self> {
        let set = Self {
            dataset: dataset.into(),
            questions,
            weights: CriterionWeights::standard(),
        };
        set.validate()?;
        Ok(set)
    }

    /// Load and validate a question file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;

        let set: QuestionSet = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                EvalError::Configuration(format!(
                    "Failed to parse question file '{}': {}",
                    path.display(),
                    e
                ))
            })?,
            _ => serde_json::from_str(&content).map_err(|e| {
                EvalError::Configuration(format!(
                    "Failed to parse question file '{}': {}",
                    path.display(),
                    e
                ))
            })?,
        };

        set.validate()?;
        Ok(set)
    }

    /// Ids must be unique, texts non-empty, weights sum to 100.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for question in &self.questions {
            if !ids.insert(question.id) {
                return Err(EvalError::Configuration(format!(
                    "Duplicate question id {}",
                    question.id
                )));
            }
            if question.text.trim().is_empty() {
                return Err(EvalError::Configuration(format!(
                    "Question {} has no text",
                    question.id
                )));
            }
        }
        self.weights.validate()
    }

    /// Look up a question, failing before any remote call if it is unknown.
    pub fn find(&self, id: u32) -> Result<&Question> {
        self.questions
            .iter()
            .find(|q| q.id == id)
            .ok_or_else(|| EvalError::Configuration(format!("Question {} not found", id)))
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_JSON: &str = r#"{
        "dataset": "direito_constitucional",
        "questions": [
            {"id": 1, "category": "principles", "question": "What is due process?"},
            {"id": 2, "category": "rights", "text": "What does habeas corpus protect?",
             "expected_topics": ["liberty", "detention"]}
        ]
    }"#;

    #[test]
    fn test_load_json_with_question_alias() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("questions.json");
        fs::write(&path, SAMPLE_JSON).unwrap();

        let set = QuestionSet::load(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.dataset, "direito_constitucional");
        assert_eq!(set.find(1).unwrap().text, "What is due process?");
        assert_eq!(
            set.find(2).unwrap().expected_topics.as_deref(),
            Some(&["liberty".to_string(), "detention".to_string()][..])
        );
        assert_eq!(set.weights, CriterionWeights::standard());
    }

    #[test]
    fn test_load_yaml_with_custom_weights() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("questions.yaml");
        fs::write(
            &path,
            r#"
dataset: sample
questions:
  - id: 7
    category: general
    question: What is due process?
weights:
  factual_consistency: 40
  instruction_following: 15
  domain_knowledge: 15
  context_precision: 15
  context_recall: 15
"#,
        )
        .unwrap();

        let set = QuestionSet::load(&path).unwrap();
        assert_eq!(set.weights.factual_consistency, 40);
        assert_eq!(set.weights.context_coverage, 15);
    }

    #[test]
    fn test_unknown_id_is_configuration_error() {
        let set = QuestionSet::new("t", vec![Question::new(1, "c", "q?")]).unwrap();
        assert!(matches!(set.find(99), Err(EvalError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = QuestionSet::new(
            "t",
            vec![Question::new(1, "c", "a?"), Question::new(1, "c", "b?")],
        );
        assert!(matches!(result, Err(EvalError::Configuration(_))));
    }

    #[test]
    fn test_bad_weights_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("questions.json");
        fs::write(
            &path,
            r#"{"questions": [{"id": 1, "category": "c", "text": "q?"}],
                "weights": {"factual_consistency": 50, "instruction_following": 50,
                            "domain_knowledge": 50, "context_precision": 0, "context_coverage": 0}}"#,
        )
        .unwrap();

        assert!(matches!(
            QuestionSet::load(&path),
            Err(EvalError::Configuration(_))
        ));
    }

    #[test]
    fn test_huge_weights_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("questions.json");
        fs::write(
            &path,
            r#"{"questions": [{"id": 1, "category": "c", "text": "q?"}],
                "weights": {"factual_consistency": 4294967295, "instruction_following": 101,
                            "domain_knowledge": 0, "context_precision": 0, "context_coverage": 0}}"#,
        )
        .unwrap();

        assert!(matches!(
            QuestionSet::load(&path),
            Err(EvalError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = QuestionSet::load(Path::new("/nonexistent/questions.json"));
        assert!(matches!(result, Err(EvalError::Io { .. })));
    }
}
