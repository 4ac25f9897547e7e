//! Configuration for the evaluator.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Which completion API a model sits behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any OpenAI-compatible `/v1/chat/completions` endpoint.
    OpenAi,
    /// Google Gemini `generateContent`.
    #[default]
    Gemini,
}

impl ProviderKind {
    pub fn default_api_base(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Gemini => write!(f, "gemini"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(EvalError::Configuration(format!(
                "Unknown provider '{}', expected 'openai' or 'gemini'",
                other
            ))),
        }
    }
}

/// LLM configuration, used for the judge and for answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,

    /// Base URL for the API. Empty means the provider's public endpoint.
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gemini-2.5-flash", "gpt-4o")
    pub model: String,

    /// Maximum tokens for response
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Ask the provider for a JSON-only response.
    pub json_mode: bool,

    /// Per-request timeout, from connect to the last body byte.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_base: String::new(),
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            max_tokens: 2048,
            temperature: 0.0,
            json_mode: true,
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    /// API base with the provider default filled in and no trailing slash.
    pub fn resolved_api_base(&self) -> &str {
        let base = if self.api_base.is_empty() {
            self.provider.default_api_base()
        } else {
            self.api_base.as_str()
        };
        base.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry settings for every remote call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5_000,
            max_delay_ms: 60_000,
            jitter: 0.1,
        }
    }
}

/// Retrieve-then-generate pipeline backed by a retrieval service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualPipelineConfig {
    pub name: String,
    /// Endpoint accepting `{collection, query, n_results}`.
    pub retrieval_url: String,
    pub collection: String,
    pub n_results: usize,
    /// Per-request timeout for the retrieval service.
    pub retrieval_timeout_secs: u64,
    pub generation: LlmConfig,
}

impl Default for ManualPipelineConfig {
    fn default() -> Self {
        Self {
            name: "manual_rag".to_string(),
            retrieval_url: String::new(),
            collection: String::new(),
            n_results: 5,
            retrieval_timeout_secs: 30,
            generation: LlmConfig {
                json_mode: false,
                ..LlmConfig::default()
            },
        }
    }
}

/// Gemini File Search pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSearchPipelineConfig {
    pub name: String,
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    /// Full store resource name, e.g. `fileSearchStores/abc123`.
    pub store_name: String,
    pub timeout_secs: u64,
}

impl Default for FileSearchPipelineConfig {
    fn default() -> Self {
        Self {
            name: "file_search_rag".to_string(),
            api_base: String::new(),
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            store_name: String::new(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelinesConfig {
    pub manual: ManualPipelineConfig,
    pub file_search: FileSearchPipelineConfig,
}

/// How a single question evaluation is scheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Run both pipeline slots at the same time.
    pub concurrent: bool,
    /// Pause before the second slot when running sequentially.
    pub pause_between_ms: u64,
    /// Chunks included in the judge prompt.
    pub max_context_chunks: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            concurrent: false,
            pause_between_ms: 3_000,
            max_context_chunks: 5,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub judge: LlmConfig,
    pub retry: RetryConfig,
    pub pipelines: PipelinesConfig,
    pub evaluation: EvaluationConfig,
    /// Question set file (JSON or YAML).
    pub questions_path: PathBuf,
    /// Where reports are written.
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            judge: LlmConfig::default(),
            retry: RetryConfig::default(),
            pipelines: PipelinesConfig::default(),
            evaluation: EvaluationConfig::default(),
            questions_path: PathBuf::from("questions.json"),
            output_dir: PathBuf::from("evaluation_results"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (JUDGE_API_KEY, JUDGE_MODEL, ...)
    /// 2. Config file (explicit path, or ~/.config/rag-judge/config.yaml)
    /// 3. Default values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(default_path) if default_path.exists() => {
                    Self::load_from_file(&default_path)?
                }
                _ => Config::default(),
            },
        };

        config.apply_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;

        serde_yaml::from_str(&content).map_err(|e| {
            EvalError::Configuration(format!("Failed to parse config file: {}", e))
        })
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(provider) = lookup("JUDGE_PROVIDER") {
            self.judge.provider = provider.parse()?;
        }
        if let Some(api_base) = lookup("JUDGE_API_BASE") {
            self.judge.api_base = api_base;
        }
        if let Some(api_key) = lookup("JUDGE_API_KEY") {
            self.judge.api_key = api_key;
        }
        if let Some(model) = lookup("JUDGE_MODEL") {
            self.judge.model = model;
        }
        parse_override(&lookup, "JUDGE_MAX_TOKENS", &mut self.judge.max_tokens);
        parse_override(&lookup, "JUDGE_TEMPERATURE", &mut self.judge.temperature);

        if let Some(url) = lookup("RETRIEVAL_URL") {
            self.pipelines.manual.retrieval_url = url;
        }
        if let Some(store) = lookup("FILE_SEARCH_STORE") {
            self.pipelines.file_search.store_name = store;
        }

        let google_key = lookup("GOOGLE_API_KEY").or_else(|| lookup("GEMINI_API_KEY"));
        if let Some(key) = google_key {
            if self.pipelines.file_search.api_key.is_empty() {
                self.pipelines.file_search.api_key = key.clone();
            }
            let generation = &mut self.pipelines.manual.generation;
            if generation.provider == ProviderKind::Gemini && generation.api_key.is_empty() {
                generation.api_key = key.clone();
            }
            if self.judge.provider == ProviderKind::Gemini && self.judge.api_key.is_empty() {
                self.judge.api_key = key;
            }
        }

        Ok(())
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-judge")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate everything needed for a judged evaluation.
    pub fn validate(&self) -> Result<()> {
        self.validate_pipelines()?;
        self.validate_judge()
    }

    /// Validate the judge settings.
    pub fn validate_judge(&self) -> Result<()> {
        if self.judge.api_key.is_empty() {
            return Err(EvalError::Configuration(
                "Judge API key is required. Set JUDGE_API_KEY environment variable or add to config file.".to_string(),
            ));
        }

        if self.judge.timeout_secs == 0 {
            return Err(EvalError::Configuration(
                "judge.timeout_secs must be at least one second".to_string(),
            ));
        }

        if self.judge.model.is_empty() {
            return Err(EvalError::Configuration(
                "Judge model is required. Set JUDGE_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Validate pipeline and retry settings.
    pub fn validate_pipelines(&self) -> Result<()> {
        let manual = &self.pipelines.manual;
        let file_search = &self.pipelines.file_search;

        if manual.retrieval_url.is_empty() {
            return Err(EvalError::Configuration(
                "Retrieval URL is required. Set RETRIEVAL_URL environment variable or add pipelines.manual.retrieval_url to config file.".to_string(),
            ));
        }
        if manual.generation.api_key.is_empty() {
            return Err(EvalError::Configuration(
                "Generation API key for the manual pipeline is required.".to_string(),
            ));
        }
        if file_search.store_name.is_empty() {
            return Err(EvalError::Configuration(
                "File search store is required. Set FILE_SEARCH_STORE environment variable or add to config file.".to_string(),
            ));
        }
        if file_search.api_key.is_empty() {
            return Err(EvalError::Configuration(
                "File search API key is required. Set GOOGLE_API_KEY environment variable or add to config file.".to_string(),
            ));
        }
        if manual.name == file_search.name {
            return Err(EvalError::Configuration(format!(
                "Both pipelines are named '{}'",
                manual.name
            )));
        }
        if manual.retrieval_timeout_secs == 0
            || manual.generation.timeout_secs == 0
            || file_search.timeout_secs == 0
        {
            return Err(EvalError::Configuration(
                "Pipeline timeouts must be at least one second".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(EvalError::Configuration(
                "retry.jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_override<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T) {
    if let Some(value) = lookup(name) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(variable = name, value = %value, "ignoring unparsable override"),
        }
    }
}
