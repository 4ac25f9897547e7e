//! Error types for the evaluation engine.

use crate::pipeline::PipelineStage;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while evaluating pipelines.
#[derive(Error, Debug)]
pub enum EvalError {
    /// A remote call failed in a way that may succeed if retried
    /// (rate limit, timeout, 5xx).
    #[error("Transient remote error: {0}")]
    TransientRemote(String),

    /// A remote call failed in a way retrying cannot fix
    /// (bad credentials, malformed request).
    #[error("Permanent remote error: {0}")]
    PermanentRemote(String),

    /// Every attempt allowed by the retry policy failed.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<EvalError>,
    },

    /// A pipeline adapter failed at a given stage.
    #[error("Pipeline {stage} stage failed: {cause}")]
    Pipeline { stage: PipelineStage, cause: String },

    /// The judge model answered with something that is not a verdict.
    #[error("Failed to parse judge response: {0}")]
    JudgeParse(String),

    /// The judge's scores do not form a valid verdict.
    #[error("Invalid verdict: {0}")]
    InvalidVerdict(String),

    /// Fatal pre-flight problem (unknown question id, missing settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Serializable tag for an [`EvalError`], stored in degraded record slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransientRemote,
    PermanentRemote,
    RetryExhausted,
    Pipeline,
    JudgeParse,
    InvalidVerdict,
    Configuration,
    Io,
    Serialization,
}

impl EvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, EvalError::TransientRemote(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::TransientRemote(_) => ErrorKind::TransientRemote,
            EvalError::PermanentRemote(_) => ErrorKind::PermanentRemote,
            EvalError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            EvalError::Pipeline { .. } => ErrorKind::Pipeline,
            EvalError::JudgeParse(_) => ErrorKind::JudgeParse,
            EvalError::InvalidVerdict(_) => ErrorKind::InvalidVerdict,
            EvalError::Configuration(_) => ErrorKind::Configuration,
            EvalError::Io { .. } => ErrorKind::Io,
            EvalError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Classify a non-success HTTP response.
    ///
    /// 408, 429 and 5xx are transient. Providers sometimes report overload
    /// with a 4xx body, so an "overloaded" message is transient as well.
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = format!("HTTP {}: {}", status.as_u16(), message.into());
        let overloaded = message.to_lowercase().contains("overloaded");

        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
            || overloaded
        {
            EvalError::TransientRemote(message)
        } else {
            EvalError::PermanentRemote(message)
        }
    }
}

impl From<reqwest::Error> for EvalError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return EvalError::from_status(status, err.to_string());
        }
        if err.is_timeout() || err.is_connect() {
            EvalError::TransientRemote(err.to_string())
        } else {
            EvalError::PermanentRemote(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}
