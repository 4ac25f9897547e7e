//! LLM integration module.
//!
//! Provides the [`CompletionProvider`] capability used by the judge and by
//! answer generation, one concrete client per provider, and the prompts.

mod client;
mod gemini;
mod prompts;

pub use client::{Message, OpenAiClient, Role};
pub use gemini::{
    Content, FileSearchTool, GeminiClient, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, GroundingChunk, GroundingMetadata, Part, RetrievedContext, Tool,
};
pub use prompts::Prompts;

use crate::config::{LlmConfig, ProviderKind};
use crate::error::{EvalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Send a prompt, get text back.
///
/// Implementations make exactly one remote call per `complete`; retries are
/// the caller's business.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Model identifier, recorded in verdicts.
    fn model(&self) -> &str;

    fn temperature(&self) -> f32;

    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String>;

    /// Test connectivity to the API.
    async fn test_connection(&self) -> Result<()> {
        let response = self
            .complete(None, "Reply with the JSON object {\"status\": \"hello\"} and nothing else.")
            .await?;

        if response.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(EvalError::PermanentRemote(format!(
                "Unexpected response: {}",
                response
            )))
        }
    }
}

/// Build the provider selected by `config.provider`.
pub fn provider_from_config(config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>> {
    Ok(match config.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiClient::new(config.clone())?),
        ProviderKind::Gemini => Arc::new(GeminiClient::new(config.clone())?),
    })
}

/// HTTP client whose requests give up after `timeout`.
///
/// An elapsed timeout surfaces as a transient error, so the retry policy
/// gets another go at it.
pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EvalError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_selection_follows_config() {
        let config = LlmConfig {
            provider: ProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            ..Default::default()
        };
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.model(), "gpt-4o-mini");
        assert!((provider.temperature() - 0.2).abs() < f32::EPSILON);

        let provider = provider_from_config(&LlmConfig::default()).unwrap();
        assert_eq!(provider.model(), "gemini-2.5-flash");
    }
}
