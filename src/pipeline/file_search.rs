//! Gemini File Search pipeline.
//!
//! Retrieval and generation happen inside one `generateContent` call with
//! the `fileSearch` tool attached; the retrieved chunks come back in the
//! candidate's grounding metadata.

use super::{Chunk, PipelineAdapter, PipelineError, PipelineResult};
use crate::config::{FileSearchPipelineConfig, LlmConfig, ProviderKind};
use crate::error::Result;
use crate::llm::{
    Content, FileSearchTool, GeminiClient, GenerateContentRequest, GenerateContentResponse, Tool,
};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::time::Instant;
use tracing::info;

pub struct FileSearchPipeline {
    name: String,
    client: GeminiClient,
    store_name: String,
    retry: RetryPolicy,
}

impl FileSearchPipeline {
    pub fn new(
        name: impl Into<String>,
        client: GeminiClient,
        store_name: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            store_name: store_name.into(),
            retry,
        }
    }

    pub fn from_config(config: &FileSearchPipelineConfig, retry: RetryPolicy) -> Result<Self> {
        let llm = LlmConfig {
            provider: ProviderKind::Gemini,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            json_mode: false,
            timeout_secs: config.timeout_secs,
            ..LlmConfig::default()
        };
        Ok(Self::new(
            config.name.clone(),
            GeminiClient::new(llm)?,
            config.store_name.clone(),
            retry,
        ))
    }

    fn build_request(&self, question: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(question)],
            system_instruction: None,
            generation_config: Some(self.client.generation_config()),
            tools: vec![Tool {
                file_search: FileSearchTool {
                    file_search_store_names: vec![self.store_name.clone()],
                },
            }],
        }
    }

    /// Chunks from the grounding metadata, skipping entries without text.
    pub fn grounded_chunks(response: &GenerateContentResponse) -> Vec<Chunk> {
        let Some(grounding) = response.grounding() else {
            return Vec::new();
        };

        grounding
            .grounding_chunks
            .iter()
            .filter_map(|g| g.retrieved_context.as_ref())
            .filter_map(|ctx| {
                let text = ctx.text.as_deref()?.trim();
                if text.is_empty() {
                    return None;
                }
                let source = ctx.title.clone().or_else(|| ctx.uri.clone()).unwrap_or_default();
                Some(Chunk::new(text, source, None))
            })
            .collect()
    }
}

#[async_trait]
impl PipelineAdapter for FileSearchPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    /// Failures are reported as generation-stage: the single request covers
    /// both steps and the API does not say which one failed.
    async fn retrieve_and_generate(
        &self,
        question: &str,
    ) -> std::result::Result<PipelineResult, PipelineError> {
        let start = Instant::now();
        let request = self.build_request(question);

        let response = self
            .retry
            .execute("file_search", || self.client.generate_content(&request))
            .await
            .map_err(|e| {
                PipelineError::generation(e, Vec::new(), start.elapsed().as_millis() as u64)
            })?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let chunks = Self::grounded_chunks(&response);

        info!(
            pipeline = %self.name,
            chunks = chunks.len(),
            latency_ms,
            "pipeline answered"
        );

        Ok(PipelineResult {
            pipeline_name: self.name.clone(),
            answer_text: response.text().trim().to_string(),
            retrieved_chunks: chunks,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> FileSearchPipeline {
        FileSearchPipeline::from_config(
            &FileSearchPipelineConfig {
                api_key: "key".to_string(),
                store_name: "fileSearchStores/direito-123".to_string(),
                ..Default::default()
            },
            RetryPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_request_attaches_store() {
        let body = serde_json::to_value(pipeline().build_request("What is due process?")).unwrap();
        assert_eq!(
            body["tools"][0]["fileSearch"]["fileSearchStoreNames"][0],
            "fileSearchStores/direito-123"
        );
        assert!(body["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_grounded_chunks_skip_empty_text() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "answer"}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"retrievedContext": {"title": "cf88.pdf", "text": "Art. 5, LIV"}},
                        {"retrievedContext": {"uri": "gs://docs/lei.pdf", "text": "Lei 9.784"}},
                        {"retrievedContext": {"title": "empty.pdf", "text": "   "}},
                        {}
                    ]
                }
            }]
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(body).unwrap();

        let chunks = FileSearchPipeline::grounded_chunks(&response);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_id, "cf88.pdf");
        assert_eq!(chunks[1].source_id, "gs://docs/lei.pdf");
        assert!(chunks.iter().all(|c| c.score.is_none()));
    }

    #[test]
    fn test_no_grounding_is_retrieval_miss() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"content": {"parts": [{"text": "x"}]}}]}"#)
                .unwrap();
        assert!(FileSearchPipeline::grounded_chunks(&response).is_empty());
    }
}
