//! Retrieve-then-generate ("manual") RAG pipeline.
//!
//! Retrieval is delegated to a service that owns the vector index; the
//! retrieved chunks are folded into an augmentation prompt and answered by a
//! generation model. The two stages fail independently, so a generation
//! failure still reports the chunks that were retrieved.

use super::{Chunk, PipelineAdapter, PipelineError, PipelineResult};
use crate::config::ManualPipelineConfig;
use crate::error::{EvalError, Result};
use crate::llm::{CompletionProvider, Prompts, http_client, provider_from_config};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Source of chunks for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>>;
}

#[derive(Debug, Serialize)]
struct RetrievalRequest<'a> {
    collection: &'a str,
    query: &'a str,
    n_results: usize,
}

#[derive(Debug, Deserialize)]
struct RetrievalResponse {
    #[serde(default)]
    chunks: Vec<Chunk>,
}

/// Retriever backed by an HTTP service.
///
/// `POST {url}` with `{"collection", "query", "n_results"}`, answered by
/// `{"chunks": [{"text", "source_id", "score"}]}` in relevance order.
/// A request still unanswered after `timeout` fails as a transient error.
#[derive(Clone)]
pub struct HttpRetriever {
    client: Client,
    url: String,
    collection: String,
    n_results: usize,
}

impl HttpRetriever {
    pub fn new(
        url: impl Into<String>,
        collection: impl Into<String>,
        n_results: usize,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
            collection: collection.into(),
            n_results,
        })
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        let request = RetrievalRequest {
            collection: &self.collection,
            query,
            n_results: self.n_results,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(EvalError::from_status(status, body));
        }

        let parsed: RetrievalResponse = serde_json::from_str(&body)?;
        let mut chunks = parsed.chunks;
        chunks.truncate(self.n_results);
        Ok(chunks)
    }
}

/// Two-stage pipeline: retriever, then generation model.
pub struct RetrieveGeneratePipeline {
    name: String,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn CompletionProvider>,
    retry: RetryPolicy,
}

impl RetrieveGeneratePipeline {
    pub fn new(
        name: impl Into<String>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn CompletionProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            retriever,
            generator,
            retry,
        }
    }

    pub fn from_config(config: &ManualPipelineConfig, retry: RetryPolicy) -> Result<Self> {
        let retriever = HttpRetriever::new(
            config.retrieval_url.clone(),
            config.collection.clone(),
            config.n_results,
            Duration::from_secs(config.retrieval_timeout_secs),
        )?;
        Ok(Self::new(
            config.name.clone(),
            Arc::new(retriever),
            provider_from_config(&config.generation)?,
            retry,
        ))
    }

    /// Augmentation prompt: numbered chunks as context for the question.
    pub fn augment(question: &str, chunks: &[Chunk]) -> String {
        let context = if chunks.is_empty() {
            "(no context retrieved)".to_string()
        } else {
            chunks
                .iter()
                .enumerate()
                .map(|(i, c)| format!("[{}] {}", i + 1, c.text))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        Prompts::render(
            Prompts::rag_answer(),
            &[("question", question), ("context", context.as_str())],
        )
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[async_trait]
impl PipelineAdapter for RetrieveGeneratePipeline {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve_and_generate(
        &self,
        question: &str,
    ) -> std::result::Result<PipelineResult, PipelineError> {
        let start = Instant::now();

        let chunks = match self
            .retry
            .execute("retrieval", || self.retriever.retrieve(question))
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => return Err(PipelineError::retrieval(e, elapsed_ms(start))),
        };

        if chunks.is_empty() {
            warn!(pipeline = %self.name, "retrieval returned no chunks");
        }

        let prompt = Self::augment(question, &chunks);
        let answer = match self
            .retry
            .execute("generation", || self.generator.complete(None, &prompt))
            .await
        {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => return Err(PipelineError::generation(e, chunks, elapsed_ms(start))),
        };

        let latency_ms = elapsed_ms(start);
        info!(
            pipeline = %self.name,
            chunks = chunks.len(),
            latency_ms,
            "pipeline answered"
        );

        Ok(PipelineResult {
            pipeline_name: self.name.clone(),
            answer_text: answer,
            retrieved_chunks: chunks,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineStage;
    use crate::test_support::{StubProvider, sample_chunks};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    struct StubRetriever {
        chunks: Vec<Chunk>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Retriever for StubRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<Chunk>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(EvalError::PermanentRemote("HTTP 401: bad token".to_string()))
            } else {
                Ok(self.chunks.clone())
            }
        }
    }

    fn retriever(chunks: Vec<Chunk>, fail: bool) -> Arc<StubRetriever> {
        Arc::new(StubRetriever {
            chunks,
            fail,
            calls: AtomicUsize::new(0),
        })
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1)).with_jitter(0.0)
    }

    #[tokio::test]
    async fn test_answers_with_retrieved_context() {
        let generator = Arc::new(StubProvider::always("  Due process is a guarantee.  "));
        let pipeline = RetrieveGeneratePipeline::new(
            "manual_rag",
            retriever(sample_chunks(), false),
            generator.clone(),
            policy(),
        );

        let result = pipeline
            .retrieve_and_generate("What is due process?")
            .await
            .unwrap();

        assert_eq!(result.pipeline_name, "manual_rag");
        assert_eq!(result.answer_text, "Due process is a guarantee.");
        assert_eq!(result.retrieved_chunks.len(), 2);
        let prompt = generator.last_prompt().unwrap();
        assert!(prompt.contains("[1] Art. 5, LIV"));
        assert!(prompt.contains("What is due process?"));
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_tagged() {
        let generator = Arc::new(StubProvider::always("unused"));
        let stub = retriever(Vec::new(), true);
        let pipeline =
            RetrieveGeneratePipeline::new("manual_rag", stub.clone(), generator.clone(), policy());

        let err = pipeline.retrieve_and_generate("q?").await.unwrap_err();

        assert_eq!(err.stage, PipelineStage::Retrieval);
        assert!(err.retrieved_chunks.is_empty());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_chunks() {
        let generator = Arc::new(StubProvider::scripted(vec![
            Err(EvalError::TransientRemote("HTTP 503".to_string())),
            Err(EvalError::TransientRemote("HTTP 503".to_string())),
        ]));
        let pipeline = RetrieveGeneratePipeline::new(
            "manual_rag",
            retriever(sample_chunks(), false),
            generator.clone(),
            policy(),
        );

        let err = pipeline.retrieve_and_generate("q?").await.unwrap_err();

        assert_eq!(err.stage, PipelineStage::Generation);
        assert_eq!(err.retrieved_chunks.len(), 2);
        assert!(matches!(err.source, EvalError::RetryExhausted { attempts: 2, .. }));
        assert_eq!(generator.calls(), 2);
    }

    #[test]
    fn test_augment_without_chunks() {
        let prompt = RetrieveGeneratePipeline::augment("q?", &[]);
        assert!(prompt.contains("(no context retrieved)"));
    }

    #[test]
    fn test_retrieval_response_shape() {
        let body = r#"{"chunks": [{"text": "Art. 5", "source_id": "cf88.pdf", "score": 0.8}, {"text": "bare"}]}"#;
        let parsed: RetrievalResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.chunks.len(), 2);
        assert_eq!(parsed.chunks[0].score, Some(0.8));
        assert_eq!(parsed.chunks[1].source_id, "");
    }

    #[tokio::test]
    async fn test_stalled_retrieval_service_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                held.push(socket);
            }
        });

        let retriever = HttpRetriever::new(
            format!("http://{}/query", addr),
            "direito",
            5,
            Duration::from_millis(200),
        )
        .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), retriever.retrieve("q?"))
            .await
            .expect("request should give up on its own")
            .unwrap_err();
        assert!(matches!(err, EvalError::TransientRemote(_)), "{err:?}");

        server.abort();
    }

    #[tokio::test]
    async fn test_stalled_retrieval_fails_pipeline_after_retries() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                held.push(socket);
            }
        });

        let retriever = HttpRetriever::new(
            format!("http://{}/query", addr),
            "direito",
            5,
            Duration::from_millis(100),
        )
        .unwrap();
        let generator = Arc::new(StubProvider::always("unused"));
        let pipeline = RetrieveGeneratePipeline::new(
            "manual_rag",
            Arc::new(retriever),
            generator.clone(),
            policy(),
        );

        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.retrieve_and_generate("q?"))
            .await
            .expect("pipeline should not hang")
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::Retrieval);
        assert!(matches!(err.source, EvalError::RetryExhausted { attempts: 2, .. }));
        assert_eq!(generator.calls(), 0);

        server.abort();
    }
}
