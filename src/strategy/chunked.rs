//! Stateless per-chunk generation.

use async_trait::async_trait;

use super::GenerationStrategy;
use crate::backend::{with_backoff, LlmRequest};
use crate::config::{ChunkingConfig, LlmConfig, PipelineConfig};
use crate::error::Result;
use crate::events::{emit, Event};
use crate::exec_ctx::ExecCtx;
use crate::output_parser::parse_flashcards;
use crate::prompt::{chunk_prompt, CHUNK_SYSTEM_PROMPT};
use crate::segment::{segment, Chunk};
use crate::types::{Document, Flashcard, PipelineResult};

/// Segment the document and run one completion per chunk, strictly in order.
///
/// Only the first `max_chunks` chunks are sent. A chunk whose request or
/// parse fails contributes zero flashcards; the run carries on. The
/// concatenated cards are truncated to `max_flashcards`, keeping order.
#[derive(Debug, Clone)]
pub struct ChunkedCompletion {
    model: String,
    llm: LlmConfig,
    chunking: ChunkingConfig,
}

impl ChunkedCompletion {
    pub fn new(model: impl Into<String>, llm: LlmConfig, chunking: ChunkingConfig) -> Self {
        Self {
            model: model.into(),
            llm,
            chunking,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.model.clone(), config.llm.clone(), config.chunking.clone())
    }

    fn request(&self, chunk: &Chunk) -> LlmRequest {
        LlmRequest {
            model: self.model.clone(),
            system_prompt: Some(CHUNK_SYSTEM_PROMPT.to_string()),
            prompt: chunk_prompt(&chunk.text, self.chunking.cards_per_chunk),
            config: self.llm.clone(),
        }
    }

    /// One chunk, start to finish. Errors are returned to the caller to absorb.
    async fn generate_chunk(&self, ctx: &ExecCtx, chunk: &Chunk) -> Result<Vec<Flashcard>> {
        let backend = ctx.require_backend()?;
        let request = self.request(chunk);

        let events = &ctx.event_handler;
        let mut on_retry = |attempt: u32, delay: std::time::Duration, reason: &str| {
            tracing::debug!(chunk = chunk.index, attempt, ?delay, reason, "retrying completion");
            emit(
                events,
                Event::TransportRetry {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.to_string(),
                },
            );
        };

        let response = with_backoff(
            backend,
            &ctx.client,
            &ctx.base_url,
            &request,
            &ctx.backoff,
            Some(&mut on_retry),
        )
        .await?;

        Ok(parse_flashcards(&response.text)?)
    }
}

#[async_trait]
impl GenerationStrategy for ChunkedCompletion {
    fn name(&self) -> &'static str {
        "chunked"
    }

    async fn generate(&self, ctx: &ExecCtx, document: &Document) -> Result<PipelineResult> {
        // Fail on a missing backend before any work, not once per chunk.
        ctx.require_backend()?;

        let text = document.decoded_text();
        let chunks = segment(&text, self.chunking.max_chunk_length);
        let total_chunks = chunks.len();
        let selected = &chunks[..total_chunks.min(self.chunking.max_chunks)];

        tracing::info!(
            file = %document.file_name,
            total_chunks,
            processing = selected.len(),
            "segmented document"
        );

        let mut flashcards = Vec::new();
        for chunk in selected {
            emit(
                &ctx.event_handler,
                Event::ChunkStart {
                    index: chunk.index,
                    of: selected.len(),
                },
            );

            let (cards, ok) = match self.generate_chunk(ctx, chunk).await {
                Ok(cards) => (cards, true),
                Err(e) => {
                    tracing::warn!(chunk = chunk.index, error = %e, "chunk produced no flashcards");
                    (Vec::new(), false)
                }
            };

            emit(
                &ctx.event_handler,
                Event::ChunkEnd {
                    index: chunk.index,
                    cards: cards.len(),
                    ok,
                },
            );
            flashcards.extend(cards);
        }

        flashcards.truncate(self.chunking.max_flashcards);

        Ok(PipelineResult {
            flashcards,
            total_chunks,
            processed_chunks: selected.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply};
    use crate::events::FnEventHandler;
    use crate::PipelineError;
    use std::sync::{Arc, Mutex};

    fn cards_json(prefix: &str, n: usize) -> String {
        let cards: Vec<String> = (0..n)
            .map(|i| format!(r#"{{"question": "{prefix} q{i}", "answer": "{prefix} a{i}"}}"#))
            .collect();
        format!(r#"{{"flashcards": [{}]}}"#, cards.join(","))
    }

    fn ctx_with(mock: Arc<MockBackend>) -> ExecCtx {
        ExecCtx::builder("http://unused").backend(mock).build().unwrap()
    }

    fn strategy(max_chunk_length: usize) -> ChunkedCompletion {
        ChunkedCompletion::new(
            "chatgpt-4o-latest",
            LlmConfig::default(),
            ChunkingConfig {
                max_chunk_length,
                ..ChunkingConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn request_carries_system_role_and_count() {
        let mock = Arc::new(MockBackend::fixed(cards_json("c", 2)));
        let ctx = ctx_with(mock.clone());
        let result = strategy(1000)
            .generate(&ctx, &Document::text("a.txt", "Cells divide. Cells grow."))
            .await
            .unwrap();

        assert_eq!(result.flashcards.len(), 2);
        assert_eq!(result.total_chunks, 1);
        assert_eq!(result.processed_chunks, 1);

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "chatgpt-4o-latest");
        assert_eq!(requests[0].system_prompt.as_deref(), Some(CHUNK_SYSTEM_PROMPT));
        assert!(requests[0].prompt.starts_with("Please create 4 flashcards"));
        assert!(requests[0].prompt.ends_with("Cells divide. Cells grow."));
        assert!(requests[0].config.json_mode);
    }

    #[tokio::test]
    async fn malformed_chunk_is_absorbed() {
        let mock = Arc::new(MockBackend::from_replies(vec![
            MockReply::text(cards_json("one", 1)),
            MockReply::text("I cannot help with that."),
            MockReply::text(cards_json("three", 1)),
        ]));
        let ctx = ctx_with(mock.clone());
        // Every sentence is longer than the limit, so each becomes its own chunk.
        let result = strategy(12)
            .generate(&ctx, &Document::text("a.txt", "Sentence no1. Sentence no2. Sentence no3."))
            .await
            .unwrap();

        let questions: Vec<_> = result.flashcards.iter().map(|c| c.question.as_str()).collect();
        assert_eq!(questions, vec!["one q0", "three q0"]);
        assert_eq!(result.processed_chunks, 3);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn rate_limited_chunk_is_absorbed() {
        let mock = Arc::new(MockBackend::from_replies(vec![
            MockReply::http_error(429, Some("rate_limit_exceeded")),
            MockReply::text(cards_json("two", 2)),
        ]));
        let ctx = ctx_with(mock);
        let result = strategy(12)
            .generate(&ctx, &Document::text("a.txt", "Sentence no1. Sentence no2."))
            .await
            .unwrap();
        assert_eq!(result.flashcards.len(), 2);
        assert_eq!(result.flashcards[0].question, "two q0");
    }

    #[tokio::test]
    async fn emits_chunk_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = FnEventHandler(move |event: Event| {
            if let Ok(mut s) = sink.lock() {
                s.push(match event {
                    Event::ChunkStart { index, of } => format!("start {index}/{of}"),
                    Event::ChunkEnd { index, cards, ok } => format!("end {index} {cards} {ok}"),
                    other => format!("{other:?}"),
                });
            }
        });
        let mock = Arc::new(MockBackend::from_replies(vec![
            MockReply::text(cards_json("a", 1)),
            MockReply::text("not json"),
        ]));
        let ctx = ExecCtx::builder("http://unused")
            .backend(mock)
            .event_handler(Arc::new(handler))
            .build()
            .unwrap();

        strategy(12)
            .generate(&ctx, &Document::text("a.txt", "Sentence no1. Sentence no2."))
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["start 0/2", "end 0 1 true", "start 1/2", "end 1 0 false"]
        );
    }

    #[tokio::test]
    async fn text_without_sentences_makes_no_calls() {
        let mock = Arc::new(MockBackend::fixed(cards_json("x", 1)));
        let ctx = ctx_with(mock.clone());
        let result = strategy(1000)
            .generate(&ctx, &Document::text("a.txt", "no terminal punctuation here"))
            .await
            .unwrap();
        assert_eq!(result, PipelineResult::default());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_backend_is_a_config_error() {
        let ctx = ExecCtx::builder("http://unused").build().unwrap();
        let err = strategy(1000)
            .generate(&ctx, &Document::text("a.txt", "One. Two."))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
