//! # Flashcard Pipeline
//!
//! Turns uploaded documents into question/answer flashcards with an LLM.
//!
//! Two generation strategies share one orchestrator:
//!
//! - **Chunked** ([`ChunkedCompletion`]): split the text into sentence-aligned
//!   chunks, send one stateless completion per chunk in order, absorb
//!   per-chunk failures, and cap both the chunks processed and the cards kept.
//! - **Assisted** ([`AssistedJob`]): upload the file to indexed storage, run a
//!   single assistant job over it, and poll both indexing and generation to
//!   a terminal state.
//!
//! ## Core Concepts
//!
//! - **[`FlashcardPipeline`]**: validates config, picks the strategy, and
//!   classifies failures into a [`PipelineFailure`].
//! - **[`ExecCtx`]**: shared execution context (HTTP client, endpoint, both
//!   remote surfaces, retry settings, poll sleeper, optional event handler).
//! - **[`Backend`](backend::Backend)** and **[`AssistantApi`](backend::AssistantApi)**:
//!   the stateless and stateful remote surfaces.
//! - **[`segment`](segment::segment)** and
//!   **[`parse_flashcards`](output_parser::parse_flashcards)**: the pure
//!   text-in, data-out halves of the pipeline.
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashcard_pipeline::{Document, ExecCtx, FlashcardPipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = ExecCtx::from_env()?;
//!     let config = PipelineConfig::load("pipeline.toml")?;
//!     let pipeline = FlashcardPipeline::new(config)?;
//!
//!     let doc = Document::text("notes.txt", std::fs::read_to_string("notes.txt")?);
//!     let result = pipeline.run(&ctx, Some(doc)).await?;
//!     for card in &result.flashcards {
//!         println!("Q: {}\nA: {}\n", card.question, card.answer);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a network
//!
//! ```
//! use flashcard_pipeline::{Document, ExecCtx, FlashcardPipeline, MockBackend, PipelineConfig};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mock = MockBackend::fixed(r#"{"flashcards": [{"question": "Q", "answer": "A"}]}"#);
//! let ctx = ExecCtx::builder("http://unused").backend(Arc::new(mock)).build().unwrap();
//! let pipeline = FlashcardPipeline::new(PipelineConfig::default()).unwrap();
//!
//! let result = pipeline.run(&ctx, Some(Document::text("a.txt", "Cells divide."))).await.unwrap();
//! assert_eq!(result.flashcards.len(), 1);
//! # });
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod exec_ctx;
pub mod output_parser;
pub mod pipeline;
pub mod poll;
pub mod prompt;
pub mod segment;
pub mod strategy;
pub mod types;

pub use backend::{BackoffConfig, MockAssistantApi, MockBackend, MockReply};
#[cfg(feature = "openai")]
pub use backend::OpenAiBackend;
pub use config::{AssistantConfig, ChunkingConfig, LlmConfig, PipelineConfig, StrategyKind};
pub use error::{FailureKind, PipelineError, PipelineFailure, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use exec_ctx::{ExecCtx, ExecCtxBuilder};
pub use output_parser::{parse_flashcards, ParseError};
pub use pipeline::FlashcardPipeline;
pub use poll::{InstantSleeper, JobKind, JobStatus, Sleeper, TokioSleeper};
pub use segment::{segment, Chunk};
pub use strategy::{AssistedJob, ChunkedCompletion, GenerationStrategy};
pub use types::{Document, Flashcard, PipelineResult};
