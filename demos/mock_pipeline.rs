//! Example: run both strategies against mocks, with logging.
//!
//! Run with: `RUST_LOG=flashcard_pipeline=debug cargo run --example mock_pipeline`

use flashcard_pipeline::{
    Document, Event, ExecCtx, FlashcardPipeline, FnEventHandler, InstantSleeper, JobStatus,
    MockAssistantApi, MockBackend, MockReply, PipelineConfig, StrategyKind,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const NOTES: &str = "Mitochondria produce most of the cell's ATP. Ribosomes assemble proteins \
from amino acids. The nucleus stores genetic material! Why do cells divide? To grow and to \
repair tissue.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let progress = Arc::new(FnEventHandler(|event: Event| match event {
        Event::ChunkStart { index, of } => println!("chunk {}/{}", index + 1, of),
        Event::ChunkEnd { cards, ok, .. } => println!("  -> {} cards (ok: {})", cards, ok),
        Event::JobPoll { job, attempt, status, .. } => {
            println!("{} poll #{}: {:?}", job, attempt, status)
        }
        Event::TransportRetry { attempt, reason, .. } => println!("retry {}: {}", attempt, reason),
    }));

    // Chunked: the second chunk is rate limited and contributes nothing.
    let backend = MockBackend::from_replies(vec![
        MockReply::text(r#"{"flashcards": [{"question": "What produces ATP?", "answer": "Mitochondria."}]}"#),
        MockReply::http_error(429, Some("rate_limit_exceeded")),
        MockReply::text("```json\n[{\"question\": \"Why do cells divide?\", \"answer\": \"To grow and repair tissue.\"}]\n```"),
    ]);
    let ctx = ExecCtx::builder("http://unused")
        .backend(Arc::new(backend))
        .event_handler(progress.clone())
        .build()?;

    let mut config = PipelineConfig::default();
    config.chunking.max_chunk_length = 60;
    let chunked = FlashcardPipeline::new(config)?;
    let result = chunked.run(&ctx, Some(Document::text("notes.txt", NOTES))).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    // Assisted: indexing takes one extra poll, generation two.
    let api = MockAssistantApi::new(
        r#"{"flashcards": [{"question": "What does the nucleus store?", "answer": "Genetic material."}]}"#,
    )
    .with_batch_statuses(vec![JobStatus::InProgress], JobStatus::Completed)
    .with_run_statuses(vec![JobStatus::Queued, JobStatus::InProgress], JobStatus::Completed);
    let ctx = ExecCtx::builder("http://unused")
        .assistant(Arc::new(api))
        .sleeper(Arc::new(InstantSleeper::new()))
        .event_handler(progress)
        .build()?;

    let assisted =
        FlashcardPipeline::new(PipelineConfig::default().with_strategy(StrategyKind::Assisted))?;
    let result = assisted.run(&ctx, Some(Document::text("notes.txt", NOTES))).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    // No document at all.
    if let Err(failure) = assisted.run(&ctx, None).await {
        println!("{}", serde_json::to_string(&failure)?);
    }

    Ok(())
}
