use crate::{
    config::PipelineConfig,
    error::{PipelineFailure, Result},
    exec_ctx::ExecCtx,
    strategy::{self, GenerationStrategy},
    types::{Document, PipelineResult},
    PipelineError,
};

/// Turns uploaded documents into flashcards with one configured strategy.
///
/// Holds no per-request state: build it once and call [`run`](Self::run)
/// for every document.
///
/// # Example
///
/// ```no_run
/// use flashcard_pipeline::{Document, ExecCtx, FlashcardPipeline, PipelineConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let ctx = ExecCtx::from_env()?;
///     let pipeline = FlashcardPipeline::new(PipelineConfig::default())?;
///
///     let doc = Document::text("notes.txt", "Mitochondria make ATP. Ribosomes make proteins.");
///     match pipeline.run(&ctx, Some(doc)).await {
///         Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
///         Err(failure) => eprintln!("{} ({})", failure, failure.kind.http_status()),
///     }
///     Ok(())
/// }
/// ```
pub struct FlashcardPipeline {
    config: PipelineConfig,
    strategy: Box<dyn GenerationStrategy>,
}

impl std::fmt::Debug for FlashcardPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashcardPipeline")
            .field("strategy", &self.strategy.name())
            .field("model", &self.config.model)
            .finish()
    }
}

impl FlashcardPipeline {
    /// Validate `config` and build the strategy it names.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let strategy = strategy::from_config(&config);
        Ok(Self { config, strategy })
    }

    /// Replace the configured strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn GenerationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Run one request and classify any failure for the caller.
    ///
    /// Internal error detail is logged here and never returned. Only a
    /// remote job's reported reason survives into the [`PipelineFailure`].
    pub async fn run(
        &self,
        ctx: &ExecCtx,
        document: Option<Document>,
    ) -> std::result::Result<PipelineResult, PipelineFailure> {
        let document = document.ok_or_else(|| {
            tracing::warn!("request carried no document");
            PipelineError::InputMissing.to_failure()
        })?;

        self.run_document(ctx, &document).await.map_err(|e| {
            let failure = e.to_failure();
            tracing::error!(
                strategy = self.strategy.name(),
                file = %document.file_name,
                kind = ?failure.kind,
                error = %e,
                "flashcard generation failed"
            );
            failure
        })
    }

    /// Run one document, returning the full internal error on failure.
    ///
    /// A document with no content yields an empty result without touching
    /// the remote.
    pub async fn run_document(&self, ctx: &ExecCtx, document: &Document) -> Result<PipelineResult> {
        if document.is_empty() {
            tracing::info!(file = %document.file_name, "empty document, nothing to generate");
            return Ok(PipelineResult::default());
        }

        tracing::info!(
            strategy = self.strategy.name(),
            file = %document.file_name,
            media_type = %document.media_type,
            bytes = document.bytes.len(),
            "generating flashcards"
        );
        let result = self.strategy.generate(ctx, document).await?;
        tracing::info!(
            flashcards = result.flashcards.len(),
            total_chunks = result.total_chunks,
            processed_chunks = result.processed_chunks,
            "flashcards generated"
        );
        Ok(result)
    }
}
