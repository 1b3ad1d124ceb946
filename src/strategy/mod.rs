//! Generation strategies.
//!
//! A [`GenerationStrategy`] turns one [`Document`] into a [`PipelineResult`].
//! Two implementations exist, selected by [`StrategyKind`]:
//!
//! - [`ChunkedCompletion`]: segment the text and run one stateless
//!   completion per chunk, in order, absorbing per-chunk failures.
//! - [`AssistedJob`]: upload the whole file to indexed storage and run a
//!   single assistant job over it, polling until it finishes.

pub mod assisted;
pub mod chunked;

pub use assisted::AssistedJob;
pub use chunked::ChunkedCompletion;

use async_trait::async_trait;

use crate::config::{PipelineConfig, StrategyKind};
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::types::{Document, PipelineResult};

/// Object-safe trait for document-to-flashcards strategies.
///
/// Implementations hold no per-request state, so one instance can serve
/// any number of sequential or concurrent runs.
#[async_trait]
pub trait GenerationStrategy: Send + Sync {
    /// Stable identifier for logs (e.g. `"chunked"`).
    fn name(&self) -> &'static str;

    /// Generate flashcards for a non-empty document.
    async fn generate(&self, ctx: &ExecCtx, document: &Document) -> Result<PipelineResult>;
}

/// Build the strategy named by `config.strategy`.
pub fn from_config(config: &PipelineConfig) -> Box<dyn GenerationStrategy> {
    match config.strategy {
        StrategyKind::Chunked => Box::new(ChunkedCompletion::from_config(config)),
        StrategyKind::Assisted => Box::new(AssistedJob::from_config(config)),
    }
}
