//! Event hooks for pipeline progress.
//!
//! Provides an optional, non-intrusive way to observe a run: chunk
//! boundaries, remote job polls, and transport retries. Implement
//! [`EventHandler`] to drive a progress bar or streaming UI.

use std::sync::Arc;

use crate::poll::{JobKind, JobStatus};

/// Events emitted while a document is processed.
#[derive(Debug, Clone)]
pub enum Event {
    /// A chunk is about to be sent for generation.
    ChunkStart {
        /// Zero-based chunk index.
        index: usize,
        /// Number of chunks that will be processed in this run.
        of: usize,
    },
    /// A chunk finished. Failed chunks report `ok: false` and zero cards.
    ChunkEnd {
        index: usize,
        cards: usize,
        ok: bool,
    },
    /// A remote job status was re-fetched.
    JobPoll {
        job: JobKind,
        id: String,
        /// 1-indexed poll attempt.
        attempt: u32,
        status: JobStatus,
    },
    /// A transport-level retry due to HTTP error.
    TransportRetry {
        /// The retry attempt number (1-indexed).
        attempt: u32,
        /// Delay before this retry attempt in milliseconds.
        delay_ms: u64,
        /// Reason for the retry (error description).
        reason: String,
    },
}

/// Handler for pipeline events.
///
/// This is entirely optional -- the pipeline works without one.
///
/// # Example
///
/// ```
/// use flashcard_pipeline::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::ChunkStart { index, of } => println!("chunk {}/{}", index + 1, of),
///             Event::ChunkEnd { cards, .. } => println!("  {} cards", cards),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
