//! # Flashcard Output Parser
//!
//! Reads flashcards out of raw model responses. Handles think blocks,
//! markdown fences, and JSON embedded in prose, then validates every record.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`parse_flashcards`] | Strict, all-or-nothing flashcard extraction |
//! | [`strip_think_tags`] | Remove `<think>` blocks from text |
//! | [`extract::extract_code_block`] | Inner content of the first fenced block |

pub mod error;
pub mod extract;
pub mod flashcards;

pub use error::ParseError;
pub use extract::{preprocess, strip_think_tags};
pub use flashcards::parse_flashcards;
