//! Error types for the flashcard output parser.

/// Errors returned by [`parse_flashcards`](super::parse_flashcards).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The LLM response was empty or whitespace-only.
    #[error("empty LLM response")]
    EmptyResponse,

    /// No JSON could be read from the response.
    #[error("could not parse JSON from LLM response: {text}")]
    Unparseable {
        /// A truncated copy of the cleaned LLM text (max 200 chars).
        text: String,
    },

    /// JSON was read but is neither an array nor an object with a `flashcards` array.
    #[error("expected a flashcard array or an object with a `flashcards` array, found {found}")]
    InvalidShape {
        /// JSON type that was found instead.
        found: &'static str,
    },

    /// A record failed validation. The whole batch is rejected.
    #[error("flashcard {index} has an invalid `{field}` field: {problem}")]
    InvalidRecord {
        /// Zero-based position of the offending record.
        index: usize,
        /// `"question"` or `"answer"`, or `"record"` when the entry is not an object.
        field: &'static str,
        problem: &'static str,
    },
}

/// Truncate a string to at most `max_len` characters, appending "..." if truncated.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}
