use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

/// An uploaded document: raw bytes plus the declared media type.
#[derive(Debug, Clone)]
pub struct Document {
    /// Original file name, used as the upload name for indexed storage.
    pub file_name: String,

    /// Declared media type (e.g. `text/plain`, `application/pdf`).
    pub media_type: String,

    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// A plain-text document.
    pub fn text(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(file_name, "text/plain", text.into().into_bytes())
    }

    /// Decode the content as text. Invalid UTF-8 is replaced, never rejected.
    pub fn decoded_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A validated question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

impl Flashcard {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Complete pipeline execution result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Flashcards in generation order.
    pub flashcards: Vec<Flashcard>,

    /// Units the document was split into.
    pub total_chunks: usize,

    /// Units actually sent for generation (successful or not).
    pub processed_chunks: usize,
}

impl PipelineResult {
    /// Whether some units were skipped by the chunk cap.
    pub fn is_partial(&self) -> bool {
        self.processed_chunks < self.total_chunks
    }
}

/// Variables substituted into prompt templates via `{key}` placeholders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptVars {
    pub data: HashMap<String, String>,
}

impl PromptVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serializes_camel_case() {
        let result = PipelineResult {
            flashcards: vec![Flashcard::new("Q", "A")],
            total_chunks: 8,
            processed_chunks: 5,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["totalChunks"], 8);
        assert_eq!(json["processedChunks"], 5);
        assert_eq!(json["flashcards"][0]["question"], "Q");
        assert!(result.is_partial());
    }

    #[test]
    fn test_decoded_text_is_lossy() {
        let doc = Document::new("x.txt", "text/plain", vec![b'H', b'i', 0xFF, b'.']);
        assert_eq!(doc.decoded_text(), "Hi\u{FFFD}.");
    }
}
