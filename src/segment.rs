//! Sentence-boundary text segmenter.
//!
//! Splits document text into [`Chunk`]s no longer than a character limit.
//! A sentence is a run of non-terminal characters followed by one or more
//! terminal marks (`.`, `!`, `?`). Sentences are packed greedily and never
//! split, so a single sentence longer than the limit becomes its own
//! oversized chunk.
//!
//! Text carrying no terminal punctuation at all produces zero chunks, and a
//! trailing fragment without a terminal mark is dropped.

/// Default maximum chunk length, in characters.
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 50_000;

/// A contiguous slice of the source text, submitted as one generation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the chunk sequence (0-based).
    pub index: usize,
    /// Trimmed chunk text. Never empty.
    pub text: String,
}

impl Chunk {
    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

fn is_terminal(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}

/// Split text into sentences, keeping each sentence's own whitespace.
///
/// # Examples
///
/// ```
/// use flashcard_pipeline::segment::sentences;
///
/// assert_eq!(sentences("Hi. Why?! ok"), vec!["Hi.", " Why?!"]);
/// assert!(sentences("no punctuation").is_empty());
/// ```
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut in_marks = false;

    for (i, ch) in text.char_indices() {
        let terminal = is_terminal(ch);
        match start {
            // Marks with no preceding body are skipped.
            None if terminal => {}
            None => {
                start = Some(i);
                in_marks = false;
            }
            Some(_) if terminal => in_marks = true,
            Some(s) => {
                if in_marks {
                    out.push(&text[s..i]);
                    start = Some(i);
                    in_marks = false;
                }
            }
        }
    }

    if let (Some(s), true) = (start, in_marks) {
        out.push(&text[s..]);
    }
    out
}

/// Split text into chunks of at most `max_chunk_length` characters.
///
/// Lengths are compared before trimming. The result is deterministic for
/// a given input and limit.
///
/// # Examples
///
/// ```
/// use flashcard_pipeline::segment::segment;
///
/// let chunks = segment("One. Two. Three.", 10);
/// let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, vec!["One. Two.", "Three."]);
/// ```
pub fn segment(text: &str, max_chunk_length: usize) -> Vec<Chunk> {
    fn close(buf: &str, chunks: &mut Vec<Chunk>) {
        let trimmed = buf.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                index: chunks.len(),
                text: trimmed.to_string(),
            });
        }
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in sentences(text) {
        let len = sentence.chars().count();
        if current_len + len <= max_chunk_length {
            current.push_str(sentence);
            current_len += len;
        } else {
            if !current.is_empty() {
                close(&current, &mut chunks);
            }
            current.clear();
            current.push_str(sentence);
            current_len = len;
        }
    }

    if !current.is_empty() {
        close(&current, &mut chunks);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    // ── sentences ──

    #[test]
    fn sentences_keep_mark_runs() {
        assert_eq!(sentences("Wait... What?! Yes."), vec!["Wait...", " What?!", " Yes."]);
    }

    #[test]
    fn sentences_skip_leading_marks() {
        assert_eq!(sentences("?!Hello."), vec!["Hello."]);
    }

    #[test]
    fn sentences_drop_unterminated_tail() {
        assert_eq!(sentences("Done. trailing words"), vec!["Done."]);
    }

    #[test]
    fn sentences_none_without_punctuation() {
        assert!(sentences("just some words\nacross lines").is_empty());
    }

    #[test]
    fn sentences_multibyte() {
        assert_eq!(sentences("Ça va? Très bien."), vec!["Ça va?", " Très bien."]);
    }

    // ── segment ──

    #[test]
    fn segment_empty_text() {
        assert!(segment("", 100).is_empty());
    }

    #[test]
    fn segment_without_punctuation_yields_nothing() {
        assert!(segment("a heading without any sentence marks", 100).is_empty());
    }

    #[test]
    fn segment_packs_greedily() {
        // "One." = 4, " Two." = 5, " Three." = 7
        let chunks = segment("One. Two. Three.", 9);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "One. Two.");
        assert_eq!(chunks[1].text, "Three.");
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn segment_exact_fit_stays_together() {
        let chunks = segment("Ab. Cd.", 7);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Ab. Cd.");
    }

    #[test]
    fn segment_oversized_sentence_is_its_own_chunk() {
        let long = format!("{}.", "x".repeat(30));
        let text = format!("Hi. {} Bye.", long);
        let chunks = segment(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "Hi.");
        assert_eq!(chunks[1].text, long);
        assert_eq!(chunks[2].text, "Bye.");
    }

    #[test]
    fn segment_oversized_first_sentence() {
        let long = format!("{}!", "y".repeat(20));
        let chunks = segment(&long, 5);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, long);
    }

    #[test]
    fn segment_is_deterministic() {
        let text = "Alpha beta. Gamma delta! Epsilon? Zeta eta theta. Iota.";
        assert_eq!(segment(text, 20), segment(text, 20));
    }

    #[test]
    fn segment_reconstructs_sentences_in_order() {
        let text = "The cell is the unit of life. Mitochondria make ATP! \
                    Do plants respire? Yes, they do. Ribosomes build proteins.\n\
                    DNA stores information. RNA carries it.";
        for max in [1, 10, 30, 60, 500] {
            let chunks = segment(text, max);
            let joined: String = chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let expected: String = sentences(text).concat();
            assert_eq!(squash(&joined), squash(&expected), "max = {}", max);
        }
    }

    #[test]
    fn segment_respects_limit_unless_single_sentence() {
        let text = "Short one. A somewhat longer sentence here. Tiny. \
                    Another moderately sized sentence follows. End.";
        let max = 25;
        for chunk in segment(text, max) {
            let sentence_count = sentences(&chunk.text).len();
            assert!(
                chunk.char_len() <= max || sentence_count == 1,
                "chunk {:?} exceeds {}",
                chunk.text,
                max
            );
        }
    }

    #[test]
    fn segment_counts_chars_not_bytes() {
        // Each "éé." is 3 chars but 5 bytes.
        let chunks = segment("éé.éé.", 6);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn segment_default_limit_keeps_small_documents_whole() {
        let chunks = segment("One. Two. Three.", DEFAULT_MAX_CHUNK_LENGTH);
        assert_eq!(chunks.len(), 1);
    }
}
