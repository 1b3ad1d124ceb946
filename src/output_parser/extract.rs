//! Text extraction helpers applied before JSON decoding.
//!
//! Model output arrives wrapped in reasoning blocks, markdown fences, or
//! chatty prose. These functions peel that packaging away.

/// Strip think blocks, then trim whitespace.
pub fn preprocess(text: &str) -> String {
    strip_think_tags(text).trim().to_string()
}

/// Strip all `<think>...</think>` and `<thinking>...</thinking>` blocks from text.
///
/// An unclosed block swallows the rest of the text.
///
/// # Examples
///
/// ```
/// use flashcard_pipeline::output_parser::strip_think_tags;
///
/// assert_eq!(strip_think_tags("<think>reasoning</think>result"), "result");
/// assert_eq!(strip_think_tags("<think>no closing tag"), "");
/// ```
pub fn strip_think_tags(text: &str) -> String {
    let result = strip_tag_variant(text, "<think>", "</think>");
    strip_tag_variant(&result, "<thinking>", "</thinking>")
}

fn strip_tag_variant(text: &str, open: &str, close: &str) -> String {
    let mut result = text.to_string();
    while let Some(start) = result.find(open) {
        match result[start..].find(close) {
            Some(end_offset) => {
                let end = start + end_offset + close.len();
                result.replace_range(start..end, "");
            }
            None => {
                result.truncate(start);
                break;
            }
        }
    }
    result
}

/// Inner content of the first complete fenced code block.
///
/// Returns `(language_hint, content)`; the hint is `None` for bare fences.
///
/// # Examples
///
/// ```
/// use flashcard_pipeline::output_parser::extract::extract_code_block;
///
/// let input = "Here you go:\n```json\n[{\"question\": \"Q\"}]\n```\nEnjoy!";
/// let (lang, content) = extract_code_block(input).unwrap();
/// assert_eq!(lang, Some("json"));
/// assert_eq!(content, "[{\"question\": \"Q\"}]");
/// ```
pub fn extract_code_block(text: &str) -> Option<(Option<&str>, &str)> {
    let mut search_from = 0;
    while let Some(fence_start) = text[search_from..].find("```") {
        let after_backticks = search_from + fence_start + 3;

        // The info string runs to the end of the opening fence line.
        let line_end = text[after_backticks..].find('\n')?;
        let lang_str = text[after_backticks..after_backticks + line_end].trim();
        let lang = (!lang_str.is_empty()).then_some(lang_str);

        let content_start = after_backticks + line_end + 1;
        if let Some(close_offset) = text[content_start..].find("```") {
            let content = text[content_start..content_start + close_offset].trim();
            return Some((lang, content));
        }

        search_from = after_backticks;
    }
    None
}

/// Find the last top-level region delimited by `open`/`close`.
///
/// Nesting-aware and skips delimiters inside JSON strings. Later regions win
/// because models tend to put their answer after any preamble.
///
/// # Examples
///
/// ```
/// use flashcard_pipeline::output_parser::extract::find_bracketed;
///
/// let input = r#"Result: {"flashcards": [1, 2]} as requested"#;
/// assert_eq!(find_bracketed(input, '{', '}'), Some(r#"{"flashcards": [1, 2]}"#));
/// ```
pub fn find_bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let mut best: Option<&str> = None;
    let mut scan_from = 0;

    while let Some(offset) = text[scan_from..].find(open) {
        let start = scan_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escape_next = false;
        let mut found_end = None;

        for (i, ch) in text[start..].char_indices() {
            if escape_next {
                escape_next = false;
                continue;
            }
            match ch {
                '\\' if in_string => escape_next = true,
                '"' => in_string = !in_string,
                _ if in_string => {}
                c if c == open => depth += 1,
                c if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        found_end = Some(start + i);
                        break;
                    }
                }
                _ => {}
            }
        }

        match found_end {
            Some(end) => {
                best = Some(&text[start..end + close.len_utf8()]);
                scan_from = end + close.len_utf8();
            }
            None => break,
        }
    }

    best
}
