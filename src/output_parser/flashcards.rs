//! Strict flashcard extraction.
//!
//! Accepts either a bare JSON array of records or an object carrying a
//! `flashcards` array. Every record must have a non-empty `question` and
//! `answer`; one bad record rejects the whole batch.

use serde_json::Value;

use crate::output_parser::error::{truncate, ParseError};
use crate::output_parser::extract::{extract_code_block, find_bracketed, preprocess};
use crate::types::Flashcard;

/// Parse a raw model response into validated flashcards.
///
/// Steps:
/// 1. Strip think blocks and trim
/// 2. Prefer the inner content of a fenced code block over surrounding prose
/// 3. Decode JSON, falling back to the last bracketed object or array, first
///    in the fenced block and then in the whole response
/// 4. Normalize to an array and validate every record
///
/// Field values are returned verbatim (validation trims only to test for emptiness).
///
/// # Examples
///
/// ```
/// use flashcard_pipeline::output_parser::parse_flashcards;
///
/// let raw = r#"```json
/// {"flashcards": [{"question": "What is ATP?", "answer": "The cell's energy currency."}]}
/// ```"#;
/// let cards = parse_flashcards(raw).unwrap();
/// assert_eq!(cards.len(), 1);
/// assert_eq!(cards[0].question, "What is ATP?");
/// ```
pub fn parse_flashcards(response: &str) -> Result<Vec<Flashcard>, ParseError> {
    let cleaned = preprocess(response);
    if cleaned.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let candidate = match extract_code_block(&cleaned) {
        Some((_lang, content)) => content,
        None => cleaned.as_str(),
    };

    // The first fence may hold a note rather than the payload.
    let value = decode(candidate)
        .or_else(|| decode(&cleaned))
        .ok_or_else(|| ParseError::Unparseable {
            text: truncate(candidate, 200),
        })?;

    let records = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("flashcards") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(ParseError::InvalidShape {
                    found: json_type(&other),
                })
            }
            None => return Err(ParseError::InvalidShape { found: "object" }),
        },
        other => {
            return Err(ParseError::InvalidShape {
                found: json_type(&other),
            })
        }
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| validate_record(index, record))
        .collect()
}

/// Decode JSON directly, or from the last bracketed region in prose.
fn decode(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| find_bracketed(trimmed, open, close))
        .find_map(|region| serde_json::from_str::<Value>(region).ok())
}

fn validate_record(index: usize, record: Value) -> Result<Flashcard, ParseError> {
    let Value::Object(mut map) = record else {
        return Err(ParseError::InvalidRecord {
            index,
            field: "record",
            problem: "not an object",
        });
    };
    let question = take_text(&mut map, index, "question")?;
    let answer = take_text(&mut map, index, "answer")?;
    Ok(Flashcard { question, answer })
}

fn take_text(
    map: &mut serde_json::Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<String, ParseError> {
    let invalid = |problem| ParseError::InvalidRecord {
        index,
        field,
        problem,
    };
    match map.remove(field) {
        None | Some(Value::Null) => Err(invalid("missing")),
        Some(Value::String(s)) if s.trim().is_empty() => Err(invalid("empty")),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(invalid("not a string")),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(q: &str, a: &str) -> Flashcard {
        Flashcard::new(q, a)
    }

    #[test]
    fn object_with_flashcards_array() {
        let raw = r#"{"flashcards": [
            {"question": "What is DNA?", "answer": "Deoxyribonucleic acid."},
            {"question": "Where is it stored?", "answer": "  In the nucleus.  "}
        ]}"#;
        let cards = parse_flashcards(raw).unwrap();
        assert_eq!(
            cards,
            vec![
                card("What is DNA?", "Deoxyribonucleic acid."),
                card("Where is it stored?", "  In the nucleus.  "),
            ]
        );
    }

    #[test]
    fn bare_array() {
        let raw = r#"[{"question": "Q1", "answer": "A1"}]"#;
        assert_eq!(parse_flashcards(raw).unwrap(), vec![card("Q1", "A1")]);
    }

    #[test]
    fn fenced_block_wins_over_prose() {
        let raw = "Sure! Here are your cards [draft]:\n```json\n[{\"question\": \"Q\", \"answer\": \"A\"}]\n```\nLet me know [if] you need more.";
        assert_eq!(parse_flashcards(raw).unwrap(), vec![card("Q", "A")]);
    }

    #[test]
    fn note_fence_before_payload_falls_back_to_whole_response() {
        let raw = "```text\nCards below cover chapter 2.\n```\n```json\n{\"flashcards\": [{\"question\": \"Q\", \"answer\": \"A\"}]}\n```";
        assert_eq!(parse_flashcards(raw).unwrap(), vec![card("Q", "A")]);
    }

    #[test]
    fn json_in_prose_without_fence() {
        let raw = r#"Here you go: {"flashcards": [{"question": "Q", "answer": "A"}]} Hope it helps."#;
        assert_eq!(parse_flashcards(raw).unwrap(), vec![card("Q", "A")]);
    }

    #[test]
    fn think_block_is_ignored() {
        let raw = r#"<think>plan the cards</think>[{"question": "Q", "answer": "A"}]"#;
        assert_eq!(parse_flashcards(raw).unwrap(), vec![card("Q", "A")]);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let raw = r#"[{"question": "Q", "answer": "A", "difficulty": "easy"}]"#;
        assert_eq!(parse_flashcards(raw).unwrap(), vec![card("Q", "A")]);
    }

    #[test]
    fn empty_flashcards_array_is_valid() {
        assert!(parse_flashcards(r#"{"flashcards": []}"#).unwrap().is_empty());
    }

    #[test]
    fn empty_response() {
        assert_eq!(parse_flashcards("  \n "), Err(ParseError::EmptyResponse));
    }

    #[test]
    fn unparseable_prose() {
        assert!(matches!(
            parse_flashcards("I cannot help with that."),
            Err(ParseError::Unparseable { .. })
        ));
    }

    #[test]
    fn object_without_flashcards_field() {
        assert_eq!(
            parse_flashcards(r#"{"cards": []}"#),
            Err(ParseError::InvalidShape { found: "object" })
        );
    }

    #[test]
    fn flashcards_field_not_an_array() {
        assert_eq!(
            parse_flashcards(r#"{"flashcards": "none"}"#),
            Err(ParseError::InvalidShape { found: "string" })
        );
    }

    #[test]
    fn missing_answer_rejects_whole_batch() {
        let raw = r#"{"flashcards": [
            {"question": "Q0", "answer": "A0"},
            {"question": "Q1", "answer": "A1"},
            {"question": "Q2"}
        ]}"#;
        assert_eq!(
            parse_flashcards(raw),
            Err(ParseError::InvalidRecord {
                index: 2,
                field: "answer",
                problem: "missing",
            })
        );
    }

    #[test]
    fn blank_question_is_rejected() {
        let raw = r#"[{"question": "   ", "answer": "A"}]"#;
        assert_eq!(
            parse_flashcards(raw),
            Err(ParseError::InvalidRecord {
                index: 0,
                field: "question",
                problem: "empty",
            })
        );
    }

    #[test]
    fn non_string_answer_is_rejected() {
        let raw = r#"[{"question": "Q", "answer": 42}]"#;
        assert!(matches!(
            parse_flashcards(raw),
            Err(ParseError::InvalidRecord { index: 0, field: "answer", .. })
        ));
    }

    #[test]
    fn non_object_record_is_rejected() {
        let raw = r#"[{"question": "Q", "answer": "A"}, "loose string"]"#;
        assert!(matches!(
            parse_flashcards(raw),
            Err(ParseError::InvalidRecord { index: 1, field: "record", .. })
        ));
    }
}
