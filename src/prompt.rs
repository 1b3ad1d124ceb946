use crate::types::PromptVars;

/// Sentinel that should never appear in real templates.
const ESCAPE_SENTINEL: &str = "\x00LBRACE\x00";
/// Sentinel for escaped closing brace.
const ESCAPE_SENTINEL_CLOSE: &str = "\x00RBRACE\x00";

/// System role for per-chunk completions.
pub const CHUNK_SYSTEM_PROMPT: &str = "You are a helpful assistant that creates educational \
flashcards based on the provided text. Generate flashcards in JSON format with 'question' and \
'answer' fields.";

/// User prompt for per-chunk completions. `{count}` and `{input}` are substituted.
pub const CHUNK_USER_TEMPLATE: &str = "Please create {count} flashcards from this Content using \
the topics discussed in it and return them in JSON format as {{\"flashcards\": [...]}}. Each \
flashcard should have a 'question' and a detailed 'answer' field. Provide responses in statements \
and avoid ordered or unordered bullets. Make the flashcards concise and focused on key concepts. \
Content: {input}";

/// Message posted to the assistant thread. The document itself arrives via file search.
pub const ASSISTANT_REQUEST: &str = "Create flashcards covering the key concepts of the attached \
document. Respond only with JSON of the form {\"flashcards\": [{\"question\": \"...\", \
\"answer\": \"...\"}]}.";

/// Build a prompt string with variable substitution.
///
/// Replaces `{key}` placeholders in the template with values from `vars`.
/// The special `{input}` placeholder is replaced by the `input` parameter,
/// after all other keys, so document text is never itself re-scanned for
/// placeholders.
///
/// Use `{{` to insert a literal `{` and `}}` to insert a literal `}`.
///
/// # Example
///
/// ```
/// use flashcard_pipeline::types::PromptVars;
/// use flashcard_pipeline::prompt::render;
///
/// let vars = PromptVars::new().insert("count", "4");
/// let result = render("Make {count} cards as {{\"flashcards\": []}}: {input}", "text", &vars);
/// assert_eq!(result, r#"Make 4 cards as {"flashcards": []}: text"#);
/// ```
pub fn render(template: &str, input: &str, vars: &PromptVars) -> String {
    // Pass 1: protect escaped braces
    let mut rendered = template.replace("{{", ESCAPE_SENTINEL);
    rendered = rendered.replace("}}", ESCAPE_SENTINEL_CLOSE);

    // Pass 2: substitute named placeholders
    for (key, value) in &vars.data {
        let placeholder = format!("{{{}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }

    // Pass 3: restore escaped braces
    rendered = rendered.replace(ESCAPE_SENTINEL, "{");
    rendered = rendered.replace(ESCAPE_SENTINEL_CLOSE, "}");

    // Pass 4: document text last
    rendered.replacen("{input}", input, 1)
}

/// The user prompt for one chunk.
pub fn chunk_prompt(chunk_text: &str, count: usize) -> String {
    let vars = PromptVars::new().insert("count", count.to_string());
    render(CHUNK_USER_TEMPLATE, chunk_text, &vars)
}
