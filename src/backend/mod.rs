//! Remote capability traits and normalized request/response types.
//!
//! Two surfaces are abstracted:
//!
//! - [`Backend`]: stateless completion: prompt in, text out.
//! - [`AssistantApi`]: the stateful assistant surface: file upload,
//!   indexed storage, assistants, threads, and runs.
//!
//! ```text
//! ChunkedCompletion ──► LlmRequest ──► Backend::complete() ──► LlmResponse
//!
//! AssistedJob ──► upload_file ─► create_vector_store ─► attach_file_batch ─► get_file_batch*
//!             ──► find/create_assistant ─► bind_assistant ─► create_thread ─► add_message
//!             ──► create_run ─► get_run* ─► latest_assistant_message
//! ```
//!
//! Built-in implementations: [`OpenAiBackend`] (both traits),
//! [`MockBackend`] and [`MockAssistantApi`] for tests.

pub mod backoff;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;

pub use backoff::BackoffConfig;
pub use mock::{MockAssistantApi, MockBackend, MockReply};
#[cfg(feature = "openai")]
pub use openai::OpenAiBackend;

use crate::config::LlmConfig;
use crate::error::Result;
use crate::poll::JobStatus;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;

/// Type alias for the callback invoked before each transport retry.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, std::time::Duration, &str) + Send)>;

/// A normalized completion request, provider-agnostic.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Model identifier (e.g. `"chatgpt-4o-latest"`).
    pub model: String,

    /// System instructions, if any.
    pub system_prompt: Option<String>,

    /// The user prompt text.
    pub prompt: String,

    /// LLM configuration (temperature, max_tokens, json_mode).
    pub config: LlmConfig,
}

/// A normalized completion response.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token counts, model info).
    pub metadata: Option<serde_json::Value>,
}

/// Abstraction over stateless completion providers.
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute a non-streaming completion.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// A remote job handle as returned at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJob {
    pub id: String,
    pub status: JobStatus,
}

/// Configuration pushed to the remote assistant on create and on every bind.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantSpec {
    /// Lookup key for reuse across requests.
    pub name: String,
    pub model: String,
    pub instructions: String,
    /// Ask for a JSON object response format.
    pub json_mode: bool,
}

/// The stateful assistant surface: indexed storage plus asynchronous runs.
///
/// Every call takes the HTTP client and base URL, like [`Backend`], so a
/// single [`ExecCtx`](crate::ExecCtx) drives both surfaces.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Upload a local file for assistant use. Returns the file id.
    async fn upload_file(
        &self,
        client: &Client,
        base_url: &str,
        path: &Path,
        file_name: &str,
    ) -> Result<String>;

    /// Create an empty indexed store. Returns the store id.
    async fn create_vector_store(&self, client: &Client, base_url: &str, name: &str)
        -> Result<String>;

    /// Start indexing `file_id` into `store_id`.
    async fn attach_file_batch(
        &self,
        client: &Client,
        base_url: &str,
        store_id: &str,
        file_id: &str,
    ) -> Result<RemoteJob>;

    /// Re-fetch the status of an indexing batch.
    async fn get_file_batch(
        &self,
        client: &Client,
        base_url: &str,
        store_id: &str,
        batch_id: &str,
    ) -> Result<JobStatus>;

    /// Look up an existing assistant by name.
    async fn find_assistant(&self, client: &Client, base_url: &str, name: &str)
        -> Result<Option<String>>;

    /// Create a new assistant. Returns its id.
    async fn create_assistant(
        &self,
        client: &Client,
        base_url: &str,
        spec: &AssistantSpec,
    ) -> Result<String>;

    /// Re-apply instructions and bind the assistant to `store_id`.
    async fn bind_assistant(
        &self,
        client: &Client,
        base_url: &str,
        assistant_id: &str,
        spec: &AssistantSpec,
        store_id: &str,
    ) -> Result<()>;

    /// Open a conversation thread. Returns its id.
    async fn create_thread(&self, client: &Client, base_url: &str) -> Result<String>;

    /// Post a user message to a thread.
    async fn add_message(
        &self,
        client: &Client,
        base_url: &str,
        thread_id: &str,
        content: &str,
    ) -> Result<()>;

    /// Submit a run of `assistant_id` on `thread_id`.
    async fn create_run(
        &self,
        client: &Client,
        base_url: &str,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<RemoteJob>;

    /// Re-fetch the status of a run.
    async fn get_run(
        &self,
        client: &Client,
        base_url: &str,
        thread_id: &str,
        run_id: &str,
    ) -> Result<JobStatus>;

    /// Text of the newest assistant-authored message on a thread.
    async fn latest_assistant_message(
        &self,
        client: &Client,
        base_url: &str,
        thread_id: &str,
    ) -> Result<Option<String>>;

    async fn delete_vector_store(&self, client: &Client, base_url: &str, store_id: &str)
        -> Result<()>;

    async fn delete_file(&self, client: &Client, base_url: &str, file_id: &str) -> Result<()>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Check whether a [`PipelineError`] is retryable based on the backoff config.
///
/// Retryable conditions:
/// - [`PipelineError::HttpError`] with a status in `config.retryable_statuses`
/// - [`PipelineError::Request`] (connection/transport errors)
pub fn is_retryable(error: &PipelineError, config: &BackoffConfig) -> bool {
    match error {
        PipelineError::HttpError { status, .. } => config.retryable_statuses.contains(status),
        PipelineError::Request(_) => true,
        _ => false,
    }
}

/// Execute a completion with transport-level retry and exponential backoff.
///
/// Returns the first successful response, or the last error if all retries
/// are exhausted.
pub async fn with_backoff(
    backend: &Arc<dyn Backend>,
    client: &Client,
    base_url: &str,
    request: &LlmRequest,
    config: &BackoffConfig,
    mut on_retry: RetryCallback<'_>,
) -> Result<LlmResponse> {
    let mut last_error: Option<PipelineError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = match &last_error {
                Some(PipelineError::HttpError {
                    retry_after: Some(ra),
                    ..
                }) if config.respect_retry_after => *ra,
                _ => config.delay_for_attempt(attempt - 1),
            };

            let reason = last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();

            if let Some(ref mut cb) = on_retry {
                cb(attempt, delay, &reason);
            }

            tokio::time::sleep(delay).await;
        }

        match backend.complete(client, base_url, request).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                if attempt < config.max_retries && is_retryable(&e, config) {
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or(PipelineError::Other(
        "backoff loop exited unexpectedly".into(),
    )))
}
