//! Execution context shared across pipeline runs.
//!
//! [`ExecCtx`] carries the HTTP client, both remote surfaces, the endpoint,
//! transport retry settings, the poll sleeper, and an optional event handler.
//! Build it once and share it across requests: it holds no per-request state.

#[cfg(feature = "openai")]
use crate::backend::OpenAiBackend;
use crate::backend::{AssistantApi, Backend, BackoffConfig};
use crate::error::Result;
use crate::events::EventHandler;
use crate::poll::{Sleeper, TokioSleeper};
use crate::PipelineError;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Default provider endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Environment variable holding the provider API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Shared execution context for pipeline runs.
///
/// # Example
///
/// ```
/// use flashcard_pipeline::{ExecCtx, MockBackend};
/// use std::sync::Arc;
///
/// let ctx = ExecCtx::builder("http://unused")
///     .backend(Arc::new(MockBackend::fixed("[]")))
///     .build()
///     .unwrap();
/// ```
pub struct ExecCtx {
    /// HTTP client (cheap to clone -- uses `Arc` internally).
    pub client: Client,
    /// Base URL for the provider, without a version suffix.
    pub base_url: String,
    /// Stateless completion surface.
    pub backend: Option<Arc<dyn Backend>>,
    /// Stateful assistant surface.
    pub assistant: Option<Arc<dyn AssistantApi>>,
    /// Transport retry configuration. Default: [`BackoffConfig::none()`].
    pub backoff: BackoffConfig,
    /// Sleeps between job polls. Default: [`TokioSleeper`].
    pub sleeper: Arc<dyn Sleeper>,
    /// Optional event handler for progress hooks.
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl ExecCtx {
    /// Create a new builder.
    pub fn builder(base_url: impl Into<String>) -> ExecCtxBuilder {
        ExecCtxBuilder {
            client: None,
            base_url: base_url.into(),
            backend: None,
            assistant: None,
            backoff: None,
            sleeper: None,
            event_handler: None,
            timeout: None,
        }
    }

    /// OpenAI context with the key from `OPENAI_API_KEY`.
    #[cfg(feature = "openai")]
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(API_KEY_ENV).map_err(|_| {
            PipelineError::InvalidConfig(format!("{} is not set", API_KEY_ENV))
        })?;
        Self::builder(DEFAULT_BASE_URL).openai_with_key(key).build()
    }

    /// The completion backend, or a config error when none was set.
    pub fn require_backend(&self) -> Result<&Arc<dyn Backend>> {
        self.backend.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfig("chunked strategy needs a completion backend".into())
        })
    }

    /// The assistant surface, or a config error when none was set.
    pub fn require_assistant(&self) -> Result<&Arc<dyn AssistantApi>> {
        self.assistant.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfig("assisted strategy needs an assistant API".into())
        })
    }
}

impl std::fmt::Debug for ExecCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecCtx")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("assistant", &self.assistant.as_ref().map(|a| a.name()))
            .field("backoff", &self.backoff)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Builder for [`ExecCtx`].
pub struct ExecCtxBuilder {
    client: Option<Client>,
    base_url: String,
    backend: Option<Arc<dyn Backend>>,
    assistant: Option<Arc<dyn AssistantApi>>,
    backoff: Option<BackoffConfig>,
    sleeper: Option<Arc<dyn Sleeper>>,
    event_handler: Option<Arc<dyn EventHandler>>,
    timeout: Option<Duration>,
}

impl ExecCtxBuilder {
    /// Set the HTTP client. If not set, a default client is created.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the completion backend.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the assistant surface.
    pub fn assistant(mut self, assistant: Arc<dyn AssistantApi>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    /// Use [`OpenAiBackend`] for both surfaces, authenticated with `api_key`.
    #[cfg(feature = "openai")]
    pub fn openai_with_key(mut self, api_key: impl Into<String>) -> Self {
        let backend = Arc::new(OpenAiBackend::new().with_api_key(api_key));
        self.backend = Some(backend.clone());
        self.assistant = Some(backend);
        self
    }

    /// Set the transport retry configuration. Default: [`BackoffConfig::none()`].
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Some(config);
        self
    }

    /// Set the poll sleeper. Default: [`TokioSleeper`].
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Set the request timeout. Default: 120 seconds.
    ///
    /// Ignored when a custom `Client` is provided via `.client()`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the execution context.
    pub fn build(self) -> Result<ExecCtx> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout.unwrap_or(Duration::from_secs(120)))
                .build()?,
        };
        Ok(ExecCtx {
            client,
            base_url: normalize_base_url(&self.base_url),
            backend: self.backend,
            assistant: self.assistant,
            backoff: self.backoff.unwrap_or_else(BackoffConfig::none),
            sleeper: self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
            event_handler: self.event_handler,
        })
    }
}

/// Strip known provider path suffixes from a base URL.
/// Backends append their own `/v1/...` paths.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    // Longest first
    for suffix in &["/v1/chat/completions", "/v1/assistants", "/v1"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}
