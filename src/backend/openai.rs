//! Backend for the OpenAI API.
//!
//! [`OpenAiBackend`] implements both remote surfaces:
//!
//! - [`Backend`]: `/v1/chat/completions`
//! - [`AssistantApi`]: `/v1/files`, `/v1/vector_stores`, `/v1/assistants`,
//!   `/v1/threads` (Assistants v2, sent with `OpenAI-Beta: assistants=v2`)
//!
//! Non-success responses become [`PipelineError::HttpError`] carrying the
//! provider's `error.code` so callers can tell rate limits from context
//! overflows.

use super::{AssistantApi, AssistantSpec, Backend, LlmRequest, LlmResponse, RemoteJob};
use crate::error::Result;
use crate::poll::JobStatus;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

const ASSISTANTS_BETA: &str = "assistants=v2";

/// Backend for the OpenAI API.
///
/// # Example
///
/// ```
/// use flashcard_pipeline::backend::OpenAiBackend;
///
/// let backend = OpenAiBackend::new().with_api_key("sk-...");
/// assert!(backend.has_api_key());
/// ```
#[derive(Clone)]
pub struct OpenAiBackend {
    /// Optional API key. If set, sent as `Authorization: Bearer {key}`.
    pub(crate) api_key: Option<String>,
    /// Optional organization ID. If set, sent as `OpenAI-Organization: {org}`.
    pub(crate) organization: Option<String>,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field(
                "api_key",
                &self.api_key.as_ref().map(|k| match k.get(..6) {
                    Some(prefix) if k.len() > 6 => format!("{}***", prefix),
                    _ => "***".to_string(),
                }),
            )
            .field("organization", &self.organization)
            .finish()
    }
}

/// Shape of `{"error": {"code": ..., "message": ...}}` bodies.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusObject {
    id: String,
    status: String,
    #[serde(default)]
    last_error: Option<LastError>,
    /// Present on vector-store file batches only.
    #[serde(default)]
    file_counts: Option<FileCounts>,
}

#[derive(Debug, Deserialize)]
struct FileCounts {
    #[serde(default)]
    completed: u64,
    #[serde(default)]
    failed: u64,
}

#[derive(Debug, Deserialize)]
struct LastError {
    code: Option<String>,
    message: Option<String>,
}

impl StatusObject {
    fn job_status(self) -> JobStatus {
        // A batch reports `completed` even when none of its files indexed.
        if let Some(counts) = &self.file_counts {
            if self.status == "completed" && counts.failed > 0 && counts.completed == 0 {
                return JobStatus::failed("indexing failed");
            }
        }

        let (reason, code) = match self.last_error {
            Some(e) => {
                let reason = match (&e.code, e.message) {
                    (Some(code), Some(message)) => format!("{}: {}", code, message),
                    (Some(code), None) => code.clone(),
                    (None, Some(message)) => message,
                    (None, None) => "unknown error".to_string(),
                };
                (Some(reason), e.code)
            }
            None => (None, None),
        };
        JobStatus::from_remote(&self.status, reason).with_code(code)
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
}

impl<T> ListResponse<T> {
    /// Cursor for the next page, if there is one.
    fn next_after(&self, id: impl Fn(&T) -> &str) -> Option<String> {
        if !self.has_more {
            return None;
        }
        self.data.last().map(|item| id(item).to_string())
    }
}

#[derive(Debug, Deserialize)]
struct AssistantSummary {
    id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<Value>,
}

impl ThreadMessage {
    /// Concatenated text parts.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|part| part.pointer("/text/value").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl OpenAiBackend {
    /// Create a new backend without authentication.
    pub fn new() -> Self {
        Self {
            api_key: None,
            organization: None,
        }
    }

    /// Set the API key for authentication.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the organization ID header.
    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    /// Returns `true` if an API key has been configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Build the request body for `/v1/chat/completions`.
    fn build_body(request: &LlmRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(ref sys) = request.system_prompt {
            if !sys.is_empty() {
                messages.push(json!({"role": "system", "content": sys}));
            }
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.config.temperature,
            "max_tokens": request.config.max_tokens,
        });

        if request.config.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        body
    }

    /// Body for assistant create and modify calls.
    fn assistant_body(spec: &AssistantSpec, store_id: Option<&str>) -> Value {
        let mut body = json!({
            "name": spec.name,
            "model": spec.model,
            "instructions": spec.instructions,
            "tools": [{"type": "file_search"}],
        });
        if spec.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        if let Some(store_id) = store_id {
            body["tool_resources"] = json!({"file_search": {"vector_store_ids": [store_id]}});
        }
        body
    }

    /// Parse a `Retry-After` header value as seconds.
    fn parse_retry_after(value: &str) -> Option<std::time::Duration> {
        value
            .trim()
            .parse::<u64>()
            .ok()
            .map(std::time::Duration::from_secs)
    }

    /// Pull `error.code` (or `error.type`) out of an error body.
    fn error_code(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .and_then(|env| env.error.code.or(env.error.kind))
    }

    /// Attach auth headers.
    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let mut req = req;
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(ref org) = self.organization {
            req = req.header("OpenAI-Organization", org.as_str());
        }
        req
    }

    /// Attach auth headers plus the Assistants v2 beta header.
    fn beta(&self, req: RequestBuilder) -> RequestBuilder {
        self.authorize(req).header("OpenAI-Beta", ASSISTANTS_BETA)
    }

    /// Send a request, converting non-success statuses into `HttpError`.
    async fn send(req: RequestBuilder) -> Result<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse_retry_after);
        let body = resp.text().await.unwrap_or_default();
        Err(PipelineError::HttpError {
            status: status.as_u16(),
            code: Self::error_code(&body),
            body,
            retry_after,
        })
    }

    async fn send_json<T: serde::de::DeserializeOwned>(req: RequestBuilder) -> Result<T> {
        let resp = Self::send(req).await?;
        Ok(resp.json::<T>().await?)
    }

    /// Extract metadata from a completion response.
    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let mut meta = serde_json::Map::new();
        for key in ["usage", "model", "id"] {
            if let Some(v) = json_resp.get(key) {
                meta.insert(key.into(), v.clone());
            }
        }
        (!meta.is_empty()).then_some(Value::Object(meta))
    }

    fn url(base_url: &str, path: &str) -> String {
        format!("{}/v1/{}", base_url.trim_end_matches('/'), path)
    }
}

impl Default for OpenAiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let url = Self::url(base_url, "chat/completions");
        let body = Self::build_body(request);

        let resp = Self::send(self.authorize(client.post(&url).json(&body))).await?;
        let status = resp.status().as_u16();
        let json_resp: Value = resp.json().await?;

        let text = json_resp
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        Ok(LlmResponse {
            text,
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[async_trait]
impl AssistantApi for OpenAiBackend {
    async fn upload_file(
        &self,
        client: &Client,
        base_url: &str,
        path: &Path,
        file_name: &str,
    ) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);
        let req = self.authorize(client.post(Self::url(base_url, "files")).multipart(form));
        Ok(Self::send_json::<IdOnly>(req).await?.id)
    }

    async fn create_vector_store(
        &self,
        client: &Client,
        base_url: &str,
        name: &str,
    ) -> Result<String> {
        let req = self.beta(
            client
                .post(Self::url(base_url, "vector_stores"))
                .json(&json!({"name": name})),
        );
        Ok(Self::send_json::<IdOnly>(req).await?.id)
    }

    async fn attach_file_batch(
        &self,
        client: &Client,
        base_url: &str,
        store_id: &str,
        file_id: &str,
    ) -> Result<RemoteJob> {
        let path = format!("vector_stores/{}/file_batches", store_id);
        let req = self.beta(
            client
                .post(Self::url(base_url, &path))
                .json(&json!({"file_ids": [file_id]})),
        );
        let batch: StatusObject = Self::send_json(req).await?;
        Ok(RemoteJob {
            id: batch.id.clone(),
            status: batch.job_status(),
        })
    }

    async fn get_file_batch(
        &self,
        client: &Client,
        base_url: &str,
        store_id: &str,
        batch_id: &str,
    ) -> Result<JobStatus> {
        let path = format!("vector_stores/{}/file_batches/{}", store_id, batch_id);
        let req = self.beta(client.get(Self::url(base_url, &path)));
        let batch: StatusObject = Self::send_json(req).await?;
        Ok(batch.job_status())
    }

    async fn find_assistant(
        &self,
        client: &Client,
        base_url: &str,
        name: &str,
    ) -> Result<Option<String>> {
        let mut after: Option<String> = None;
        loop {
            let mut query = vec![("limit", "100".to_string()), ("order", "desc".to_string())];
            if let Some(cursor) = after.take() {
                query.push(("after", cursor));
            }
            let req = self.beta(client.get(Self::url(base_url, "assistants")).query(&query));
            let page: ListResponse<AssistantSummary> = Self::send_json(req).await?;

            if let Some(found) = page.data.iter().find(|a| a.name.as_deref() == Some(name)) {
                return Ok(Some(found.id.clone()));
            }
            match page.next_after(|a| a.id.as_str()) {
                Some(cursor) => {
                    debug!(after = %cursor, "assistant not on this page, fetching next");
                    after = Some(cursor);
                }
                None => return Ok(None),
            }
        }
    }

    async fn create_assistant(
        &self,
        client: &Client,
        base_url: &str,
        spec: &AssistantSpec,
    ) -> Result<String> {
        let req = self.beta(
            client
                .post(Self::url(base_url, "assistants"))
                .json(&Self::assistant_body(spec, None)),
        );
        Ok(Self::send_json::<IdOnly>(req).await?.id)
    }

    async fn bind_assistant(
        &self,
        client: &Client,
        base_url: &str,
        assistant_id: &str,
        spec: &AssistantSpec,
        store_id: &str,
    ) -> Result<()> {
        let path = format!("assistants/{}", assistant_id);
        let req = self.beta(
            client
                .post(Self::url(base_url, &path))
                .json(&Self::assistant_body(spec, Some(store_id))),
        );
        Self::send(req).await?;
        Ok(())
    }

    async fn create_thread(&self, client: &Client, base_url: &str) -> Result<String> {
        let req = self.beta(client.post(Self::url(base_url, "threads")).json(&json!({})));
        Ok(Self::send_json::<IdOnly>(req).await?.id)
    }

    async fn add_message(
        &self,
        client: &Client,
        base_url: &str,
        thread_id: &str,
        content: &str,
    ) -> Result<()> {
        let path = format!("threads/{}/messages", thread_id);
        let req = self.beta(
            client
                .post(Self::url(base_url, &path))
                .json(&json!({"role": "user", "content": content})),
        );
        Self::send(req).await?;
        Ok(())
    }

    async fn create_run(
        &self,
        client: &Client,
        base_url: &str,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<RemoteJob> {
        let path = format!("threads/{}/runs", thread_id);
        let req = self.beta(
            client
                .post(Self::url(base_url, &path))
                .json(&json!({"assistant_id": assistant_id})),
        );
        let run: StatusObject = Self::send_json(req).await?;
        Ok(RemoteJob {
            id: run.id.clone(),
            status: run.job_status(),
        })
    }

    async fn get_run(
        &self,
        client: &Client,
        base_url: &str,
        thread_id: &str,
        run_id: &str,
    ) -> Result<JobStatus> {
        let path = format!("threads/{}/runs/{}", thread_id, run_id);
        let req = self.beta(client.get(Self::url(base_url, &path)));
        let run: StatusObject = Self::send_json(req).await?;
        Ok(run.job_status())
    }

    async fn latest_assistant_message(
        &self,
        client: &Client,
        base_url: &str,
        thread_id: &str,
    ) -> Result<Option<String>> {
        let path = format!("threads/{}/messages", thread_id);
        let req = self.beta(
            client
                .get(Self::url(base_url, &path))
                .query(&[("order", "desc"), ("limit", "20")]),
        );
        let list: ListResponse<ThreadMessage> = Self::send_json(req).await?;
        Ok(list
            .data
            .iter()
            .find(|m| m.role == "assistant")
            .map(ThreadMessage::text))
    }

    async fn delete_vector_store(
        &self,
        client: &Client,
        base_url: &str,
        store_id: &str,
    ) -> Result<()> {
        let path = format!("vector_stores/{}", store_id);
        Self::send(self.beta(client.delete(Self::url(base_url, &path)))).await?;
        Ok(())
    }

    async fn delete_file(&self, client: &Client, base_url: &str, file_id: &str) -> Result<()> {
        let path = format!("files/{}", file_id);
        Self::send(self.authorize(client.delete(Self::url(base_url, &path)))).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
