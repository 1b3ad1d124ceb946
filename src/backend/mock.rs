//! Mock remotes for testing without a live provider.
//!
//! [`MockBackend`] returns scripted completion replies in order.
//! [`MockAssistantApi`] scripts indexing and run statuses and records every
//! call, so the assisted strategy can be checked for sequencing and cleanup.
//!
//! # Example
//!
//! ```
//! use flashcard_pipeline::backend::{MockBackend, MockReply};
//!
//! let mock = MockBackend::fixed(r#"{"flashcards": []}"#);
//! let flaky = MockBackend::from_replies(vec![
//!     MockReply::text(r#"{"flashcards": []}"#),
//!     MockReply::http_error(429, Some("rate_limit_exceeded")),
//! ]);
//! ```

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;

use super::{AssistantApi, AssistantSpec, Backend, LlmRequest, LlmResponse, RemoteJob};
use crate::error::Result;
use crate::poll::JobStatus;
use crate::PipelineError;

/// One scripted completion outcome.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    HttpError { status: u16, code: Option<String> },
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn http_error(status: u16, code: Option<&str>) -> Self {
        MockReply::HttpError {
            status,
            code: code.map(str::to_string),
        }
    }
}

/// A test backend that returns scripted replies in order.
///
/// Cycles back to the beginning when all replies have been consumed.
/// Every request is recorded for later inspection.
#[derive(Debug)]
pub struct MockBackend {
    replies: Vec<MockReply>,
    index: AtomicUsize,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockBackend {
    /// Create a mock backend with canned text responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self::from_replies(responses.into_iter().map(MockReply::Text).collect())
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Create a mock from scripted outcomes.
    pub fn from_replies(replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "MockBackend requires at least one reply");
        Self {
            replies,
            index: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of completions requested so far.
    pub fn call_count(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    /// User prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|req| req.prompt.clone()).collect())
            .unwrap_or_default()
    }

    /// Full requests received so far, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        match &self.replies[idx] {
            MockReply::Text(text) => Ok(LlmResponse {
                text: text.clone(),
                status: 200,
                metadata: None,
            }),
            MockReply::HttpError { status, code } => Err(PipelineError::HttpError {
                status: *status,
                body: format!("mock error {}", status),
                retry_after: None,
                code: code.clone(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug, Default)]
struct AssistantState {
    calls: Vec<&'static str>,
    uploaded_paths: Vec<PathBuf>,
    batch_statuses: VecDeque<JobStatus>,
    run_statuses: VecDeque<JobStatus>,
    bound_stores: Vec<String>,
    created_assistants: usize,
    messages: Vec<String>,
}

/// A scriptable stand-in for the assistant surface.
///
/// Status scripts are consumed one entry per poll; once a script runs dry
/// the last configured `*_tail` status repeats (default: completed).
#[derive(Debug)]
pub struct MockAssistantApi {
    state: Mutex<AssistantState>,
    existing_assistant: Option<String>,
    reply: Option<String>,
    batch_tail: JobStatus,
    run_tail: JobStatus,
    fail_upload: bool,
}

impl MockAssistantApi {
    /// Indexing and runs complete on the first poll; the reply is `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(AssistantState::default()),
            existing_assistant: None,
            reply: Some(reply.into()),
            batch_tail: JobStatus::Completed,
            run_tail: JobStatus::Completed,
            fail_upload: false,
        }
    }

    /// Pretend an assistant with the configured name already exists.
    pub fn with_existing_assistant(mut self, id: impl Into<String>) -> Self {
        self.existing_assistant = Some(id.into());
        self
    }

    /// Script indexing statuses, then repeat `tail` forever.
    pub fn with_batch_statuses(mut self, statuses: Vec<JobStatus>, tail: JobStatus) -> Self {
        self.state_mut().batch_statuses = statuses.into();
        self.batch_tail = tail;
        self
    }

    /// Script run statuses, then repeat `tail` forever.
    pub fn with_run_statuses(mut self, statuses: Vec<JobStatus>, tail: JobStatus) -> Self {
        self.state_mut().run_statuses = statuses.into();
        self.run_tail = tail;
        self
    }

    /// The thread carries no assistant reply.
    pub fn without_reply(mut self) -> Self {
        self.reply = None;
        self
    }

    /// Fail the upload step with a 413 `context_length_exceeded`.
    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    /// Names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Local paths handed to `upload_file`.
    pub fn uploaded_paths(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .map(|s| s.uploaded_paths.clone())
            .unwrap_or_default()
    }

    /// Store ids the assistant was bound to, one per request.
    pub fn bound_stores(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.bound_stores.clone())
            .unwrap_or_default()
    }

    /// Number of assistants created.
    pub fn created_assistants(&self) -> usize {
        self.state.lock().map(|s| s.created_assistants).unwrap_or(0)
    }

    /// User messages posted to threads.
    pub fn messages(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    fn state_mut(&mut self) -> &mut AssistantState {
        self.state.get_mut().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: &'static str) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(call);
        state.calls.iter().filter(|c| **c == call).count()
    }

    fn next_status(&self, batch: bool) -> JobStatus {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (queue, tail) = if batch {
            (&mut state.batch_statuses, &self.batch_tail)
        } else {
            (&mut state.run_statuses, &self.run_tail)
        };
        queue.pop_front().unwrap_or_else(|| tail.clone())
    }
}

#[async_trait]
impl AssistantApi for MockAssistantApi {
    async fn upload_file(
        &self,
        _client: &Client,
        _base_url: &str,
        path: &Path,
        _file_name: &str,
    ) -> Result<String> {
        let n = self.record("upload_file");
        if let Ok(mut state) = self.state.lock() {
            state.uploaded_paths.push(path.to_path_buf());
        }
        if self.fail_upload {
            return Err(PipelineError::HttpError {
                status: 413,
                body: "file too large".into(),
                retry_after: None,
                code: Some("context_length_exceeded".into()),
            });
        }
        // The file must exist while it is being uploaded.
        if !path.exists() {
            return Err(PipelineError::Other(format!("{} missing", path.display())));
        }
        Ok(format!("file_{}", n))
    }

    async fn create_vector_store(&self, _: &Client, _: &str, _name: &str) -> Result<String> {
        let n = self.record("create_vector_store");
        Ok(format!("vs_{}", n))
    }

    async fn attach_file_batch(
        &self,
        _: &Client,
        _: &str,
        _store_id: &str,
        _file_id: &str,
    ) -> Result<RemoteJob> {
        let n = self.record("attach_file_batch");
        Ok(RemoteJob {
            id: format!("vsfb_{}", n),
            status: JobStatus::InProgress,
        })
    }

    async fn get_file_batch(&self, _: &Client, _: &str, _: &str, _: &str) -> Result<JobStatus> {
        self.record("get_file_batch");
        Ok(self.next_status(true))
    }

    async fn find_assistant(&self, _: &Client, _: &str, _name: &str) -> Result<Option<String>> {
        self.record("find_assistant");
        let created = self.state.lock().map(|s| s.created_assistants).unwrap_or(0);
        if created > 0 {
            return Ok(Some(format!("asst_{}", created)));
        }
        Ok(self.existing_assistant.clone())
    }

    async fn create_assistant(&self, _: &Client, _: &str, _spec: &AssistantSpec) -> Result<String> {
        self.record("create_assistant");
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.created_assistants += 1;
        Ok(format!("asst_{}", state.created_assistants))
    }

    async fn bind_assistant(
        &self,
        _: &Client,
        _: &str,
        _assistant_id: &str,
        _spec: &AssistantSpec,
        store_id: &str,
    ) -> Result<()> {
        self.record("bind_assistant");
        if let Ok(mut state) = self.state.lock() {
            state.bound_stores.push(store_id.to_string());
        }
        Ok(())
    }

    async fn create_thread(&self, _: &Client, _: &str) -> Result<String> {
        let n = self.record("create_thread");
        Ok(format!("thread_{}", n))
    }

    async fn add_message(&self, _: &Client, _: &str, _thread_id: &str, content: &str) -> Result<()> {
        self.record("add_message");
        if let Ok(mut state) = self.state.lock() {
            state.messages.push(content.to_string());
        }
        Ok(())
    }

    async fn create_run(
        &self,
        _: &Client,
        _: &str,
        _thread_id: &str,
        _assistant_id: &str,
    ) -> Result<RemoteJob> {
        let n = self.record("create_run");
        Ok(RemoteJob {
            id: format!("run_{}", n),
            status: JobStatus::Queued,
        })
    }

    async fn get_run(&self, _: &Client, _: &str, _: &str, _: &str) -> Result<JobStatus> {
        self.record("get_run");
        Ok(self.next_status(false))
    }

    async fn latest_assistant_message(
        &self,
        _: &Client,
        _: &str,
        _thread_id: &str,
    ) -> Result<Option<String>> {
        self.record("latest_assistant_message");
        Ok(self.reply.clone())
    }

    async fn delete_vector_store(&self, _: &Client, _: &str, _store_id: &str) -> Result<()> {
        self.record("delete_vector_store");
        Ok(())
    }

    async fn delete_file(&self, _: &Client, _: &str, _file_id: &str) -> Result<()> {
        self.record("delete_file");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;

    fn request() -> LlmRequest {
        LlmRequest {
            model: "test".to_string(),
            system_prompt: None,
            prompt: "test".to_string(),
            config: LlmConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_mock_fixed_response() {
        let mock = MockBackend::fixed("Hello!");
        let resp = mock
            .complete(&Client::new(), "http://unused", &request())
            .await
            .unwrap();
        assert_eq!(resp.text, "Hello!");
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn test_mock_cycles_and_records() {
        let mock = MockBackend::from_replies(vec![
            MockReply::text("first"),
            MockReply::http_error(429, Some("rate_limit_exceeded")),
        ]);
        let client = Client::new();
        let r1 = mock.complete(&client, "http://unused", &request()).await;
        let r2 = mock.complete(&client, "http://unused", &request()).await;
        let r3 = mock.complete(&client, "http://unused", &request()).await;
        assert_eq!(r1.unwrap().text, "first");
        assert!(matches!(r2, Err(PipelineError::HttpError { status: 429, .. })));
        assert_eq!(r3.unwrap().text, "first");
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_assistant_status_scripts() {
        let api = MockAssistantApi::new("[]").with_run_statuses(
            vec![JobStatus::Queued, JobStatus::InProgress],
            JobStatus::Completed,
        );
        let client = Client::new();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(api.get_run(&client, "", "t", "r").await.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                JobStatus::Queued,
                JobStatus::InProgress,
                JobStatus::Completed,
                JobStatus::Completed
            ]
        );
        assert_eq!(api.calls(), vec!["get_run"; 4]);
    }

    #[tokio::test]
    async fn test_assistant_lookup_after_create() {
        let api = MockAssistantApi::new("[]");
        let client = Client::new();
        assert_eq!(api.find_assistant(&client, "", "x").await.unwrap(), None);
        let id = api
            .create_assistant(
                &client,
                "",
                &AssistantSpec {
                    name: "x".into(),
                    model: "m".into(),
                    instructions: "i".into(),
                    json_mode: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(api.find_assistant(&client, "", "x").await.unwrap(), Some(id));
    }
}
