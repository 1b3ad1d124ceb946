//! Stateful generation over an indexed copy of the whole file.
//!
//! Request lifecycle:
//!
//! ```text
//! stage temp file ─► upload ─► create store ─► attach batch ─► poll indexing
//!   ─► find or create assistant ─► bind to store ─► thread + message
//!   ─► run ─► poll generation ─► latest assistant message ─► strict parse
//!   ─► remote cleanup (best effort) ─► temp file removed
//! ```
//!
//! The temp file lives in a [`NamedTempFile`], so it is removed on every
//! return path, including errors and unwinding.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use tempfile::NamedTempFile;

use super::GenerationStrategy;
use crate::backend::{AssistantApi, AssistantSpec};
use crate::config::{AssistantConfig, PipelineConfig};
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::output_parser::{parse_flashcards, ParseError};
use crate::poll::{JobKind, Poll};
use crate::prompt::ASSISTANT_REQUEST;
use crate::types::{Document, PipelineResult};

const FALLBACK_FILE_NAME: &str = "document.txt";

/// Remote resources created for one request, released afterwards.
#[derive(Debug, Default)]
struct RemoteHandles {
    file_id: Option<String>,
    store_id: Option<String>,
}

/// Run a single assistant job over the uploaded document.
///
/// The result always reports one unit, and the validated cards are returned
/// in full with no local cap. Any failing record rejects the whole reply.
#[derive(Debug, Clone)]
pub struct AssistedJob {
    model: String,
    assistant: AssistantConfig,
}

impl AssistedJob {
    pub fn new(model: impl Into<String>, assistant: AssistantConfig) -> Self {
        Self {
            model: model.into(),
            assistant,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.model.clone(), config.assistant.clone())
    }

    fn spec(&self) -> AssistantSpec {
        self.assistant.spec(&self.model)
    }

    /// Upload name for the document. Indexing keys off the extension.
    fn upload_name(document: &Document) -> &str {
        match document.file_name.trim() {
            "" => FALLBACK_FILE_NAME,
            name => name,
        }
    }

    /// Copy the document into a request-exclusive temp file.
    fn stage(document: &Document) -> Result<NamedTempFile> {
        let suffix = Path::new(Self::upload_name(document))
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_else(|| ".txt".to_string());

        let mut file = tempfile::Builder::new()
            .prefix("flashcards-")
            .suffix(&suffix)
            .tempfile()?;
        std::io::Write::write_all(&mut file, &document.bytes)?;
        std::io::Write::flush(&mut file)?;
        Ok(file)
    }

    /// Upload and index the file. Returns the store id once indexing completes.
    async fn index(
        &self,
        ctx: &ExecCtx,
        api: &dyn AssistantApi,
        path: &Path,
        document: &Document,
        handles: &mut RemoteHandles,
    ) -> Result<String> {
        let (client, base) = (&ctx.client, ctx.base_url.as_str());

        let file_id = api
            .upload_file(client, base, path, Self::upload_name(document))
            .await?;
        handles.file_id = Some(file_id.clone());

        let store_id = api
            .create_vector_store(client, base, &format!("flashcards-{}", file_id))
            .await?;
        handles.store_id = Some(store_id.clone());

        let batch = api.attach_file_batch(client, base, &store_id, &file_id).await?;
        tracing::debug!(%file_id, %store_id, batch_id = %batch.id, "indexing started");

        Poll {
            job: JobKind::Indexing,
            id: &batch.id,
            config: self.assistant.indexing_poll(),
            sleeper: ctx.sleeper.as_ref(),
            events: &ctx.event_handler,
        }
        .until_terminal(batch.status, || {
            api.get_file_batch(client, base, &store_id, &batch.id)
        })
        .await?;

        Ok(store_id)
    }

    /// Reuse the named assistant when it exists, then re-apply its config.
    async fn prepare_assistant(
        &self,
        client: &Client,
        base: &str,
        api: &dyn AssistantApi,
        store_id: &str,
    ) -> Result<String> {
        let spec = self.spec();
        let assistant_id = match api.find_assistant(client, base, &spec.name).await? {
            Some(id) => {
                tracing::debug!(assistant_id = %id, "reusing assistant");
                id
            }
            None => {
                let id = api.create_assistant(client, base, &spec).await?;
                tracing::info!(assistant_id = %id, name = %spec.name, "created assistant");
                id
            }
        };
        api.bind_assistant(client, base, &assistant_id, &spec, store_id)
            .await?;
        Ok(assistant_id)
    }

    /// Everything that touches the remote, in order.
    async fn drive(
        &self,
        ctx: &ExecCtx,
        api: &dyn AssistantApi,
        path: &Path,
        document: &Document,
        handles: &mut RemoteHandles,
    ) -> Result<PipelineResult> {
        let (client, base) = (&ctx.client, ctx.base_url.as_str());

        let store_id = self.index(ctx, api, path, document, handles).await?;
        let assistant_id = self.prepare_assistant(client, base, api, &store_id).await?;

        let thread_id = api.create_thread(client, base).await?;
        api.add_message(client, base, &thread_id, ASSISTANT_REQUEST)
            .await?;
        let run = api.create_run(client, base, &thread_id, &assistant_id).await?;
        tracing::debug!(%thread_id, run_id = %run.id, "generation started");

        Poll {
            job: JobKind::Generation,
            id: &run.id,
            config: self.assistant.generation_poll(),
            sleeper: ctx.sleeper.as_ref(),
            events: &ctx.event_handler,
        }
        .until_terminal(run.status, || api.get_run(client, base, &thread_id, &run.id))
        .await?;

        let reply = api
            .latest_assistant_message(client, base, &thread_id)
            .await?
            .ok_or(ParseError::EmptyResponse)?;
        let flashcards = parse_flashcards(&reply)?;

        Ok(PipelineResult {
            flashcards,
            total_chunks: 1,
            processed_chunks: 1,
        })
    }

    /// Delete what [`drive`](Self::drive) created. Failures are only logged.
    async fn release(&self, ctx: &ExecCtx, api: &dyn AssistantApi, handles: RemoteHandles) {
        let (client, base) = (&ctx.client, ctx.base_url.as_str());
        if let Some(store_id) = handles.store_id {
            if let Err(e) = api.delete_vector_store(client, base, &store_id).await {
                tracing::warn!(%store_id, error = %e, "failed to delete vector store");
            }
        }
        if let Some(file_id) = handles.file_id {
            if let Err(e) = api.delete_file(client, base, &file_id).await {
                tracing::warn!(%file_id, error = %e, "failed to delete uploaded file");
            }
        }
    }
}

#[async_trait]
impl GenerationStrategy for AssistedJob {
    fn name(&self) -> &'static str {
        "assisted"
    }

    async fn generate(&self, ctx: &ExecCtx, document: &Document) -> Result<PipelineResult> {
        let api = ctx.require_assistant()?.as_ref();
        let staged = Self::stage(document)?;
        tracing::debug!(path = %staged.path().display(), bytes = document.bytes.len(), "staged upload");

        let mut handles = RemoteHandles::default();
        let outcome = self
            .drive(ctx, api, staged.path(), document, &mut handles)
            .await;

        if self.assistant.cleanup_remote {
            self.release(ctx, api, handles).await;
        }
        if let Err(e) = staged.close() {
            tracing::warn!(error = %e, "failed to remove staged upload");
        }

        if let Ok(ref result) = outcome {
            tracing::info!(flashcards = result.flashcards.len(), "assistant job finished");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockAssistantApi;
    use crate::poll::{InstantSleeper, JobStatus};
    use crate::PipelineError;
    use std::sync::Arc;
    use std::time::Duration;

    const REPLY: &str = r#"{"flashcards": [
        {"question": "Q1", "answer": "A1"},
        {"question": "Q2", "answer": "A2"}
    ]}"#;

    fn ctx(api: Arc<MockAssistantApi>, sleeper: Arc<InstantSleeper>) -> ExecCtx {
        ExecCtx::builder("http://unused")
            .assistant(api)
            .sleeper(sleeper)
            .build()
            .unwrap()
    }

    fn job() -> AssistedJob {
        AssistedJob::new("gpt-4o", AssistantConfig::default())
    }

    #[tokio::test]
    async fn happy_path_runs_every_step_in_order() {
        let api = Arc::new(MockAssistantApi::new(REPLY));
        let sleeper = Arc::new(InstantSleeper::new());
        let result = job()
            .generate(&ctx(api.clone(), sleeper.clone()), &Document::text("notes.txt", "Cells."))
            .await
            .unwrap();

        assert_eq!(result.flashcards.len(), 2);
        assert_eq!(result.total_chunks, 1);
        assert_eq!(result.processed_chunks, 1);
        assert_eq!(
            api.calls(),
            vec![
                "upload_file",
                "create_vector_store",
                "attach_file_batch",
                "get_file_batch",
                "find_assistant",
                "create_assistant",
                "bind_assistant",
                "create_thread",
                "add_message",
                "create_run",
                "get_run",
                "latest_assistant_message",
                "delete_vector_store",
                "delete_file",
            ]
        );
        assert_eq!(api.messages(), vec![ASSISTANT_REQUEST.to_string()]);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1); 2]);
    }

    #[tokio::test]
    async fn temp_file_is_removed_after_success() {
        let api = Arc::new(MockAssistantApi::new(REPLY));
        job()
            .generate(
                &ctx(api.clone(), Arc::new(InstantSleeper::new())),
                &Document::new("paper.pdf", "application/pdf", b"%PDF-1.4".to_vec()),
            )
            .await
            .unwrap();

        let paths = api.uploaded_paths();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].extension().and_then(|e| e.to_str()), Some("pdf"));
        assert!(!paths[0].exists());
    }

    #[tokio::test]
    async fn invalid_record_rejects_the_batch() {
        let api = Arc::new(MockAssistantApi::new(
            r#"[{"question": "Q1", "answer": "A1"}, {"question": "", "answer": "A2"}]"#,
        ));
        let err = job()
            .generate(&ctx(api.clone(), Arc::new(InstantSleeper::new())), &Document::text("a.txt", "x."))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Parse(ParseError::InvalidRecord { index: 1, .. })
        ));
        assert!(api.calls().contains(&"delete_file"));
    }

    #[tokio::test]
    async fn missing_reply_is_a_parse_error() {
        let api = Arc::new(MockAssistantApi::new("").without_reply());
        let err = job()
            .generate(&ctx(api, Arc::new(InstantSleeper::new())), &Document::text("a.txt", "x."))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Parse(ParseError::EmptyResponse)));
    }

    #[tokio::test]
    async fn indexing_failure_stops_before_generation() {
        let api = Arc::new(MockAssistantApi::new(REPLY).with_batch_statuses(
            vec![JobStatus::InProgress],
            JobStatus::failed("unsupported_file"),
        ));
        let err = job()
            .generate(&ctx(api.clone(), Arc::new(InstantSleeper::new())), &Document::text("a.txt", "x."))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::JobFailed { job: JobKind::Indexing, .. }));
        let calls = api.calls();
        assert!(!calls.contains(&"create_run"));
        assert!(calls.contains(&"delete_vector_store"));
        assert!(!api.uploaded_paths()[0].exists());
    }

    #[tokio::test]
    async fn cleanup_can_be_disabled() {
        let api = Arc::new(MockAssistantApi::new(REPLY));
        let config = AssistantConfig {
            cleanup_remote: false,
            ..AssistantConfig::default()
        };
        AssistedJob::new("gpt-4o", config)
            .generate(&ctx(api.clone(), Arc::new(InstantSleeper::new())), &Document::text("a.txt", "x."))
            .await
            .unwrap();
        let calls = api.calls();
        assert!(!calls.contains(&"delete_vector_store"));
        assert!(!calls.contains(&"delete_file"));
    }

    #[test]
    fn upload_name_falls_back() {
        assert_eq!(AssistedJob::upload_name(&Document::text(" ", "x")), FALLBACK_FILE_NAME);
        assert_eq!(AssistedJob::upload_name(&Document::text("a.md", "x")), "a.md");
    }
}
