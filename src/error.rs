use std::time::Duration;
use thiserror::Error;

use crate::output_parser::ParseError;
use crate::poll::JobKind;

/// Errors produced by the pipeline and its components.
///
/// These carry full internal detail for logging. Callers outside the crate
/// should see a [`PipelineFailure`] instead, built with
/// [`PipelineError::to_failure`].
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level (provider envelope, not model output).
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Local filesystem failure while staging an upload.
    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The model output could not be read as flashcards.
    #[error("flashcard parsing failed: {0}")]
    Parse(#[from] ParseError),

    /// No document was supplied to the pipeline.
    #[error("no document supplied")]
    InputMissing,

    /// A remote job reached a terminal failure status.
    #[error("{job} job {id} failed: {}", reason.as_deref().unwrap_or("no reason reported"))]
    JobFailed {
        job: JobKind,
        id: String,
        /// Reason reported by the remote service, if any.
        reason: Option<String>,
        /// Machine-readable error code reported by the remote service, if any.
        code: Option<String>,
    },

    /// Polling gave up before the remote job reached a terminal status.
    #[error("{job} job {id} did not finish after {attempts} polls")]
    JobTimedOut {
        job: JobKind,
        id: String,
        attempts: u32,
    },

    /// Invalid configuration detected at build or load time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Backend`](crate::backend::Backend) and
    /// [`AssistantApi`](crate::backend::AssistantApi) implementations when the
    /// provider returns a non-success status code. `code` is the provider's
    /// machine-readable error code (e.g. `rate_limit_exceeded`) when the body
    /// carries one.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
        /// Provider error code from the JSON error body, if present.
        code: Option<String>,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// The small, caller-facing failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InputMissing,
    RateLimited,
    ContentTooLarge,
    JobFailed,
    JobTimedOut,
    ParseError,
    Unclassified,
}

impl FailureKind {
    /// Message safe to show an end user.
    pub fn message(self) -> &'static str {
        match self {
            FailureKind::InputMissing => "No file provided",
            FailureKind::RateLimited => {
                "Rate limit exceeded. Please try again with a smaller document or wait a few minutes."
            }
            FailureKind::ContentTooLarge => {
                "Document is too large. Please try with a smaller document."
            }
            FailureKind::JobFailed => "Flashcard generation failed. Please try again.",
            FailureKind::JobTimedOut => {
                "Flashcard generation took too long. Please try again later."
            }
            FailureKind::ParseError => {
                "The generated flashcards could not be read. Please try again."
            }
            FailureKind::Unclassified => "Failed to generate flashcards. Please try again.",
        }
    }

    /// HTTP status an outer route layer should answer with.
    pub fn http_status(self) -> u16 {
        match self {
            FailureKind::InputMissing => 400,
            FailureKind::RateLimited => 429,
            FailureKind::ContentTooLarge => 413,
            FailureKind::JobFailed | FailureKind::ParseError => 502,
            FailureKind::JobTimedOut => 504,
            FailureKind::Unclassified => 500,
        }
    }
}

/// A classified failure, safe to hand to an external caller.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PipelineFailure {
    pub kind: FailureKind,
    #[serde(rename = "error")]
    pub message: &'static str,
    /// Remote-reported reason, only ever set for [`FailureKind::JobFailed`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message)
    }
}

impl std::error::Error for PipelineFailure {}

impl From<FailureKind> for PipelineFailure {
    fn from(kind: FailureKind) -> Self {
        Self {
            kind,
            message: kind.message(),
            reason: None,
        }
    }
}

const RATE_LIMIT_CODE: &str = "rate_limit_exceeded";
const CONTEXT_LENGTH_CODE: &str = "context_length_exceeded";

impl PipelineError {
    /// Classify this error into the caller-facing taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::InputMissing => FailureKind::InputMissing,
            PipelineError::HttpError { status, code, .. } => {
                code_kind(code.as_deref()).unwrap_or(match status {
                    429 => FailureKind::RateLimited,
                    413 => FailureKind::ContentTooLarge,
                    _ => FailureKind::Unclassified,
                })
            }
            PipelineError::JobFailed { code, .. } => {
                code_kind(code.as_deref()).unwrap_or(FailureKind::JobFailed)
            }
            PipelineError::JobTimedOut { .. } => FailureKind::JobTimedOut,
            PipelineError::Parse(_) => FailureKind::ParseError,
            _ => FailureKind::Unclassified,
        }
    }

    /// Build the caller-facing failure. Only the remote job reason survives.
    pub fn to_failure(&self) -> PipelineFailure {
        let mut failure = PipelineFailure::from(self.kind());
        if let PipelineError::JobFailed { reason, .. } = self {
            if failure.kind == FailureKind::JobFailed {
                failure.reason = reason.clone();
            }
        }
        failure
    }
}

/// Provider error codes that name a failure kind on their own, whichever
/// surface reported them.
fn code_kind(code: Option<&str>) -> Option<FailureKind> {
    match code? {
        RATE_LIMIT_CODE => Some(FailureKind::RateLimited),
        CONTEXT_LENGTH_CODE => Some(FailureKind::ContentTooLarge),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, code: Option<&str>) -> PipelineError {
        PipelineError::HttpError {
            status,
            body: "{}".into(),
            retry_after: None,
            code: code.map(str::to_string),
        }
    }

    #[test]
    fn test_provider_codes_win_over_status() {
        assert_eq!(http(400, Some("context_length_exceeded")).kind(), FailureKind::ContentTooLarge);
        assert_eq!(http(400, Some("rate_limit_exceeded")).kind(), FailureKind::RateLimited);
    }

    #[test]
    fn test_status_fallback() {
        assert_eq!(http(429, None).kind(), FailureKind::RateLimited);
        assert_eq!(http(413, None).kind(), FailureKind::ContentTooLarge);
        assert_eq!(http(500, None).kind(), FailureKind::Unclassified);
    }

    #[test]
    fn test_job_errors_are_distinct() {
        let failed = PipelineError::JobFailed {
            job: JobKind::Generation,
            id: "run_1".into(),
            reason: Some("server_error: boom".into()),
            code: Some("server_error".into()),
        };
        let timed_out = PipelineError::JobTimedOut {
            job: JobKind::Generation,
            id: "run_1".into(),
            attempts: 60,
        };
        assert_eq!(failed.kind(), FailureKind::JobFailed);
        assert_eq!(timed_out.kind(), FailureKind::JobTimedOut);
        assert_ne!(failed.to_string(), timed_out.to_string());
    }

    #[test]
    fn test_failure_hides_internal_detail() {
        let err = PipelineError::Other("socket closed at 10.0.0.3".into());
        let failure = err.to_failure();
        assert_eq!(failure.kind, FailureKind::Unclassified);
        assert!(!failure.message.contains("10.0.0.3"));
        assert!(failure.reason.is_none());
    }

    #[test]
    fn test_failure_keeps_remote_reason() {
        let err = PipelineError::JobFailed {
            job: JobKind::Indexing,
            id: "vsfb_1".into(),
            reason: Some("unsupported_file".into()),
            code: None,
        };
        let failure = err.to_failure();
        assert_eq!(failure.reason.as_deref(), Some("unsupported_file"));
        assert_eq!(failure.kind.http_status(), 502);
    }

    #[test]
    fn test_job_failure_codes_classify_like_http_codes() {
        let job = |code: &str| PipelineError::JobFailed {
            job: JobKind::Generation,
            id: "run_1".into(),
            reason: Some(format!("{}: details", code)),
            code: Some(code.to_string()),
        };
        let limited = job("rate_limit_exceeded").to_failure();
        assert_eq!(limited.kind, FailureKind::RateLimited);
        assert_eq!(limited.kind.http_status(), 429);
        assert_eq!(limited.reason, None);

        assert_eq!(job("context_length_exceeded").kind(), FailureKind::ContentTooLarge);
        assert_eq!(job("server_error").kind(), FailureKind::JobFailed);
    }

    #[test]
    fn test_failure_serializes_error_field() {
        let failure = PipelineFailure::from(FailureKind::InputMissing);
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "input_missing");
        assert_eq!(json["error"], "No file provided");
        assert!(json.get("reason").is_none());
    }
}
