//! Polling state machine for remote asynchronous jobs.
//!
//! Both file indexing and generation runs follow the same lifecycle:
//! a job is created in a pending state and its status is re-fetched on a
//! fixed interval until it reaches [`JobStatus::Completed`] or
//! [`JobStatus::Failed`]. Running out of attempts is a local, synthetic
//! terminal state reported as [`PipelineError::JobTimedOut`], distinct from
//! a remote failure.
//!
//! Sleeping goes through the [`Sleeper`] trait so tests can poll without
//! real delays.

use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::events::{emit, Event, EventHandler};
use crate::PipelineError;

/// Which remote job is being polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Vector-store file batch indexing.
    Indexing,
    /// Assistant run producing the flashcards.
    Generation,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobKind::Indexing => "indexing",
            JobKind::Generation => "generation",
        })
    }
}

/// Remote job status, normalized across job kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed {
        /// Remote-reported reason, if any.
        reason: Option<String>,
        /// Remote error code (e.g. `rate_limit_exceeded`), if any.
        code: Option<String>,
    },
}

impl JobStatus {
    /// Completed and failed jobs must never be polled again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed { .. })
    }

    /// Map a provider status string. Unknown statuses count as still running.
    ///
    /// # Examples
    ///
    /// ```
    /// use flashcard_pipeline::poll::JobStatus;
    ///
    /// assert_eq!(JobStatus::from_remote("completed", None), JobStatus::Completed);
    /// assert!(JobStatus::from_remote("expired", None).is_terminal());
    /// assert!(!JobStatus::from_remote("requires_action", None).is_terminal());
    /// ```
    pub fn from_remote(status: &str, reason: Option<String>) -> Self {
        match status {
            "queued" => JobStatus::Queued,
            "completed" => JobStatus::Completed,
            "failed" | "cancelled" | "expired" | "incomplete" => JobStatus::Failed {
                reason: reason.or_else(|| Some(status.to_string())),
                code: None,
            },
            _ => JobStatus::InProgress,
        }
    }

    /// A failure with a reason and no code.
    pub fn failed(reason: impl Into<String>) -> Self {
        JobStatus::Failed {
            reason: Some(reason.into()),
            code: None,
        }
    }

    /// Attach a remote error code. Non-failed statuses are returned unchanged.
    pub fn with_code(self, code: Option<String>) -> Self {
        match self {
            JobStatus::Failed { reason, .. } => JobStatus::Failed { reason, code },
            other => other,
        }
    }
}

/// Interval and attempt ceiling for one polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollConfig {
    /// 1 second interval, 30 attempts.
    pub fn indexing() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
        }
    }

    /// 1 second interval, 60 attempts.
    pub fn generation() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 60,
        }
    }
}

/// Suspends the current task between polls.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeping via `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and records every requested delay.
#[derive(Debug, Default)]
pub struct InstantSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Everything a polling loop needs besides the fetch itself.
pub struct Poll<'a> {
    pub job: JobKind,
    pub id: &'a str,
    pub config: PollConfig,
    pub sleeper: &'a dyn Sleeper,
    pub events: &'a Option<std::sync::Arc<dyn EventHandler>>,
}

impl Poll<'_> {
    /// Drive a job from `initial` to a terminal status.
    ///
    /// `fetch` is called only while the last observed status is non-terminal,
    /// at most `max_attempts` times, with one interval of sleep before each call.
    pub async fn until_terminal<F, Fut>(&self, initial: JobStatus, mut fetch: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<JobStatus>>,
    {
        let mut status = initial;
        let mut attempts = 0u32;

        loop {
            match status {
                JobStatus::Completed => {
                    tracing::debug!(job = %self.job, id = self.id, attempts, "remote job completed");
                    return Ok(());
                }
                JobStatus::Failed { reason, code } => {
                    tracing::warn!(
                        job = %self.job,
                        id = self.id,
                        attempts,
                        reason = reason.as_deref().unwrap_or("none"),
                        code = code.as_deref().unwrap_or("none"),
                        "remote job reported failure"
                    );
                    return Err(PipelineError::JobFailed {
                        job: self.job,
                        id: self.id.to_string(),
                        reason,
                        code,
                    });
                }
                JobStatus::Queued | JobStatus::InProgress => {}
            }

            if attempts >= self.config.max_attempts {
                tracing::warn!(
                    job = %self.job,
                    id = self.id,
                    attempts,
                    "gave up polling remote job before it finished"
                );
                return Err(PipelineError::JobTimedOut {
                    job: self.job,
                    id: self.id.to_string(),
                    attempts,
                });
            }

            self.sleeper.sleep(self.config.interval).await;
            attempts += 1;
            status = fetch().await?;
            emit(
                self.events,
                Event::JobPoll {
                    job: self.job,
                    id: self.id.to_string(),
                    attempt: attempts,
                    status: status.clone(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn poll<'a>(sleeper: &'a InstantSleeper, max_attempts: u32) -> Poll<'a> {
        Poll {
            job: JobKind::Generation,
            id: "run_1",
            config: PollConfig {
                interval: Duration::from_secs(1),
                max_attempts,
            },
            sleeper,
            events: &None,
        }
    }

    #[tokio::test]
    async fn completed_initial_status_never_fetches() {
        let sleeper = InstantSleeper::new();
        let calls = Cell::new(0);
        poll(&sleeper, 5)
            .until_terminal(JobStatus::Completed, || {
                calls.set(calls.get() + 1);
                async { Ok(JobStatus::InProgress) }
            })
            .await
            .unwrap();
        assert_eq!(calls.get(), 0);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn completes_after_progress() {
        let sleeper = InstantSleeper::new();
        let mut script = vec![JobStatus::Completed, JobStatus::InProgress, JobStatus::Queued];
        poll(&sleeper, 5)
            .until_terminal(JobStatus::Queued, || {
                let next = script.pop().unwrap();
                async move { Ok(next) }
            })
            .await
            .unwrap();
        assert!(script.is_empty());
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1); 3]);
    }

    #[tokio::test]
    async fn failed_status_stops_polling() {
        let sleeper = InstantSleeper::new();
        let calls = Cell::new(0);
        let err = poll(&sleeper, 10)
            .until_terminal(JobStatus::InProgress, || {
                calls.set(calls.get() + 1);
                async { Ok(JobStatus::failed("server_error").with_code(Some("server_error".into()))) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.get(), 1);
        match err {
            PipelineError::JobFailed { job, reason, code, .. } => {
                assert_eq!(job, JobKind::Generation);
                assert_eq!(reason.as_deref(), Some("server_error"));
                assert_eq!(code.as_deref(), Some("server_error"));
            }
            other => panic!("expected JobFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausting_attempts_times_out() {
        let sleeper = InstantSleeper::new();
        let calls = Cell::new(0);
        let err = poll(&sleeper, 4)
            .until_terminal(JobStatus::Queued, || {
                calls.set(calls.get() + 1);
                async { Ok(JobStatus::InProgress) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.get(), 4);
        assert_eq!(sleeper.recorded().len(), 4);
        assert!(matches!(err, PipelineError::JobTimedOut { attempts: 4, .. }));
    }

    #[test]
    fn fetch_errors_propagate() {
        let sleeper = InstantSleeper::new();
        let result = tokio_test::block_on(poll(&sleeper, 3).until_terminal(
            JobStatus::InProgress,
            || async { Err(PipelineError::Other("connection reset".into())) },
        ));
        assert!(matches!(result, Err(PipelineError::Other(_))));
    }

    #[test]
    fn remote_status_mapping() {
        assert_eq!(JobStatus::from_remote("in_progress", None), JobStatus::InProgress);
        assert_eq!(JobStatus::from_remote("cancelling", None), JobStatus::InProgress);
        assert_eq!(JobStatus::from_remote("cancelled", None), JobStatus::failed("cancelled"));
        assert_eq!(
            JobStatus::from_remote("failed", Some("quota".into())),
            JobStatus::failed("quota")
        );
    }

    #[test]
    fn codes_attach_only_to_failures() {
        assert_eq!(
            JobStatus::failed("quota").with_code(Some("rate_limit_exceeded".into())),
            JobStatus::Failed {
                reason: Some("quota".into()),
                code: Some("rate_limit_exceeded".into()),
            }
        );
        assert_eq!(
            JobStatus::Completed.with_code(Some("rate_limit_exceeded".into())),
            JobStatus::Completed
        );
    }
}
