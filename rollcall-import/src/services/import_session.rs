//! Import session state machine
//!
//! One session owns one import attempt:
//!
//! ```text
//! Idle → Submitting → Polling → Succeeded | Failed | TimedOut
//!   └──── resume ────┘                      (any) → Aborted
//! ```
//!
//! A submission conflict that carries a job id is not a failure: the session
//! adopts that job and polls it exactly as if it had created it. Leaving the
//! session (cancellation) stops local polling only; the server-side job keeps
//! running and a later `resume` with the same job id can reattach.

use super::job_client::{JobClientError, JobService, SubmitOutcome, SubmitPayload};
use super::poll_loop::{PollEvent, PollLoop, PollOutcome};
use super::staging_buffer::StagingBuffer;
use crate::error::{ImportError, ImportResult};
use crate::models::{ImportJob, JobId, Progress, SessionState};
use chrono::{DateTime, Utc};
use rollcall_common::config::ImportConfig;
use rollcall_common::events::{EventBus, ImportEvent};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const CONNECTIVITY_MESSAGE: &str =
    "Connection to the server keeps failing, please try again later";
const TIMED_OUT_MESSAGE: &str = "The import is taking too long, please try again later";
const JOB_FAILED_MESSAGE: &str = "PDF import failed";
const ABORTED_MESSAGE: &str = "Import stopped on this device; the server may still finish it";

/// State transition record
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub at: DateTime<Utc>,
}

/// Why a session ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Upload refused, unreachable, or a conflict without a job id
    Submission,
    /// Backend reported the job failed
    Job,
    /// Consecutive status queries failed until the error budget ran out
    Connectivity,
}

/// User-facing description of a failed session
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub kind: FailureKind,
    pub job_id: Option<JobId>,
    pub message: String,
    /// Start of the raw extracted text, to help manual correction
    pub raw_excerpt: Option<String>,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(excerpt) = &self.raw_excerpt {
            write!(f, "\n\nExtracted text sample:\n{}", excerpt)?;
        }
        Ok(())
    }
}

/// Terminal result of a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Records are staged for review; the buffer may be empty
    Staged { job_id: JobId, buffer: StagingBuffer },
    /// Backend persisted the records itself; nothing to review
    AutoSaved { job_id: JobId, total_saved: u64 },
    Failed(FailureReport),
    TimedOut { job_id: JobId },
    Aborted { job_id: Option<JobId> },
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Staged { .. } | SessionOutcome::AutoSaved { .. } => {
                SessionState::Succeeded
            }
            SessionOutcome::Failed(_) => SessionState::Failed,
            SessionOutcome::TimedOut { .. } => SessionState::TimedOut,
            SessionOutcome::Aborted { .. } => SessionState::Aborted,
        }
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            SessionOutcome::Staged { job_id, .. }
            | SessionOutcome::AutoSaved { job_id, .. }
            | SessionOutcome::TimedOut { job_id } => Some(job_id),
            SessionOutcome::Failed(report) => report.job_id.as_ref(),
            SessionOutcome::Aborted { job_id } => job_id.as_ref(),
        }
    }

    /// Single human-readable line (plus raw excerpt) for non-success outcomes
    pub fn user_message(&self) -> Option<String> {
        match self {
            SessionOutcome::Staged { .. } | SessionOutcome::AutoSaved { .. } => None,
            SessionOutcome::Failed(report) => Some(report.to_string()),
            SessionOutcome::TimedOut { .. } => Some(TIMED_OUT_MESSAGE.to_string()),
            SessionOutcome::Aborted { .. } => Some(ABORTED_MESSAGE.to_string()),
        }
    }

    /// Take the staging buffer, if the session produced one
    pub fn into_staging(self) -> Option<StagingBuffer> {
        match self {
            SessionOutcome::Staged { buffer, .. } => Some(buffer),
            _ => None,
        }
    }
}

/// **Import session** (single owner of its state)
pub struct ImportSession {
    state: SessionState,
    job_id: Option<JobId>,
    last_progress: Option<Progress>,
    consecutive_poll_errors: u32,
    started_at: DateTime<Utc>,
    deadline: Instant,
    poll_loop: PollLoop,
    events: EventBus,
    job_tx: watch::Sender<Option<JobId>>,
    transitions: Vec<StateTransition>,
}

impl ImportSession {
    /// New idle session; the deadline clock starts now
    pub fn new(poll_loop: PollLoop, import_deadline: Duration, events: EventBus) -> Self {
        let (job_tx, _) = watch::channel(None);
        Self {
            state: SessionState::Idle,
            job_id: None,
            last_progress: None,
            consecutive_poll_errors: 0,
            started_at: Utc::now(),
            deadline: Instant::now() + import_deadline,
            poll_loop,
            events,
            job_tx,
            transitions: Vec::new(),
        }
    }

    pub fn from_config(config: &ImportConfig, events: EventBus) -> Self {
        Self::new(PollLoop::from_config(config), config.import_deadline, events)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn last_progress(&self) -> Option<&Progress> {
        self.last_progress.as_ref()
    }

    pub fn consecutive_poll_errors(&self) -> u32 {
        self.consecutive_poll_errors
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Follow the job id as soon as it is known
    pub fn watch_job_id(&self) -> watch::Receiver<Option<JobId>> {
        self.job_tx.subscribe()
    }

    /// Submit a document and poll the resulting (or adopted) job
    pub async fn submit(
        &mut self,
        service: &dyn JobService,
        payload: &SubmitPayload,
        cancel: &CancellationToken,
    ) -> ImportResult<SessionOutcome> {
        self.ensure_idle()?;

        if cancel.is_cancelled() {
            return Ok(self.finish(SessionOutcome::Aborted { job_id: None }));
        }

        self.transition_to(SessionState::Submitting);
        tracing::info!(
            file = %payload.file_name,
            target_id = %payload.target_id,
            "Submitting import"
        );

        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(self.finish(SessionOutcome::Aborted { job_id: None }));
            }
            result = service.submit(payload) => result,
        };

        let job_id = match submitted {
            Ok(SubmitOutcome::Created(job_id)) => {
                tracing::info!(job_id = %job_id, "Import job created");
                job_id
            }
            Ok(SubmitOutcome::AlreadyRunning(job_id)) => {
                tracing::info!(job_id = %job_id, "Import already running, adopting existing job");
                job_id
            }
            Err(error) => return Ok(self.finish(submission_failure(&error))),
        };

        self.adopt(job_id.clone());
        Ok(self.poll(service, job_id, cancel).await)
    }

    /// Reattach to a job submitted earlier (e.g. after the owning view was left)
    pub async fn resume(
        &mut self,
        service: &dyn JobService,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> ImportResult<SessionOutcome> {
        self.ensure_idle()?;
        let job_id = service.resume(job_id)?;

        if cancel.is_cancelled() {
            return Ok(self.finish(SessionOutcome::Aborted {
                job_id: Some(job_id),
            }));
        }

        tracing::info!(job_id = %job_id, "Resuming import job");
        self.adopt(job_id.clone());
        Ok(self.poll(service, job_id, cancel).await)
    }

    fn ensure_idle(&self) -> ImportResult<()> {
        if self.state == SessionState::Idle {
            Ok(())
        } else {
            Err(ImportError::SessionNotIdle(self.state))
        }
    }

    fn adopt(&mut self, job_id: JobId) {
        self.job_id = Some(job_id.clone());
        self.job_tx.send_replace(Some(job_id));
        self.transition_to(SessionState::Polling);
    }

    async fn poll(
        &mut self,
        service: &dyn JobService,
        job_id: JobId,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        let poll_loop = self.poll_loop;
        let deadline = self.deadline;

        let outcome = poll_loop
            .run(service, &job_id, deadline, cancel, |event| {
                self.observe(&job_id, event)
            })
            .await;

        let outcome = match outcome {
            PollOutcome::Done(job) => staged_or_saved(job),
            PollOutcome::JobFailed(job) => SessionOutcome::Failed(FailureReport {
                kind: FailureKind::Job,
                raw_excerpt: job.raw_excerpt(),
                message: job
                    .error_message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| JOB_FAILED_MESSAGE.to_string()),
                job_id: Some(job.job_id),
            }),
            PollOutcome::ErrorBudgetExhausted {
                consecutive,
                last_error,
            } => {
                tracing::error!(
                    job_id = %job_id,
                    consecutive,
                    error = %last_error,
                    "Giving up on status polling"
                );
                // Non-transient rejections (unknown job, expired token) keep the backend's message
                let message = if last_error.is_transient() {
                    CONNECTIVITY_MESSAGE.to_string()
                } else {
                    last_error.user_message()
                };
                SessionOutcome::Failed(FailureReport {
                    kind: FailureKind::Connectivity,
                    job_id: Some(job_id),
                    message,
                    raw_excerpt: last_error.raw_excerpt(),
                })
            }
            PollOutcome::DeadlineExceeded => SessionOutcome::TimedOut { job_id },
            PollOutcome::Cancelled => SessionOutcome::Aborted {
                job_id: Some(job_id),
            },
        };

        self.finish(outcome)
    }

    fn observe(&mut self, job_id: &JobId, event: PollEvent<'_>) {
        match event {
            PollEvent::Snapshot(job) => {
                self.consecutive_poll_errors = 0;
                if let Some(progress) = &job.progress {
                    tracing::debug!(job_id = %job_id, progress = %progress.describe(), "Import progress");
                    self.last_progress = Some(progress.clone());
                    self.events.emit_lossy(ImportEvent::ProgressUpdated {
                        job_id: job_id.to_string(),
                        progress: progress.clone(),
                        timestamp: Utc::now(),
                    });
                }
            }
            PollEvent::QueryFailed { consecutive, error } => {
                self.consecutive_poll_errors = consecutive;
                self.events.emit_lossy(ImportEvent::PollFailed {
                    job_id: job_id.to_string(),
                    consecutive_errors: consecutive,
                    message: error.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    fn transition_to(&mut self, new_state: SessionState) {
        let transition = StateTransition {
            from: self.state,
            to: new_state,
            at: Utc::now(),
        };
        tracing::debug!(from = %transition.from, to = %new_state, "Session state change");

        self.state = new_state;
        self.events.emit_lossy(ImportEvent::StateChanged {
            from: transition.from,
            to: new_state,
            job_id: self.job_id.as_ref().map(JobId::to_string),
            timestamp: transition.at,
        });
        self.transitions.push(transition);
    }

    fn finish(&mut self, outcome: SessionOutcome) -> SessionOutcome {
        let state = outcome.state();
        self.transition_to(state);

        let message = outcome.user_message();
        match &outcome {
            SessionOutcome::Staged { job_id, buffer } => {
                tracing::info!(job_id = %job_id, records = buffer.size(), "Import succeeded, records staged")
            }
            SessionOutcome::AutoSaved { job_id, total_saved } => {
                tracing::info!(job_id = %job_id, total_saved, "Import succeeded, records saved by server")
            }
            SessionOutcome::Failed(report) => {
                tracing::error!(job_id = ?report.job_id, kind = ?report.kind, "Import failed: {}", report.message)
            }
            SessionOutcome::TimedOut { job_id } => {
                tracing::warn!(job_id = %job_id, "Import deadline exceeded")
            }
            SessionOutcome::Aborted { job_id } => {
                tracing::info!(job_id = ?job_id, "Import polling stopped locally")
            }
        }

        self.events.emit_lossy(ImportEvent::SessionFinished {
            job_id: outcome.job_id().map(JobId::to_string),
            state,
            message,
            timestamp: Utc::now(),
        });

        outcome
    }
}

fn submission_failure(error: &JobClientError) -> SessionOutcome {
    SessionOutcome::Failed(FailureReport {
        kind: FailureKind::Submission,
        job_id: None,
        message: error.user_message(),
        raw_excerpt: error.raw_excerpt(),
    })
}

fn staged_or_saved(job: ImportJob) -> SessionOutcome {
    if let Some(total_saved) = job.auto_saved {
        return SessionOutcome::AutoSaved {
            job_id: job.job_id,
            total_saved,
        };
    }

    let records = job.result.unwrap_or_default();
    if records.is_empty() {
        tracing::warn!(job_id = %job.job_id, "Import finished but extracted no records");
    }

    SessionOutcome::Staged {
        buffer: StagingBuffer::from_records(Some(job.job_id.clone()), records),
        job_id: job.job_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_idle() {
        let session = ImportSession::from_config(&ImportConfig::default(), EventBus::new(10));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.job_id().is_none());
        assert!(session.transitions().is_empty());
        assert!(session.deadline() > Instant::now());
    }

    #[test]
    fn test_outcome_states_and_messages() {
        let job_id = JobId::parse("j").unwrap();
        let staged = SessionOutcome::Staged {
            job_id: job_id.clone(),
            buffer: StagingBuffer::default(),
        };
        assert_eq!(staged.state(), SessionState::Succeeded);
        assert!(staged.user_message().is_none());

        let timed_out = SessionOutcome::TimedOut {
            job_id: job_id.clone(),
        };
        assert_eq!(timed_out.state(), SessionState::TimedOut);
        assert_eq!(timed_out.user_message().as_deref(), Some(TIMED_OUT_MESSAGE));

        let failed = SessionOutcome::Failed(FailureReport {
            kind: FailureKind::Job,
            job_id: Some(job_id),
            message: "No voter rows found".to_string(),
            raw_excerpt: Some("page 1".to_string()),
        });
        assert_eq!(
            failed.user_message().as_deref(),
            Some("No voter rows found\n\nExtracted text sample:\npage 1")
        );
    }

    #[test]
    fn test_conflict_without_job_is_submission_failure() {
        let outcome = submission_failure(&JobClientError::ConflictWithoutJob {
            message: "Import already running".to_string(),
            raw_text: None,
        });
        match outcome {
            SessionOutcome::Failed(report) => {
                assert_eq!(report.kind, FailureKind::Submission);
                assert_eq!(report.message, "Import already running");
                assert!(report.job_id.is_none());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
