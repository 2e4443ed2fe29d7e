//! Status polling loop
//!
//! Queries job status at a fixed interval until the job reaches a terminal
//! status, the consecutive-error budget runs out, the deadline passes, or the
//! caller cancels. Any successful query resets the error budget.

use super::job_client::{JobClientError, JobService};
use crate::models::{ImportJob, JobId, JobStatus};
use rollcall_common::config::ImportConfig;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What the loop saw on one query
#[derive(Debug)]
pub enum PollEvent<'a> {
    /// Status query succeeded; the error budget is back to zero
    Snapshot(&'a ImportJob),
    /// Status query failed; `consecutive` counts back-to-back failures
    QueryFailed {
        consecutive: u32,
        error: &'a JobClientError,
    },
}

/// Why the loop stopped
#[derive(Debug)]
pub enum PollOutcome {
    Done(ImportJob),
    JobFailed(ImportJob),
    ErrorBudgetExhausted {
        consecutive: u32,
        last_error: JobClientError,
    },
    DeadlineExceeded,
    Cancelled,
}

/// Fixed-cadence poller with a consecutive-error budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollLoop {
    interval: Duration,
    max_consecutive_errors: u32,
}

impl PollLoop {
    pub fn new(interval: Duration, max_consecutive_errors: u32) -> Self {
        Self {
            interval,
            max_consecutive_errors: max_consecutive_errors.max(1),
        }
    }

    pub fn from_config(config: &ImportConfig) -> Self {
        Self::new(config.poll_interval, config.max_consecutive_poll_errors)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_consecutive_errors(&self) -> u32 {
        self.max_consecutive_errors
    }

    /// Poll `job_id` until a terminal outcome
    ///
    /// `observe` is called once per completed query, before the loop decides
    /// whether to continue. Cancellation and the deadline are honoured both
    /// while a query is in flight and while sleeping between queries.
    pub async fn run<F>(
        &self,
        service: &dyn JobService,
        job_id: &JobId,
        deadline: Instant,
        cancel: &CancellationToken,
        mut observe: F,
    ) -> PollOutcome
    where
        F: FnMut(PollEvent<'_>),
    {
        let mut consecutive_errors = 0u32;
        let mut attempt = 0u64;

        loop {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled;
            }
            if Instant::now() >= deadline {
                return PollOutcome::DeadlineExceeded;
            }

            attempt += 1;
            tracing::debug!(job_id = %job_id, attempt, "Polling job status");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = tokio::time::sleep_until(deadline) => return PollOutcome::DeadlineExceeded,
                result = service.fetch_status(job_id) => result,
            };

            match result {
                Ok(job) => {
                    consecutive_errors = 0;
                    observe(PollEvent::Snapshot(&job));

                    match job.status {
                        JobStatus::Done => return PollOutcome::Done(job),
                        JobStatus::Failed => return PollOutcome::JobFailed(job),
                        JobStatus::Pending | JobStatus::Running => {}
                    }
                }
                Err(error) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        job_id = %job_id,
                        consecutive_errors,
                        budget = self.max_consecutive_errors,
                        error = %error,
                        "Status query failed"
                    );
                    observe(PollEvent::QueryFailed {
                        consecutive: consecutive_errors,
                        error: &error,
                    });

                    if consecutive_errors >= self.max_consecutive_errors {
                        return PollOutcome::ErrorBudgetExhausted {
                            consecutive: consecutive_errors,
                            last_error: error,
                        };
                    }
                }
            }

            let wake_at = (Instant::now() + self.interval).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }
}

impl Default for PollLoop {
    fn default() -> Self {
        Self::from_config(&ImportConfig::default())
    }
}
