//! Error types for rollcall-import

use crate::models::{JobId, SessionState};
use crate::services::job_client::JobClientError;
use thiserror::Error;

/// Errors raised before a session can run
///
/// Terminal session results (failed job, timeout, abort) are not errors; they
/// are reported through `SessionOutcome`.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Another session on this client instance is still submitting or polling
    #[error(
        "An import is already in progress (job {})",
        .job_id.as_ref().map(JobId::as_str).unwrap_or("not yet assigned")
    )]
    SessionActive { job_id: Option<JobId> },

    /// Sessions are single-use
    #[error("Session is already {0}; start a new session")]
    SessionNotIdle(SessionState),

    #[error(transparent)]
    Client(#[from] JobClientError),

    #[error(transparent)]
    Common(#[from] rollcall_common::Error),
}

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;
