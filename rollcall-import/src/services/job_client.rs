//! Job service contract
//!
//! Submission, status, and bulk-commit calls against the remote job service.
//! The session and commit logic only see this trait; `HttpJobClient` is the
//! production implementation.

use crate::models::{raw_excerpt, ImportJob, ImportRecord, JobId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Job service errors
#[derive(Debug, Error)]
pub enum JobClientError {
    /// Network failure or timeout; the request may succeed on retry
    #[error("Network error: {0}")]
    Transport(String),

    /// 5xx from the job service
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// 409 without a job id to adopt
    #[error("Import already running: {message}")]
    ConflictWithoutJob {
        message: String,
        raw_text: Option<String>,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-2xx response
    #[error("Request rejected ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        raw_text: Option<String>,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid job id: {0:?}")]
    InvalidJobId(String),
}

impl JobClientError {
    /// True for failures worth retrying with identical input
    pub fn is_transient(&self) -> bool {
        matches!(self, JobClientError::Transport(_) | JobClientError::Server { .. })
    }

    /// Message safe to show a user, without the error-kind prefix
    pub fn user_message(&self) -> String {
        match self {
            JobClientError::Server { message, .. }
            | JobClientError::ConflictWithoutJob { message, .. }
            | JobClientError::Rejected { message, .. } => message.clone(),
            JobClientError::Unauthorized(_) => "Session expired, please log in again".to_string(),
            JobClientError::Transport(_) => {
                "Could not reach the server, please check the connection".to_string()
            }
            JobClientError::Parse(_) => "Unexpected response from the server".to_string(),
            JobClientError::InvalidJobId(id) => format!("Unknown import job {:?}", id),
        }
    }

    /// Truncated raw extracted text attached by the backend, if any
    pub fn raw_excerpt(&self) -> Option<String> {
        match self {
            JobClientError::ConflictWithoutJob { raw_text, .. }
            | JobClientError::Rejected { raw_text, .. } => raw_text.as_deref().and_then(raw_excerpt),
            _ => None,
        }
    }
}

/// Source document plus the target the records belong to
#[derive(Debug, Clone)]
pub struct SubmitPayload {
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
    /// Target context (voting center) identifier
    pub target_id: String,
}

impl SubmitPayload {
    pub fn pdf(file_name: impl Into<String>, content: Vec<u8>, target_id: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: "application/pdf".to_string(),
            content,
            target_id: target_id.into(),
        }
    }

    /// Read a PDF from disk
    pub async fn from_path(path: &Path, target_id: impl Into<String>) -> std::io::Result<Self> {
        let content = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("voter-list.pdf")
            .to_string();
        Ok(Self::pdf(file_name, content, target_id))
    }
}

/// Result of a submission
///
/// Both variants lead to polling; `AlreadyRunning` means the backend already had
/// a job for this caller/target and the client adopts it instead of duplicating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(JobId),
    AlreadyRunning(JobId),
}

impl SubmitOutcome {
    pub fn job_id(&self) -> &JobId {
        match self {
            SubmitOutcome::Created(id) | SubmitOutcome::AlreadyRunning(id) => id,
        }
    }

    pub fn into_job_id(self) -> JobId {
        match self {
            SubmitOutcome::Created(id) | SubmitOutcome::AlreadyRunning(id) => id,
        }
    }
}

/// Bulk write of reviewed records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub target_id: String,
    pub records: Vec<ImportRecord>,
}

/// Backend acknowledgement of a bulk write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResponse {
    /// Records actually persisted; may be fewer than submitted
    pub inserted: u64,
}

/// Remote job service
#[async_trait]
pub trait JobService: Send + Sync {
    /// Upload the document and start a job
    async fn submit(&self, payload: &SubmitPayload) -> Result<SubmitOutcome, JobClientError>;

    /// Single status snapshot; never waits for completion
    async fn fetch_status(&self, job_id: &JobId) -> Result<ImportJob, JobClientError>;

    /// Persist reviewed records
    async fn commit(&self, request: &CommitRequest) -> Result<CommitResponse, JobClientError>;

    /// Confirm a previously returned job id for reattachment; performs no new work
    fn resume(&self, job_id: &str) -> Result<JobId, JobClientError> {
        JobId::parse(job_id).ok_or_else(|| JobClientError::InvalidJobId(job_id.to_string()))
    }
}
