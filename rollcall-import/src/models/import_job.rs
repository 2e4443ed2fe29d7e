//! Import job snapshot
//!
//! The backend creates the job on submission; the client only ever reads
//! successive snapshots of it.

use super::ImportRecord;
use rollcall_common::events::Progress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters of raw extracted text shown alongside a failure
pub const RAW_EXCERPT_CHARS: usize = 500;

/// Backend-assigned job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Accepts any non-blank identifier; surrounding whitespace is dropped
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job status as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

/// One snapshot of a backend import job
#[derive(Debug, Clone, PartialEq)]
pub struct ImportJob {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: Option<Progress>,
    /// Extracted records, present once the job is done
    pub result: Option<Vec<ImportRecord>>,
    pub error_message: Option<String>,
    /// Raw extracted text the backend attached for diagnostics
    pub raw_text: Option<String>,
    /// Set when the backend persisted the records itself
    pub auto_saved: Option<u64>,
    pub total_extracted: Option<u64>,
}

impl ImportJob {
    /// Snapshot with only a status; used for pending/running jobs
    pub fn with_status(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            progress: None,
            result: None,
            error_message: None,
            raw_text: None,
            auto_saved: None,
            total_extracted: None,
        }
    }

    /// Finished snapshot carrying extracted records
    pub fn done(job_id: JobId, records: Vec<ImportRecord>) -> Self {
        let total = records.len() as u64;
        Self {
            result: Some(records),
            total_extracted: Some(total),
            ..Self::with_status(job_id, JobStatus::Done)
        }
    }

    /// Failed snapshot carrying the backend's message
    pub fn failed(job_id: JobId, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::with_status(job_id, JobStatus::Failed)
        }
    }

    pub fn raw_excerpt(&self) -> Option<String> {
        self.raw_text.as_deref().and_then(raw_excerpt)
    }
}

/// First `RAW_EXCERPT_CHARS` characters of raw text, `None` when blank
pub fn raw_excerpt(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(RAW_EXCERPT_CHARS).collect())
}
