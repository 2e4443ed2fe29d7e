//! Commit of reviewed records
//!
//! Sends the staging buffer as one bulk write. The buffer is cleared only
//! after the backend accepts the write; on any failure it is left exactly as
//! it was so the user can retry without re-importing.

use super::job_client::{CommitRequest, JobClientError, JobService};
use super::staging_buffer::StagingBuffer;
use chrono::Utc;
use rollcall_common::events::{EventBus, ImportEvent};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommitError {
    /// Rejected locally; no request was sent
    #[error("Nothing to save: the staging buffer is empty")]
    EmptyBuffer,

    /// Rejected locally; no request was sent
    #[error("No target selected for the records")]
    MissingTarget,

    /// Backend refused the write or could not be reached
    #[error("Commit rejected: {0}")]
    Rejected(#[source] JobClientError),
}

impl CommitError {
    pub fn user_message(&self) -> String {
        match self {
            CommitError::Rejected(source) => source.user_message(),
            other => other.to_string(),
        }
    }
}

/// Result of an accepted commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    pub submitted: usize,
    /// What the backend persisted; may be fewer than submitted
    pub inserted: u64,
}

impl CommitOutcome {
    /// Records the backend dropped (duplicates, validation)
    pub fn dropped(&self) -> u64 {
        (self.submitted as u64).saturating_sub(self.inserted)
    }
}

pub struct CommitOperation {
    service: Arc<dyn JobService>,
    events: EventBus,
}

impl CommitOperation {
    pub fn new(service: Arc<dyn JobService>, events: EventBus) -> Self {
        Self { service, events }
    }

    /// Persist the current buffer contents for `target_id`
    pub async fn commit(
        &self,
        target_id: &str,
        buffer: &mut StagingBuffer,
    ) -> Result<CommitOutcome, CommitError> {
        if buffer.is_empty() {
            return Err(CommitError::EmptyBuffer);
        }
        let target_id = target_id.trim();
        if target_id.is_empty() {
            return Err(CommitError::MissingTarget);
        }

        let request = CommitRequest {
            target_id: target_id.to_string(),
            records: buffer.to_records(),
        };
        let submitted = request.records.len();

        tracing::info!(target_id = %target_id, submitted, "Committing staged records");

        let response = match self.service.commit(&request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(target_id = %target_id, submitted, error = %error, "Commit failed, staging kept");
                return Err(CommitError::Rejected(error));
            }
        };

        let outcome = CommitOutcome {
            submitted,
            inserted: response.inserted,
        };

        if outcome.dropped() > 0 {
            tracing::info!(
                target_id = %target_id,
                submitted,
                inserted = outcome.inserted,
                "Backend persisted fewer records than submitted"
            );
        }

        buffer.clear();

        self.events.emit_lossy(ImportEvent::StagingCommitted {
            target_id: target_id.to_string(),
            submitted,
            inserted: outcome.inserted,
            timestamp: Utc::now(),
        });

        Ok(outcome)
    }
}
