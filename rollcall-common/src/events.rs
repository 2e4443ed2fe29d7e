//! Event types for the import pipeline
//!
//! Provides the shared event definitions and the EventBus that import sessions
//! publish to. Subscribers (UI layers, the CLI progress printer) only observe;
//! the session remains the single owner of its state.

use chrono::{DateTime, Utc};
use crate::serde_ext::null_as_default;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

/// Import session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, nothing sent yet
    Idle,
    /// Upload in flight
    Submitting,
    /// Job accepted, waiting for a terminal status
    Polling,
    /// Job finished and its records were captured
    Succeeded,
    /// Backend failure, connectivity budget exhausted, or rejected submission
    Failed,
    /// Deadline passed while the job was still running
    TimedOut,
    /// Local polling cancelled; the server-side job is untouched
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded
                | SessionState::Failed
                | SessionState::TimedOut
                | SessionState::Aborted
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Submitting => "submitting",
            SessionState::Polling => "polling",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed => "failed",
            SessionState::TimedOut => "timed_out",
            SessionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Backend processing stage
///
/// The backend has used both `ocr`/`saving` and `extract`/`save` labels.
/// Unknown labels are kept so they can still be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProgressStage {
    Extract,
    Save,
    Other(String),
}

impl Default for ProgressStage {
    fn default() -> Self {
        ProgressStage::Other(String::new())
    }
}

impl From<String> for ProgressStage {
    fn from(label: String) -> Self {
        match label.as_str() {
            "extract" | "ocr" => ProgressStage::Extract,
            "save" | "saving" => ProgressStage::Save,
            _ => ProgressStage::Other(label),
        }
    }
}

impl From<ProgressStage> for String {
    fn from(stage: ProgressStage) -> Self {
        match stage {
            ProgressStage::Extract => "extract".to_string(),
            ProgressStage::Save => "save".to_string(),
            ProgressStage::Other(label) => label,
        }
    }
}

/// Last progress snapshot reported by the backend
///
/// Not required to be monotonic; it is whatever the backend last said.
/// Missing or null fields fall back to an unlabelled stage and zero counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default, deserialize_with = "null_as_default")]
    pub stage: ProgressStage,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u32,
}

impl Progress {
    /// Short human-readable line, e.g. "extracting page 3/42"
    pub fn describe(&self) -> String {
        match &self.stage {
            ProgressStage::Extract => format!("extracting page {}/{}", self.current, self.total),
            ProgressStage::Save => format!("saving records {}/{}", self.current, self.total),
            ProgressStage::Other(label) if label.is_empty() => {
                format!("working {}/{}", self.current, self.total)
            }
            ProgressStage::Other(label) => format!("{} {}/{}", label, self.current, self.total),
        }
    }
}

/// Import pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImportEvent {
    /// Session moved between lifecycle states
    StateChanged {
        from: SessionState,
        to: SessionState,
        job_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Backend reported a progress payload
    ProgressUpdated {
        job_id: String,
        progress: Progress,
        timestamp: DateTime<Utc>,
    },

    /// A status query failed; polling continues while budget remains
    PollFailed {
        job_id: String,
        consecutive_errors: u32,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Session reached a terminal state
    SessionFinished {
        job_id: Option<String>,
        state: SessionState,
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Staged records were accepted by the backend
    StagingCommitted {
        target_id: String,
        submitted: usize,
        inserted: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast channel for ImportEvent
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ImportEvent>,
}

impl EventBus {
    /// Creates a new EventBus; `capacity` events are buffered per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ImportEvent,
    ) -> Result<usize, broadcast::error::SendError<ImportEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: ImportEvent) {
        if self.tx.send(event).is_err() {
            debug!("No subscribers for import event");
        }
    }
}
