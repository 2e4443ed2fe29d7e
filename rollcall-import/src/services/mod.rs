//! Import pipeline services
//!
//! Leaves first: job service contract and HTTP client, status polling,
//! the session state machine, staging, commit, and the single-session
//! client instance tying them together.

pub mod commit;
pub mod http_client;
pub mod import_session;
pub mod importer;
pub mod job_client;
pub mod poll_loop;
pub mod staging_buffer;

pub use commit::{CommitError, CommitOperation, CommitOutcome};
pub use http_client::HttpJobClient;
pub use import_session::{
    FailureKind, FailureReport, ImportSession, SessionOutcome, StateTransition,
};
pub use importer::Importer;
pub use job_client::{
    CommitRequest, CommitResponse, JobClientError, JobService, SubmitOutcome, SubmitPayload,
};
pub use poll_loop::{PollEvent, PollLoop, PollOutcome};
pub use staging_buffer::{StagedRecord, StagingBuffer, StagingError};
