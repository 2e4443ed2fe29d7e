//! Data models for rollcall-import
//!
//! - Import job snapshots as read from the job service
//! - Extracted records staged for review

pub mod import_job;
pub mod import_record;

pub use import_job::{raw_excerpt, ImportJob, JobId, JobStatus, RAW_EXCERPT_CHARS};
pub use import_record::ImportRecord;
pub use rollcall_common::events::{Progress, ProgressStage, SessionState};
