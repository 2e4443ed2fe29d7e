//! rollcall-import library interface
//!
//! Client side of the bulk PDF import: submit (or adopt) a server-side
//! extraction job, poll it to a terminal outcome, stage the extracted records
//! for review, and commit the reviewed records in one write.

pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ImportError, ImportResult};
pub use crate::services::{
    CommitError, CommitOutcome, Importer, SessionOutcome, StagingBuffer, SubmitPayload,
};
