//! # Rollcall Common Library
//!
//! Shared code for the rollcall client crates:
//! - Error type
//! - Configuration loading and resolution
//! - Import event types and the EventBus
//! - Serde helpers for backend payloads

pub mod config;
pub mod error;
pub mod events;
pub mod serde_ext;

pub use error::{Error, Result};
