//! Error types for the Tandem engine.

use crate::RecordId;
use thiserror::Error;

/// All possible errors from the Tandem engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Input errors
    #[error("invalid attributes: {0}")]
    InvalidAttributes(String),

    #[error("invalid priority: expected number, string or null, got {0}")]
    InvalidPriority(String),

    #[error("invalid record id: {0}")]
    InvalidId(String),

    // State errors
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
