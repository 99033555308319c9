//! Error types for avail-core.

use thiserror::Error;

/// Errors raised when parsing domain values from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown availability status: {0}")]
    UnknownStatus(String),

    #[error("Unknown profession: {0}")]
    UnknownProfession(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}
