//! Error types for the logbook_core library.
//!
//! Errors fall into three tiers:
//! - validation failures ([`Error::IllegalArgument`]), recoverable by fixing input
//! - identity conflicts ([`Error::EntryAlreadyExists`]), recoverable by choosing another identity
//! - storage faults (everything for which [`Error::is_fatal`] is true)

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for logbook_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-supplied data violates a field invariant
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// An add or modify collides with an existing unique entry
    #[error("Entry already exists: {0}")]
    EntryAlreadyExists(String),

    /// The storage backend is unreachable or corrupt
    #[error("Database error: {0}")]
    Database(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a validation failure
    pub(crate) fn illegal(msg: impl Into<String>) -> Self {
        Error::IllegalArgument(msg.into())
    }

    /// Shorthand for an identity conflict
    pub(crate) fn exists(msg: impl Into<String>) -> Self {
        Error::EntryAlreadyExists(msg.into())
    }

    /// Whether the error signals a storage fault the caller cannot recover from.
    ///
    /// Fatal errors should be logged with full detail, reported to the user
    /// as a generic message, and end the process.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::IllegalArgument(_) | Error::EntryAlreadyExists(_) | Error::Config(_)
        )
    }
}
