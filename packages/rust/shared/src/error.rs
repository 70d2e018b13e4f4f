//! Error types for TicketDesk.
//!
//! Library crates use [`TicketDeskError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all TicketDesk operations.
#[derive(Debug, thiserror::Error)]
pub enum TicketDeskError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A retrieval or generation collaborator could not complete the call.
    #[error("{collaborator} unavailable: {message}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        message: String,
    },

    /// A collaborator answered, but with an empty or unusable result.
    #[error("malformed {collaborator} response: {message}")]
    MalformedResponse {
        collaborator: &'static str,
        message: String,
    },

    /// A collaborator call exceeded its time bound.
    #[error("{collaborator} timed out after {secs}s")]
    Timeout {
        collaborator: &'static str,
        secs: u64,
    },

    /// Database or archive storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Workflow engine invariant violation (missing input, duplicate write, ...).
    #[error("pipeline error in stage `{stage}`: {message}")]
    Pipeline {
        stage: &'static str,
        message: String,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (empty complaint, incomplete ticket context, ...).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TicketDeskError>;

impl TicketDeskError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// A collaborator could not be reached or failed mid-call.
    pub fn unavailable(collaborator: &'static str, msg: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            collaborator,
            message: msg.into(),
        }
    }

    /// A collaborator returned something the pipeline cannot use.
    pub fn malformed(collaborator: &'static str, msg: impl Into<String>) -> Self {
        Self::MalformedResponse {
            collaborator,
            message: msg.into(),
        }
    }

    /// An engine invariant was broken while running `stage`.
    pub fn pipeline(stage: &'static str, msg: impl Into<String>) -> Self {
        Self::Pipeline {
            stage,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
