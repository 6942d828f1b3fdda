//! Error types for the taskcheck engine.

use thiserror::Error;

/// Errors that can occur while collecting availability.
///
/// An infeasible task is not an error: see [`crate::allocate::Allocation`].
#[derive(Error, Debug)]
pub enum TaskcheckError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Calendar parse error: {0}")]
    Parse(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TaskcheckError {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        TaskcheckError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Configuration problems abort the run; everything else is scoped to one source.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskcheckError::Config(_))
    }
}

/// Result type alias for taskcheck operations.
pub type TaskcheckResult<T> = Result<T, TaskcheckError>;
