//! Error types shared across seqrec crates.

use std::path::PathBuf;

/// Top-level error type for seqrec operations.
#[derive(Debug, thiserror::Error)]
pub enum SeqrecError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Synthesis error: {message}")]
    Synthesis { message: String },

    #[error("Invalid source sequence '{sequence}': {message}")]
    InvalidSource { sequence: String, message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("Session integrity error: {message}")]
    SessionIntegrity { message: String },

    #[error("A batch session is already running ({session_id})")]
    SessionAlreadyRunning { session_id: String },

    #[error("No active batch session")]
    NoActiveSession,

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SeqrecError.
pub type SeqrecResult<T> = Result<T, SeqrecError>;

impl SeqrecError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis {
            message: msg.into(),
        }
    }

    pub fn invalid_source(sequence: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidSource {
            sequence: sequence.into(),
            message: msg.into(),
        }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend {
            message: msg.into(),
        }
    }

    pub fn session_integrity(msg: impl Into<String>) -> Self {
        Self::SessionIntegrity {
            message: msg.into(),
        }
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence {
            message: msg.into(),
        }
    }

    /// Whether this error invalidates the whole session rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionIntegrity { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_integrity_errors_are_fatal() {
        assert!(SeqrecError::session_integrity("gone").is_fatal());
        assert!(!SeqrecError::synthesis("bad span").is_fatal());
        assert!(!SeqrecError::backend("encoder crashed").is_fatal());
        assert!(!SeqrecError::invalid_source("intro", "zero duration").is_fatal());
    }

    #[test]
    fn test_display_includes_sequence_name() {
        let err = SeqrecError::invalid_source("intro", "duration must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid source sequence 'intro': duration must be positive"
        );
    }
}
