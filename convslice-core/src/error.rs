//! Structured error types for convslice-core.
//!
//! Uses `thiserror` so library consumers can match on the failure kind.
//! The binary crate (convslice-cli) wraps these in `anyhow` for context
//! and maps them back to exit codes.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for convslice-core operations
#[derive(Error, Debug)]
pub enum SliceError {
    /// Input JSON matches neither the flat `messages` shape nor the `mapping` tree
    #[error("Unrecognized input shape: {reason}")]
    UnrecognizedShape { reason: String },

    /// An ID-pair range or boundary referenced a message that does not exist
    #[error("Unknown message id '{id}'")]
    UnknownMessageId { id: String },

    /// Malformed, out-of-bounds or overlapping range
    #[error("Invalid range '{spec}': {reason}")]
    InvalidRange { spec: String, reason: String },

    /// A parser for an optional config format was compiled out
    #[error("Missing optional dependency '{feature}' needed to read {path:?}")]
    MissingOptionalDependency { feature: String, path: PathBuf },

    /// Reading input or writing output failed
    #[error("Filesystem error at {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON parsing or serialization failed
    #[error("JSON error at {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Two slices render to the same file name (or to the manifest name)
    #[error("Slice {sequence} renders to file name '{file_name}', already used by {other}")]
    FilenameCollision {
        file_name: String,
        sequence: usize,
        other: String,
    },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// No conversation in an export matched the extraction filters
    #[error("No conversations matched the given filters")]
    NoMatchingConversation,

    /// `--index` pointed past the list of matching conversations
    #[error("--index {index} is out of range for {matches} match(es)\n{candidates}")]
    MatchIndexOutOfRange {
        index: usize,
        matches: usize,
        candidates: String,
    },
}

/// Result type alias for convslice-core operations
pub type Result<T> = std::result::Result<T, SliceError>;

/// Coarse classification used by the CLI to pick an exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Io,
    Validation,
}

impl SliceError {
    pub fn unrecognized_shape(reason: impl Into<String>) -> Self {
        Self::UnrecognizedShape {
            reason: reason.into(),
        }
    }

    pub fn unknown_message_id(id: impl Into<String>) -> Self {
        Self::UnknownMessageId { id: id.into() }
    }

    pub fn invalid_range(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error together with the path it happened on
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SliceError::UnrecognizedShape { .. }
            | SliceError::Json { .. }
            | SliceError::NoMatchingConversation => ErrorKind::Input,
            SliceError::Filesystem { .. } => ErrorKind::Io,
            SliceError::UnknownMessageId { .. }
            | SliceError::InvalidRange { .. }
            | SliceError::FilenameCollision { .. }
            | SliceError::Config { .. }
            | SliceError::MissingOptionalDependency { .. }
            | SliceError::MatchIndexOutOfRange { .. } => ErrorKind::Validation,
        }
    }
}
