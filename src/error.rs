//! Error types shared by the extractor, the validators and the uploader.
//!
//! `ValidationError` is the "bad input" kind reported back to whoever handed
//! us the upload. Everything else is an unrecoverable processing failure and
//! is surfaced to the caller unchanged once temporary state has been removed.

use std::path::PathBuf;

/// Input rejected before any processing started
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("File size {size} bytes exceeds maximum of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Unsupported MIME type: {mime_type}")]
    UnsupportedFormat { mime_type: String },
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Attempted path traversal in archive entry: {entry}")]
    PathTraversal { entry: String },

    #[error("Failed to read {}: {reason}", .path.display())]
    SourceRead { path: PathBuf, reason: String },

    #[error("`{command}` failed with {status}: {stderr}")]
    ExternalToolFailure {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Output datasource error: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NormalizerError {
    pub fn source_read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        NormalizerError::SourceRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors caused by the upload itself rather than by processing
    pub fn is_validation(&self) -> bool {
        matches!(self, NormalizerError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, NormalizerError>;
