use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the occupancy core.
///
/// None of these are retried. Each one either ends the current invocation
/// (image analysis, video run) or is reported back to the caller as-is.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Spot configuration or settings are missing or malformed.
    #[error("config: {0}")]
    Config(String),

    /// Input image or video could not be opened or decoded.
    #[error("source unreadable: {path}: {reason}")]
    SourceUnreadable { path: String, reason: String },

    /// Every codec/container candidate was rejected for the output path.
    #[error("cannot open video writer for {path} (tried {tried})")]
    WriterUnavailable { path: PathBuf, tried: String },

    /// Opaque failure from the detection backend.
    #[error("detection backend: {0:#}")]
    Detection(#[source] anyhow::Error),

    /// The writer accepted the open but failed on a frame or on finalization.
    #[error("write failed: {0}")]
    Write(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unreadable(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
