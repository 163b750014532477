use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HolterError {
    #[error("No header found for {}", .path.display())]
    HeaderMissing { path: PathBuf },

    #[error("Data file not found: {}", .path.display())]
    DataFileMissing { path: PathBuf },

    #[error("Cannot open annotation file {}: {reason}", .path.display())]
    AnnotationOpenFailed { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid number of channels: {0}")]
    InvalidChannelCount(usize),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(i64),

    #[error("Unsupported WFDB signal format: {0}")]
    UnsupportedWfdbFormat(u16),

    #[error("Malformed annotation stream: {0}")]
    MalformedAnnotation(String),
}

impl HolterError {
    /// Whether the open operation can continue with defaults after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HolterError::HeaderMissing { .. } | HolterError::AnnotationOpenFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HolterError>;
