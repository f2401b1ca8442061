use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to create watch session: {0}")]
    SessionCreate(String),

    #[error("failed to start watch session on {path}: {reason}")]
    SessionStart { path: PathBuf, reason: String },

    #[error("folder index {index} out of range (have {len} folders)")]
    FolderIndexOutOfRange { index: usize, len: usize },

    #[error("filter index {index} out of range (have {len} filters)")]
    FilterIndexOutOfRange { index: usize, len: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
