use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop a single input path from being measured.
#[derive(Error, Debug)]
pub enum QduError {
    /// The mount-table probe itself broke; this is not the same as "not remote".
    #[error("mount table query failed for {}: {reason}", .path.display())]
    MountQuery { path: PathBuf, reason: String },

    #[error("cannot log in to {host}:{port}: {reason}")]
    Auth {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("aggregate query failed for {path}: {reason}")]
    RemoteQuery { path: String, reason: String },

    #[error("{path} is not below mountpoint {mountpoint}")]
    NotUnderMount { path: String, mountpoint: String },

    #[error("local measurement of {} failed: {reason}", .path.display())]
    Fallback { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, QduError>;
