use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop a submission
///
/// `Usage`, `ToolMissing` and `DirtyTree` are raised before anything is written to disk.
/// `SnapshotCreation` and `SubmissionRejected` happen after a snapshot directory was reserved,
/// and the host-side guard removes it again before the error reaches `main`.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("{0}")]
    Usage(String),

    #[error("required tool `{0}` not found on PATH")]
    ToolMissing(String),

    #[error("working tree has uncommitted changes; commit or stash them first:\n{0}")]
    DirtyTree(String),

    #[error("failed to create snapshot at {path}: {reason}")]
    SnapshotCreation { path: PathBuf, reason: String },

    /// Never fatal, only logged by the linker
    #[error("failed to link shared directory {name}: {reason}")]
    Link { name: String, reason: String },

    #[error("scheduler rejected the submission ({status}): {stderr}")]
    SubmissionRejected { status: String, stderr: String },

    #[error("invalid configuration {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("can't render job script: {0}")]
    Template(#[from] tinytemplate::error::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SubmitError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        1
    }
}

pub type Result<T> = std::result::Result<T, SubmitError>;
