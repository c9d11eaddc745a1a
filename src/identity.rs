use std::fmt;

use chrono::{Local, NaiveDateTime};
use log::warn;

use crate::git::Git;

/// Commit placeholder used when HEAD can't be resolved
pub static UNVERSIONED: &str = "nogit";

/// Second granularity, sorts lexically in time order
pub static TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// The token naming a submission's snapshot directory, log file and scheduler job
///
/// Rendered as `<timestamp>_<short-commit>`. Two submissions from the same commit within one
/// second produce the same base token; the snapshot manager then bumps `sequence`, which
/// appends `-<n>` so every reserved snapshot has its own identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubmissionId {
    timestamp: String,
    commit: String,
    sequence: u32,
}

impl SubmissionId {
    pub fn new(at: NaiveDateTime, commit: &str) -> Self {
        SubmissionId {
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
            commit: commit.to_string(),
            sequence: 0,
        }
    }

    /// Identity for a submission made now from the repository's current HEAD
    pub fn generate(git: &Git) -> Self {
        let commit = match git.short_head() {
            Ok(hash) if !hash.is_empty() => hash,
            Ok(_) | Err(_) => {
                warn!("Can't resolve current commit, submitting without version tracking");
                UNVERSIONED.to_string()
            }
        };
        SubmissionId::new(Local::now().naive_local(), &commit)
    }

    /// Same timestamp and commit, next sequence number
    pub fn next(&self) -> Self {
        SubmissionId { sequence: self.sequence + 1, ..self.clone() }
    }

    pub fn commit(&self) -> &str {
        &self.commit
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.sequence {
            0 => write!(f, "{}_{}", self.timestamp, self.commit),
            n => write!(f, "{}_{}-{}", self.timestamp, self.commit, n),
        }
    }
}
