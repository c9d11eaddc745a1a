//! Per-submission isolated checkouts
//!
//! A snapshot is a detached git worktree of the validated commit, placed at
//! `<snapshot-root>/<identity>`, with the project's large shared directories linked in. Creation
//! hands back a [`guard::SnapshotGuard`] which removes the snapshot again unless the submission
//! completes and the caller keeps it.

use std::path::PathBuf;

use crate::identity::SubmissionId;

/// Reserve a snapshot directory and check out a commit into it
pub mod manager;

/// Link shared project directories into a snapshot
pub mod link;

/// Scoped rollback of a snapshot on the submitting host
pub mod guard;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub id: SubmissionId,
    /// Absolute path of the checkout
    pub path: PathBuf,
}
