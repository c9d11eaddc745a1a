use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::git::Git;
use crate::snapshot::Snapshot;

/// Snapshots whose guards are still armed, so a signal handler can roll them back
static ARMED: Mutex<Vec<(Git, Snapshot)>> = Mutex::new(Vec::new());

fn registry() -> MutexGuard<'static, Vec<(Git, Snapshot)>> {
    ARMED.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remove every snapshot whose guard is still armed and return how many there were
///
/// For signal handlers: a process killed by a signal never runs `Drop`. Guards rolled back here
/// find nothing left to remove when they are dropped later.
pub fn roll_back_armed() -> usize {
    let pending: Vec<(Git, Snapshot)> = registry().drain(..).collect();
    for (git, snapshot) in &pending {
        warn!("Interrupted, removing snapshot {}", snapshot.path.display());
        remove_snapshot(git, snapshot);
    }
    pending.len()
}

/// Owns a freshly created snapshot until the submission either goes through or fails
///
/// Dropping an armed guard deregisters the worktree and deletes the snapshot directory, so every
/// early return or `?` after snapshot creation rolls back. [`SnapshotGuard::keep`] disarms it once
/// the scheduler has accepted the job.
#[derive(Debug)]
pub struct SnapshotGuard {
    git: Git,
    snapshot: Snapshot,
    armed: bool,
}

impl SnapshotGuard {
    /// `git` must be bound to the repository the worktree was created from
    pub fn new(git: Git, snapshot: Snapshot) -> Self {
        registry().push((git.clone(), snapshot.clone()));
        SnapshotGuard { git, snapshot, armed: true }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Disarm and hand the snapshot over; it stays on disk
    pub fn keep(mut self) -> Snapshot {
        self.disarm();
        info!("Keeping snapshot {}", self.snapshot.path.display());
        self.snapshot.clone()
    }

    fn disarm(&mut self) {
        self.armed = false;
        registry().retain(|(_, snapshot)| snapshot.path != self.snapshot.path);
    }
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        if self.armed {
            self.disarm();
            warn!("Submission failed, removing snapshot {}", self.snapshot.path.display());
            remove_snapshot(&self.git, &self.snapshot);
        }
    }
}

/// Best-effort removal of a snapshot: worktree registration first, then the directory
///
/// Symbolic links inside the snapshot are removed, never followed.
pub fn remove_snapshot(git: &Git, snapshot: &Snapshot) {
    let path = &snapshot.path;
    let dot_git = path.join(".git");
    if fs::symlink_metadata(&dot_git).map(|m| m.is_file()).unwrap_or(false) {
        git.worktree_remove(path);
    }

    if fs::symlink_metadata(path).is_ok() {
        if let Err(err) = fs::remove_dir_all(path) {
            warn!("Can't remove snapshot directory {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
fn is_registered(path: &std::path::Path) -> bool {
    registry().iter().any(|(_, snapshot)| snapshot.path == path)
}
