use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{Result, SubmitError};
use crate::git::Git;
use crate::identity::SubmissionId;
use crate::snapshot::guard::SnapshotGuard;
use crate::snapshot::Snapshot;

/// Creates snapshots of one repository under one snapshot root
pub struct SnapshotManager {
    git: Git,
    root: PathBuf,
}

impl SnapshotManager {
    /// `git` must be bound to the project root
    pub fn new(git: Git, root: impl Into<PathBuf>) -> Self {
        SnapshotManager { git, root: root.into() }
    }

    /// Reserve `<root>/<id>` and check `commit` out into it, detached
    ///
    /// The directory is reserved with an exclusive `create_dir`; if another submission already
    /// holds the identity the sequence suffix is bumped until a free one is found, so the returned
    /// snapshot's id may differ from `id`. The project's own working tree is never touched. If the
    /// checkout fails the returned error comes after the reservation has been rolled back.
    pub fn create(&self, id: SubmissionId, commit: &str) -> Result<SnapshotGuard> {
        let root = self.absolute_root()?;
        let (id, path) = reserve(&root, id)?;
        info!("Creating snapshot {} of commit {} at {}", id, commit, path.display());

        let guard = SnapshotGuard::new(self.git.clone(), Snapshot { id, path: path.clone() });

        self.git
            .worktree_add_detached(&path, commit)
            .map_err(|err| SubmitError::SnapshotCreation { path, reason: err.to_string() })?;

        Ok(guard)
    }

    fn absolute_root(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).map_err(|err| SubmitError::SnapshotCreation {
            path: self.root.clone(),
            reason: format!("can't create snapshot root: {err}"),
        })?;
        Ok(self.root.canonicalize()?)
    }
}

fn reserve(root: &Path, mut id: SubmissionId) -> Result<(SubmissionId, PathBuf)> {
    loop {
        let path = root.join(id.to_string());
        match fs::create_dir(&path) {
            Ok(()) => return Ok((id, path)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                warn!("Snapshot {} already exists, trying next sequence number", path.display());
                id = id.next();
            }
            Err(err) => {
                return Err(SubmitError::SnapshotCreation { path, reason: err.to_string() });
            }
        }
    }
}
