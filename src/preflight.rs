//! Checks that run before anything is written to disk

use std::path::PathBuf;
use std::process::Command;

use log::info;

use crate::error::{Result, SubmitError};
use crate::git::Git;

/// Confirm git exists and the working tree is committed
///
/// Any porcelain output counts as dirty, untracked files included. Returns the repository
/// top level, which becomes the project root.
pub fn check_repository(git: &Git) -> Result<PathBuf> {
    if !git.is_available() {
        return Err(SubmitError::ToolMissing(git.program().to_string()));
    }

    let root = git
        .toplevel()
        .map_err(|err| SubmitError::Usage(format!("not inside a git repository: {err}")))?;

    let status = git
        .at(&root)
        .status_porcelain()
        .map_err(|err| SubmitError::Usage(format!("can't read git status: {err}")))?;
    if !status.is_empty() {
        return Err(SubmitError::DirtyTree(status));
    }

    info!("Working tree at {} is clean", root.display());
    Ok(root)
}

/// Confirm the scheduler's submission entry point can be spawned
pub fn check_scheduler(program: &str) -> Result<()> {
    match Command::new(program).arg("--version").output() {
        Ok(_) => Ok(()),
        Err(_) => Err(SubmitError::ToolMissing(program.to_string())),
    }
}
