use std::fs;
use std::io;
use std::path::Path;

use log::{info, warn};

use crate::error::SubmitError;

/// What happened to each shared directory name
#[derive(Debug, Default)]
pub struct LinkReport {
    /// Newly linked
    pub linked: Vec<String>,
    /// Already linked to the right target by an earlier run
    pub existing: Vec<String>,
    /// Not present in the project root
    pub absent: Vec<String>,
    /// Present but could not be linked; never fatal
    pub failed: Vec<SubmitError>,
}

/// Link every shared directory present in `project_root` into `snapshot`
///
/// Each link has the directory's name and points at the absolute path in the project root, so
/// jobs read and write the one shared copy. Nothing is copied. Existing entries in the snapshot
/// are never replaced or followed: a link that already points at the right place is accepted,
/// anything else is reported as a failure and left alone. Running this twice is harmless.
pub fn link_shared_dirs(project_root: &Path, snapshot: &Path, names: &[String]) -> LinkReport {
    let mut report = LinkReport::default();

    for name in names {
        let source = project_root.join(name);
        if !source.is_dir() {
            report.absent.push(name.clone());
            continue;
        }

        let dest = snapshot.join(name);
        match link_one(&source, &dest) {
            Ok(true) => {
                info!("Linked {} -> {}", dest.display(), source.display());
                report.linked.push(name.clone());
            }
            Ok(false) => report.existing.push(name.clone()),
            Err(reason) => {
                let err = SubmitError::Link { name: name.clone(), reason };
                warn!("{}, skipping", err);
                report.failed.push(err);
            }
        }
    }

    report
}

/// `Ok(true)` when a link was created, `Ok(false)` when the right link was already there
fn link_one(source: &Path, dest: &Path) -> Result<bool, String> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = fs::read_link(dest).map_err(|err| err.to_string())?;
            match target == source {
                true => Ok(false),
                false => Err(format!("{} already links to {}", dest.display(), target.display())),
            }
        }
        Ok(_) => Err(format!("{} already exists in the checkout", dest.display())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            symlink_dir(source, dest).map_err(|err| err.to_string())?;
            Ok(true)
        }
        Err(err) => Err(err.to_string()),
    }
}

#[cfg(unix)]
fn symlink_dir(source: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(windows)]
fn symlink_dir(source: &Path, dest: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(source, dest)
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;

    use tempfile::tempdir;

    use super::*;

    fn names() -> Vec<String> {
        ["data", "checkpoints", "output", "wandb", ".venv"].iter().map(|s| s.to_string()).collect()
    }

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        let snapshot = dir.path().join("snapshot");
        fs::create_dir_all(project.join("data")).unwrap();
        fs::create_dir_all(project.join("checkpoints")).unwrap();
        fs::create_dir_all(&snapshot).unwrap();
        (dir, project, snapshot)
    }

    #[test]
    fn present_dirs_are_linked_absent_are_skipped() {
        let (_dir, project, snapshot) = setup();

        let report = link_shared_dirs(&project, &snapshot, &names());

        assert_eq!(report.linked, vec!["data", "checkpoints"]);
        assert_eq!(report.absent, vec!["output", "wandb", ".venv"]);
        assert!(report.failed.is_empty());
        assert_eq!(fs::read_link(snapshot.join("data")).unwrap(), project.join("data"));
        assert!(fs::symlink_metadata(snapshot.join("output")).is_err());
    }

    #[test]
    fn writes_through_link_reach_the_original() {
        let (_dir, project, snapshot) = setup();
        link_shared_dirs(&project, &snapshot, &names());

        fs::write(snapshot.join("checkpoints").join("epoch1.pt"), "weights").unwrap();

        assert_eq!(fs::read_to_string(project.join("checkpoints").join("epoch1.pt")).unwrap(), "weights");
    }

    #[test]
    fn second_run_is_idempotent() {
        let (_dir, project, snapshot) = setup();
        link_shared_dirs(&project, &snapshot, &names());

        let report = link_shared_dirs(&project, &snapshot, &names());

        assert!(report.linked.is_empty());
        assert_eq!(report.existing, vec!["data", "checkpoints"]);
        assert!(report.failed.is_empty());
        assert_eq!(fs::read_link(snapshot.join("data")).unwrap(), project.join("data"));
    }

    #[test]
    fn existing_checkout_entry_is_a_non_fatal_failure() {
        let (_dir, project, snapshot) = setup();
        fs::create_dir(snapshot.join("data")).unwrap();
        fs::write(snapshot.join("data").join(".gitkeep"), "").unwrap();

        let report = link_shared_dirs(&project, &snapshot, &names());

        assert_eq!(report.linked, vec!["checkpoints"]);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(&report.failed[0], SubmitError::Link { name, .. } if name == "data"));
        assert!(snapshot.join("data").join(".gitkeep").exists());
    }

    #[test]
    fn foreign_link_is_left_alone() {
        let (dir, project, snapshot) = setup();
        let elsewhere = dir.path().join("elsewhere");
        fs::create_dir(&elsewhere).unwrap();
        std::os::unix::fs::symlink(&elsewhere, snapshot.join("data")).unwrap();

        let report = link_shared_dirs(&project, &snapshot, &names());

        assert_eq!(report.failed.len(), 1);
        assert_eq!(fs::read_link(snapshot.join("data")).unwrap(), elsewhere);
    }
}
