//! Thin wrapper around the `git` executable

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};

/// A git executable bound to a repository directory
#[derive(Clone, Debug)]
pub struct Git {
    program: String,
    repo: PathBuf,
}

impl Git {
    pub fn new(program: impl Into<String>, repo: impl Into<PathBuf>) -> Self {
        Git { program: program.into(), repo: repo.into() }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Rebind to another directory, usually the project root found by [`Git::toplevel`]
    pub fn at(&self, repo: impl Into<PathBuf>) -> Git {
        Git { program: self.program.clone(), repo: repo.into() }
    }

    /// False only when the executable can't be spawned at all
    pub fn is_available(&self) -> bool {
        match Command::new(&self.program).arg("--version").output() {
            Ok(_) => true,
            Err(err) => {
                debug!("{} --version failed: {}", self.program, err);
                err.kind() != io::ErrorKind::NotFound && err.kind() != io::ErrorKind::PermissionDenied
            }
        }
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        debug!("running {} {:?} in {}", self.program, args, self.repo.display());
        Command::new(&self.program)
            .args(args)
            .current_dir(&self.repo)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .output()
            .with_context(|| format!("run {} {:?}", self.program, args))
    }

    /// Run a git command and return trimmed stdout, failing on a nonzero exit
    pub fn run(&self, args: &[&str]) -> Result<String> {
        let out = self.output(args)?;
        if !out.status.success() {
            return Err(anyhow!(
                "command failed: {} {:?}\nstdout:{}\nstderr:{}",
                self.program,
                args,
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    pub fn toplevel(&self) -> Result<PathBuf> {
        self.run(&["rev-parse", "--show-toplevel"]).map(PathBuf::from)
    }

    /// Porcelain status; empty means clean, untracked files included
    pub fn status_porcelain(&self) -> Result<String> {
        self.run(&["status", "--porcelain"])
    }

    pub fn head(&self) -> Result<String> {
        self.run(&["rev-parse", "HEAD"])
    }

    pub fn short_head(&self) -> Result<String> {
        self.run(&["rev-parse", "--short", "HEAD"])
    }

    /// Check out `commit` detached at `path`, which must not exist or be empty
    pub fn worktree_add_detached(&self, path: &Path, commit: &str) -> Result<()> {
        let path = path.to_str().ok_or_else(|| anyhow!("non UTF-8 path {}", path.display()))?;
        self.run(&["worktree", "add", "--detach", path, commit]).map(|_| ())
    }

    /// Deregister a worktree and prune stale entries
    ///
    /// Best effort: failures are logged and otherwise ignored.
    pub fn worktree_remove(&self, path: &Path) {
        let path_str = path.to_string_lossy();
        if let Err(err) = self.run(&["worktree", "remove", "--force", &path_str]) {
            warn!("git worktree remove {} failed: {}", path.display(), err);
        }
        if let Err(err) = self.run(&["worktree", "prune"]) {
            warn!("git worktree prune failed: {}", err);
        }
    }

    /// Append `pattern` to the repository's `info/exclude` unless it is already listed
    ///
    /// Unlike `.gitignore` this changes no tracked file, so the working tree stays clean.
    pub fn exclude(&self, pattern: &str) -> Result<()> {
        let path = self.repo.join(self.run(&["rev-parse", "--git-path", "info/exclude"])?);
        let current = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
        };
        if current.lines().any(|line| line.trim() == pattern) {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        let separator = if current.is_empty() || current.ends_with('\n') { "" } else { "\n" };
        write!(file, "{separator}{pattern}\n").with_context(|| format!("write {}", path.display()))?;
        debug!("excluded {} in {}", pattern, path.display());
        Ok(())
    }

    /// Paths of all registered worktrees, the main one first
    pub fn worktree_list(&self) -> Result<Vec<PathBuf>> {
        let out = self.run(&["worktree", "list", "--porcelain"])?;
        Ok(out
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(PathBuf::from)
            .collect())
    }
}

/// Test fixtures shared by unit and integration tests
#[doc(hidden)]
pub mod fixture {
    use std::fs;
    use std::path::Path;

    use anyhow::Result;

    use super::Git;

    /// Initialize a git repo with one commit
    ///
    /// The snapshot and log roots plus the shared directory names are ignored, like in a real
    /// project checkout.
    pub fn init_git_repo(dir: &Path) -> Result<Git> {
        let git = Git::new("git", dir);
        git.run(&["init"])?;
        git.run(&["config", "user.email", "submit@example.com"])?;
        git.run(&["config", "user.name", "submit"])?;
        git.run(&["config", "commit.gpgsign", "false"])?;
        fs::write(dir.join("README.md"), "fixture\n")?;
        fs::write(dir.join("train.py"), "print('training')\n")?;
        fs::write(
            dir.join(".gitignore"),
            ".snapshots/\nlogs/\ndata\ncheckpoints\noutput\nwandb\n.venv\n",
        )?;
        git.run(&["add", "."])?;
        git.run(&["commit", "-m", "init"])?;
        Ok(git)
    }
}
