//! The host-side submission sequence
//!
//! classify -> preflight -> identity -> snapshot -> link -> build -> sbatch. Everything after
//! snapshot creation runs under a [`SnapshotGuard`], so any failure from there on removes the
//! snapshot before the error is returned.

use std::path::{Component, Path, PathBuf};

use log::{info, warn};

use crate::config::Config;
use crate::error::{Result, SubmitError};
use crate::git::Git;
use crate::identity::SubmissionId;
use crate::invocation::Invocation;
use crate::preflight;
use crate::slurm::job_request::JobRequest;
use crate::slurm::options::SchedulerOptions;
use crate::slurm::sbatch::{JobRecord, Sbatch};
use crate::snapshot::guard::SnapshotGuard;
use crate::snapshot::link::link_shared_dirs;
use crate::snapshot::manager::SnapshotManager;

/// Version control executable looked up on PATH
pub static GIT: &str = "git";

/// Settings that come from the command line rather than the invocation body
#[derive(Clone, Debug, Default)]
pub struct SubmitOptions {
    pub dry_run: bool,
    pub config: Option<PathBuf>,
    pub snapshot_root: Option<PathBuf>,
    pub log_root: Option<PathBuf>,
}

#[derive(Debug)]
pub enum Outcome {
    /// The scheduler accepted the job; the snapshot stays until the job or the user removes it
    Submitted {
        request: JobRequest,
        record: JobRecord,
    },
    /// Nothing was created or submitted
    DryRun {
        request: JobRequest,
        options: SchedulerOptions,
        script: String,
    },
}

/// Run one submission from `cwd`, which must be inside the project's repository
pub fn submit(cwd: &Path, invocation: &Invocation, opts: &SubmitOptions) -> Result<Outcome> {
    let options = SchedulerOptions::parse(&invocation.scheduler_args)?;

    let project_root = preflight::check_repository(&Git::new(GIT, cwd))?;
    let git = Git::new(GIT, &project_root);
    let config = load_config(&project_root, opts)?;
    if !opts.dry_run {
        preflight::check_scheduler(&config.scheduler.program)?;
    }

    let id = SubmissionId::generate(&git);
    let snapshot_root = config.snapshot_root(&project_root);
    let log_root = config.log_root(&project_root);

    if opts.dry_run {
        let snapshot_dir = snapshot_root.join(id.to_string());
        let request = JobRequest::new(&id, invocation, &snapshot_dir, &project_root, &log_root, &config.scheduler);
        let script = request.render()?;
        return Ok(Outcome::DryRun { request, options, script });
    }

    let commit = git.head().map_err(|err| SubmitError::SnapshotCreation {
        path: snapshot_root.join(id.to_string()),
        reason: format!("no commit to snapshot: {err}"),
    })?;

    for root in [&snapshot_root, &log_root] {
        exclude_from_status(&git, &project_root, root);
    }

    let guard: SnapshotGuard = SnapshotManager::new(git.clone(), &snapshot_root).create(id, &commit)?;
    let snapshot = guard.snapshot().clone();

    let report = link_shared_dirs(&project_root, &snapshot.path, &config.shared_dirs);
    info!(
        "Shared directories: {} linked, {} absent, {} failed",
        report.linked.len() + report.existing.len(),
        report.absent.len(),
        report.failed.len()
    );

    let request = JobRequest::new(
        &snapshot.id,
        invocation,
        &snapshot.path,
        &project_root,
        &log_root,
        &config.scheduler,
    );
    let job = request.create(&log_root)?;
    let job_id = Sbatch::new(&config.scheduler.program).submit(&request.params, &job, &snapshot.path)?;

    guard.keep();
    let record = JobRecord { job_id, log_path: request.log_path.clone() };
    Ok(Outcome::Submitted { request, record })
}

/// Keep an in-tree root out of `git status`, or the next submission would see a dirty tree
fn exclude_from_status(git: &Git, project_root: &Path, root: &Path) {
    let Ok(relative) = root.strip_prefix(project_root) else {
        return;
    };
    if relative.components().any(|part| matches!(part, Component::ParentDir)) {
        return;
    }
    let parts: Vec<String> = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return;
    }
    let pattern = format!("/{}/", parts.join("/"));
    if let Err(err) = git.exclude(&pattern) {
        warn!("Can't exclude {} from git status: {:#}", pattern, err);
    }
}

fn load_config(project_root: &Path, opts: &SubmitOptions) -> Result<Config> {
    let mut config = Config::load(project_root, opts.config.as_deref())?;
    if let Some(root) = &opts.snapshot_root {
        config.snapshot_root = root.clone();
    }
    if let Some(root) = &opts.log_root {
        config.log_root = root.clone();
    }
    Ok(config)
}
