use std::path::{Path, PathBuf};

use crate::config::SchedulerConfig;
use crate::identity::SubmissionId;
use crate::invocation::{Invocation, JobCommand};
use crate::slurm::params::ParameterSet;

/// The context of one submission, built on the host and rendered into the job script
///
/// This record is the only channel between the submitting host and the remote job: the wrapper
/// script exports its fields as the job's environment and its cleanup trap reads nothing else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobRequest {
    pub id: SubmissionId,
    pub auto_cleanup: bool,
    pub snapshot_dir: PathBuf,
    pub project_root: PathBuf,
    /// Scheduler-captured stdout and stderr, `<log-root>/<identity>.out`
    pub log_path: PathBuf,
    pub params: ParameterSet,
    pub command: JobCommand,
}

impl JobRequest {
    pub fn new(
        id: &SubmissionId,
        invocation: &Invocation,
        snapshot_dir: &Path,
        project_root: &Path,
        log_root: &Path,
        scheduler: &SchedulerConfig,
    ) -> JobRequest {
        let log_path = log_root.join(format!("{id}.out"));
        let params = ParameterSet::defaults(scheduler, id, &log_path).merge(&invocation.scheduler_args);

        JobRequest {
            id: id.clone(),
            auto_cleanup: invocation.auto_cleanup,
            snapshot_dir: snapshot_dir.to_path_buf(),
            project_root: project_root.to_path_buf(),
            log_path,
            params,
            command: invocation.command.clone(),
        }
    }

    /// Path of the rendered job script kept next to the job's log
    pub fn script_path(&self, log_root: &Path) -> PathBuf {
        log_root.join(format!("{}.sbatch", self.id))
    }
}
