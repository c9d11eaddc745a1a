use std::path::{Path, PathBuf};
use std::process::Command;

use log::{info, warn};

use crate::error::{Result, SubmitError};
use crate::slurm::job::JobPath;
use crate::slurm::params::ParameterSet;

/// What the scheduler accepted
///
/// The job itself is tracked by the scheduler's accounting from here on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobRecord {
    /// Scheduler job id, when it could be read from sbatch's output
    pub job_id: Option<String>,
    pub log_path: PathBuf,
}

/// Client for the scheduler's submission entry point
pub struct Sbatch {
    program: String,
}

impl Sbatch {
    pub fn new(program: impl Into<String>) -> Self {
        Sbatch { program: program.into() }
    }

    /// Submit `job` with `params`, blocking until sbatch accepts or rejects it
    ///
    /// sbatch runs from `workdir`, the snapshot, so relative paths in caller options resolve
    /// against the submitted code. Does not wait for the job to run.
    pub fn submit(&self, params: &ParameterSet, job: &JobPath, workdir: &Path) -> Result<Option<String>> {
        let mut sbatch = Command::new(&self.program);
        let cmd = sbatch.args(params.as_slice()).arg(&job.path).current_dir(workdir);
        info!("Running sbatch process");
        info!("{:?}", &cmd);

        let output = cmd.output().map_err(|err| SubmitError::SubmissionRejected {
            status: "not started".to_string(),
            stderr: format!("can't run {}: {}", self.program, err),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(SubmitError::SubmissionRejected {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let job_id = parse_job_id(&stdout);
        match &job_id {
            Some(id) => info!("SLURM job id: {id}"),
            None => warn!("Can't read a job id from sbatch output: {}", stdout.trim()),
        }
        Ok(job_id)
    }
}

/// Job id from `Submitted batch job 123` or the `--parsable` form `123;cluster`
pub fn parse_job_id(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    let token = match line.strip_prefix("Submitted batch job") {
        Some(rest) => rest.split_whitespace().next()?,
        None => line.split(';').next()?,
    };
    let id = token.trim();
    match !id.is_empty() && id.chars().all(|c| c.is_ascii_digit() || c == '_') {
        true => Some(id.to_string()),
        false => None,
    }
}
