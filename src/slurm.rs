//! Build the scheduler parameter list and job script, then hand them to sbatch

/// Typed view and validation of caller-supplied sbatch options
pub mod options;

/// Default parameters and the ordered merge with caller options
pub mod params;

/// Everything the remote job needs to know, as one explicit record
pub mod job_request;

/// Render the wrapper script from templates and write it to disk
pub mod job;

/// Run sbatch and read back the job id
pub mod sbatch;
