//! Submit reproducible batch jobs from an isolated snapshot of the committed source tree
//!
//! Every submission checks the current commit out into its own detached worktree, links the
//! project's large shared directories into it, and hands sbatch a wrapper script that runs the
//! user's command there.

pub mod config;
pub mod error;
pub mod git;
pub mod identity;
pub mod invocation;
pub mod preflight;
pub mod slurm;
pub mod snapshot;
pub mod submit;
