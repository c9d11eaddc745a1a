use std::fmt;
use std::path::Path;

use crate::config::SchedulerConfig;
use crate::identity::SubmissionId;

/// Ordered sbatch option tokens
///
/// Built as the default sequence followed by the caller's tokens. sbatch resolves a repeated
/// flag by taking its last occurrence, so a caller option overrides the default of the same
/// flag. Nothing is deduplicated here: both occurrences are passed on in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParameterSet(Vec<String>);

impl ParameterSet {
    /// Defaults for one submission: resources from configuration, name and log from the identity
    pub fn defaults(cfg: &SchedulerConfig, id: &SubmissionId, log_path: &Path) -> ParameterSet {
        ParameterSet(vec![
            format!("--nodes={}", cfg.nodes),
            format!("--ntasks={}", cfg.ntasks),
            format!("--cpus-per-task={}", cfg.cpus_per_task),
            format!("--partition={}", cfg.partition),
            format!("--time={}", cfg.time),
            format!("--gres={}", cfg.gres),
            format!("--job-name={id}"),
            format!("--output={}", log_path.display()),
        ])
    }

    /// `self` followed by `caller`, caller last so it wins on the scheduler side
    pub fn merge(mut self, caller: &[String]) -> ParameterSet {
        self.0.extend(caller.iter().cloned());
        self
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}
