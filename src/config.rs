//! Layered configuration: built-in defaults, then `submit.toml`, then command line flags

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::error::{Result, SubmitError};

/// Name of the optional configuration file looked up in the project root
pub static CONFIG_FILE: &str = "submit.toml";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where snapshots are created, relative paths resolve against the project root
    pub snapshot_root: PathBuf,
    /// Where the scheduler writes `<identity>.out` and where job scripts are kept
    pub log_root: PathBuf,
    /// Directory names linked into every snapshot when present in the project root
    pub shared_dirs: Vec<String>,
    pub scheduler: SchedulerConfig,
}

/// Defaults placed in front of every caller-supplied scheduler option
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Submission entry point
    pub program: String,
    pub nodes: u32,
    pub ntasks: u32,
    pub cpus_per_task: u32,
    pub partition: String,
    pub time: String,
    pub gres: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_root: PathBuf::from(".snapshots"),
            log_root: PathBuf::from("logs"),
            shared_dirs: ["data", "checkpoints", "output", "wandb", ".venv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            program: "sbatch".to_string(),
            nodes: 1,
            ntasks: 1,
            cpus_per_task: 4,
            partition: "gpu".to_string(),
            time: "30:00:00".to_string(),
            gres: "gpu:1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration for a project
    ///
    /// An explicit path must exist. Without one, `submit.toml` in the project root is read if
    /// present and the built-in defaults are used otherwise.
    pub fn load(project_root: &Path, explicit: Option<&Path>) -> Result<Config> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = project_root.join(CONFIG_FILE);
                if !path.exists() {
                    return Ok(Config::default());
                }
                path
            }
        };

        info!("Reading configuration from {}", path.display());
        let content = fs::read_to_string(&path).map_err(|err| SubmitError::Config {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        Config::parse(&content).map_err(|reason| SubmitError::Config { path, reason })
    }

    pub fn parse(content: &str) -> std::result::Result<Config, String> {
        toml::from_str(content).map_err(|err| err.to_string())
    }

    pub fn snapshot_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.snapshot_root)
    }

    pub fn log_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.log_root)
    }
}
